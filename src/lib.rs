//! # boxplot-significance
//!
//! Adaptive group-comparison testing for biomarker boxplots, and the geometry
//! of the significance brackets drawn on top of them.
//!
//! Given a table of subjects with a group column and one or more numeric
//! biomarker columns, the crate checks per-group normality, picks parametric
//! or rank-based tests accordingly, corrects every family of p-values for
//! multiple comparisons, and lays out non-overlapping brackets for the pairs
//! that remain significant.
//!
//! ## Core Features
//!
//! - **Distribution diagnostics**: Shapiro-Wilk or D'Agostino-Pearson per group, Levene per biomarker
//! - **Omnibus gating**: ANOVA or Kruskal-Wallis before any pairwise test
//! - **Pairwise tests**: Welch's t-test or Mann-Whitney U, one global correction family
//! - **Multiple testing correction**: Bonferroni, Sidak, Holm, Hochberg, Benjamini-Hochberg/Yekutieli
//! - **Bracket layout**: stacked bracket heights, tips and labels in data coordinates
//!
//! ## Quick Start
//!
//! Read a CSV with [`data::reader::read_csv_path`], build a
//! [`SignificancePipeline`] from a [`PipelineConfig`], call `run`, and hand
//! the [`render::RenderPlan`] to a [`render::Renderer`].
//!
//! ## Module Organization
//!
//! - **[`data`]**: Dataset model and CSV reader
//! - **[`testing`]**: Test primitives and multiple testing correction
//! - **[`pipeline`]**: Diagnostics, omnibus and pairwise stages
//! - **[`layout`]**: Percentile filtering and bracket geometry
//! - **[`render`]**: Serializable plan for an external plotting tool

pub mod config;
pub mod data;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod render;
pub mod testing;

pub use config::{DisplayConfig, PipelineConfig};
pub use data::{Dataset, GroupOrder, GroupPair};
pub use error::{Result, SignificanceError, Stage};
pub use pipeline::{PipelineReport, SignificancePipeline};
pub use testing::inference::{StatrsBackend, TestPrimitives};

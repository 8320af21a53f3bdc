//! Stage orchestration: diagnostics, omnibus, pairwise, correction, layout.
//!
//! Each stage is also callable on its own ([`assess_normality`],
//! [`assess_variance_homogeneity`], [`test_group_differences`],
//! [`pairwise_compare`]). [`SignificancePipeline`] runs them in order over one
//! dataset and returns a [`PipelineReport`] together with the decision trail.

use crate::config::PipelineConfig;
use crate::data::{Dataset, GroupOrder};
use crate::error::{Result, SignificanceError, Stage};
use crate::layout::{self, BiomarkerLayout, FilteredRange, LayoutConfig};
use crate::render::RenderPlan;
use crate::testing::correction::CorrectionMethod;
use crate::testing::inference::{StatrsBackend, TestPrimitives};
use serde::Serialize;
use tracing::{debug, info, warn};

pub mod diagnostics;
pub mod omnibus;
pub mod pairwise;

pub use diagnostics::{
    NormalityCell, NormalityTable, VarianceResult, VarianceTable, assess_normality,
    assess_variance_homogeneity,
};
pub use omnibus::{OmnibusResult, OmnibusTable, test_group_differences};
pub use pairwise::{
    PairwiseOutcome, PairwiseResult, SignificanceMap, SignificanceRecord, pairwise_compare,
};

/// One entry of the decision trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub stage: Stage,
    pub biomarker: String,
    /// Groups involved: one for a normality cell, two for a pair, all for omnibus.
    pub groups: Vec<String>,
    /// Name of the test that ran; `None` when the step was skipped.
    pub test: Option<String>,
    pub reason: String,
}

impl Decision {
    pub(crate) fn ran(
        stage: Stage,
        biomarker: &str,
        groups: Vec<String>,
        test: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        let decision = Decision {
            stage,
            biomarker: biomarker.to_string(),
            groups,
            test: Some(test.to_string()),
            reason: reason.into(),
        };
        debug!(
            stage = %decision.stage,
            biomarker = %decision.biomarker,
            groups = ?decision.groups,
            test = decision.test.as_deref().unwrap_or_default(),
            "{}",
            decision.reason
        );
        decision
    }

    fn skip(stage: Stage, biomarker: &str, groups: Vec<String>, reason: String) -> Self {
        Decision {
            stage,
            biomarker: biomarker.to_string(),
            groups,
            test: None,
            reason,
        }
    }

    /// A step that could not run on the data it was given, such as a cell
    /// below the minimum sample size. Logged as a warning.
    pub(crate) fn skipped(
        stage: Stage,
        biomarker: &str,
        groups: Vec<String>,
        reason: impl Into<String>,
    ) -> Self {
        let decision = Decision::skip(stage, biomarker, groups, reason.into());
        warn!(
            stage = %decision.stage,
            biomarker = %decision.biomarker,
            groups = ?decision.groups,
            "skipped: {}",
            decision.reason
        );
        decision
    }

    /// A step left out by the decision rules themselves, e.g. pairwise tests
    /// after a non-significant omnibus result.
    pub(crate) fn gated(
        stage: Stage,
        biomarker: &str,
        groups: Vec<String>,
        reason: impl Into<String>,
    ) -> Self {
        let decision = Decision::skip(stage, biomarker, groups, reason.into());
        debug!(
            stage = %decision.stage,
            biomarker = %decision.biomarker,
            groups = ?decision.groups,
            "skipped: {}",
            decision.reason
        );
        decision
    }

    pub fn is_skip(&self) -> bool {
        self.test.is_none()
    }
}

pub(crate) fn check_alpha(alpha: f64) -> Result<()> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(SignificanceError::Configuration(format!(
            "alpha must be in (0, 1), got {}",
            alpha
        )))
    }
}

pub(crate) fn correction_error(stage: Stage) -> impl FnOnce(anyhow::Error) -> SignificanceError {
    move |source| SignificanceError::Correction { stage, source }
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub groups: GroupOrder,
    pub normality: NormalityTable,
    pub variance: VarianceTable,
    /// Absent when fewer than three groups exist.
    pub omnibus: Option<OmnibusTable>,
    pub pairwise: Vec<PairwiseResult>,
    pub significance: SignificanceMap,
    pub ranges: Vec<FilteredRange>,
    pub layouts: Vec<BiomarkerLayout>,
    pub decisions: Vec<Decision>,
}

impl PipelineReport {
    pub fn decisions_for<'a>(&'a self, biomarker: &'a str) -> impl Iterator<Item = &'a Decision> {
        self.decisions.iter().filter(move |d| d.biomarker == biomarker)
    }

    pub fn layout_for(&self, biomarker: &str) -> Option<&BiomarkerLayout> {
        self.layouts.iter().find(|l| l.biomarker == biomarker)
    }
}

/// Runs every stage over one dataset with a fixed configuration.
#[derive(Debug, Clone)]
pub struct SignificancePipeline<B: TestPrimitives = StatrsBackend> {
    backend: B,
    config: PipelineConfig,
    correction: CorrectionMethod,
    layout: LayoutConfig,
}

impl SignificancePipeline<StatrsBackend> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_backend(config, StatrsBackend)
    }
}

impl<B: TestPrimitives> SignificancePipeline<B> {
    /// Validates the configuration up front; no test runs on a bad config.
    pub fn with_backend(config: PipelineConfig, backend: B) -> Result<Self> {
        config.validate()?;
        let correction = config.correction()?;
        let layout = config.layout()?;
        Ok(SignificancePipeline {
            backend,
            config,
            correction,
            layout,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn run(
        &self,
        dataset: &Dataset,
        biomarkers: &[String],
        group_column: &str,
    ) -> Result<PipelineReport> {
        let alpha = self.config.alpha;
        let (order, channels) = dataset.channels(biomarkers, group_column)?;
        info!(
            biomarkers = channels.len(),
            groups = order.len(),
            rows = dataset.n_rows(),
            correction = %self.correction,
            "starting significance pipeline"
        );

        let normality =
            diagnostics::normality_from_channels(&self.backend, &order, &channels, self.correction)?;
        let variance =
            diagnostics::variance_from_channels(&self.backend, &channels, &order, self.correction)?;

        let mut decisions: Vec<Decision> = Vec::new();
        decisions.extend_from_slice(normality.decisions());
        decisions.extend_from_slice(variance.decisions());

        let omnibus = if order.len() >= omnibus::MIN_GROUPS {
            let table = omnibus::omnibus_from_channels(
                &self.backend,
                &order,
                &channels,
                &normality,
                alpha,
                self.correction,
            )?;
            decisions.extend_from_slice(table.decisions());
            Some(table)
        } else {
            for channel in &channels {
                decisions.push(Decision::gated(
                    Stage::Omnibus,
                    &channel.name,
                    order.labels().to_vec(),
                    format!(
                        "{} groups; omnibus needs at least {}, pairwise tests run ungated",
                        order.len(),
                        omnibus::MIN_GROUPS
                    ),
                ));
            }
            None
        };

        let gate = if self.config.omnibus_gating {
            omnibus.as_ref()
        } else {
            None
        };
        let outcome = pairwise::pairwise_from_channels(
            &self.backend,
            &order,
            &channels,
            &normality,
            gate,
            alpha,
            self.correction,
        )?;
        decisions.extend(outcome.decisions);

        let ranges: Vec<FilteredRange> = channels
            .iter()
            .filter_map(|channel| {
                layout::filtered_range(channel, self.layout.iqr_min, self.layout.iqr_max)
            })
            .collect();
        let layouts = layout::layout(&ranges, &outcome.significance, &order, &self.layout)?;

        info!(
            tests = outcome.results.len(),
            significant = outcome.significance.len(),
            brackets = layouts.iter().map(|l| l.brackets.len()).sum::<usize>(),
            "significance pipeline finished"
        );

        Ok(PipelineReport {
            groups: order,
            normality,
            variance,
            omnibus,
            pairwise: outcome.results,
            significance: outcome.significance,
            ranges,
            layouts,
            decisions,
        })
    }

    /// Assemble the renderer hand-off for a finished run.
    pub fn render_plan(&self, report: &PipelineReport) -> Result<RenderPlan> {
        RenderPlan::build(report, &self.config.display)
    }
}

//! Error taxonomy for the significance pipeline.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Pipeline stage a failure or a decision belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Normality,
    Variance,
    Omnibus,
    Pairwise,
    Correction,
    Layout,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Normality => "normality",
            Stage::Variance => "variance homogeneity",
            Stage::Omnibus => "omnibus",
            Stage::Pairwise => "pairwise",
            Stage::Correction => "multiple-testing correction",
            Stage::Layout => "layout",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SignificanceError {
    /// A requested biomarker or the group column is absent, or has the wrong kind.
    #[error("schema error: {0}")]
    Schema(String),

    /// The omnibus test needs at least `required` groups.
    #[error("insufficient groups: found {found}, at least {required} required")]
    InsufficientGroups { found: usize, required: usize },

    /// A biomarker/group cell is too small for the selected test.
    #[error("insufficient sample for {biomarker} in group {group}: n = {n}, at least {required} required")]
    InsufficientSample {
        biomarker: String,
        group: String,
        n: usize,
        required: usize,
    },

    #[error("unsupported correction method: {0}")]
    UnsupportedMethod(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// A statistical primitive failed; these are deterministic and never retried.
    #[error("{stage} test failed for {biomarker}: {source}")]
    TestFailed {
        stage: Stage,
        biomarker: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{stage}: p-value correction failed: {source}")]
    Correction {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SignificanceError>;

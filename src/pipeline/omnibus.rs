//! Global k-sample comparison per biomarker.

use super::{Decision, check_alpha, correction_error};
use crate::data::{BiomarkerChannel, Dataset, GroupOrder};
use crate::error::{Result, SignificanceError, Stage};
use crate::pipeline::diagnostics::NormalityTable;
use crate::testing::OmnibusTest;
use crate::testing::correction::{CorrectionMethod, correct_family};
use crate::testing::inference::TestPrimitives;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

/// Fewest distinct groups an omnibus test is defined for here.
pub const MIN_GROUPS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OmnibusResult {
    pub biomarker: String,
    pub test: OmnibusTest,
    pub statistic: f64,
    pub raw_p: f64,
    pub corrected_p: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OmnibusTable {
    results: Vec<OmnibusResult>,
    #[serde(skip)]
    decisions: Vec<Decision>,
}

impl OmnibusTable {
    pub fn results(&self) -> &[OmnibusResult] {
        &self.results
    }

    pub fn get(&self, biomarker: &str) -> Option<&OmnibusResult> {
        self.results.iter().find(|r| r.biomarker == biomarker)
    }

    /// Present with a corrected p strictly below `alpha`.
    pub fn is_significant(&self, biomarker: &str, alpha: f64) -> bool {
        self.get(biomarker).is_some_and(|r| r.corrected_p < alpha)
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }
}

/// ANOVA when every group of a biomarker is normal, Kruskal-Wallis otherwise.
///
/// Needs at least [`MIN_GROUPS`] groups. A biomarker measured in fewer than
/// two of them gets a NaN p-value and is never significant. Raw p-values
/// across biomarkers are corrected as one family.
pub fn test_group_differences<B: TestPrimitives + ?Sized>(
    backend: &B,
    dataset: &Dataset,
    biomarkers: &[String],
    group_column: &str,
    normality: &NormalityTable,
    alpha: f64,
    correction: CorrectionMethod,
) -> Result<OmnibusTable> {
    let (order, channels) = dataset.channels(biomarkers, group_column)?;
    omnibus_from_channels(backend, &order, &channels, normality, alpha, correction)
}

pub(crate) fn omnibus_from_channels<B: TestPrimitives + ?Sized>(
    backend: &B,
    order: &GroupOrder,
    channels: &[BiomarkerChannel],
    normality: &NormalityTable,
    alpha: f64,
    correction: CorrectionMethod,
) -> Result<OmnibusTable> {
    check_alpha(alpha)?;
    if order.len() < MIN_GROUPS {
        return Err(SignificanceError::InsufficientGroups {
            found: order.len(),
            required: MIN_GROUPS,
        });
    }
    if let Some(missing) = channels.iter().find(|c| !normality.contains(&c.name)) {
        return Err(SignificanceError::Schema(format!(
            "normality table has no row for biomarker '{}'",
            missing.name
        )));
    }
    info!(biomarkers = channels.len(), groups = order.len(), "running omnibus tests");

    let rows: Vec<(OmnibusResult, Decision)> = channels
        .par_iter()
        .map(|channel| omnibus_row(backend, order, channel, normality, alpha))
        .collect::<Result<Vec<_>>>()?;

    let (mut results, decisions): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
    let family: Vec<f64> = results.iter().map(|r| r.raw_p).collect();
    let adjusted = correct_family(&family, correction).map_err(correction_error(Stage::Omnibus))?;
    for (result, p) in results.iter_mut().zip(adjusted) {
        result.corrected_p = p;
    }

    Ok(OmnibusTable { results, decisions })
}

fn omnibus_row<B: TestPrimitives + ?Sized>(
    backend: &B,
    order: &GroupOrder,
    channel: &BiomarkerChannel,
    normality: &NormalityTable,
    alpha: f64,
) -> Result<(OmnibusResult, Decision)> {
    let normal = normality
        .all_normal(&channel.name, order.labels(), alpha)
        .unwrap_or(false);
    let test = if normal {
        OmnibusTest::Anova
    } else {
        OmnibusTest::KruskalWallis
    };

    let samples: Vec<&[f64]> = channel
        .samples
        .iter()
        .map(Vec::as_slice)
        .filter(|s| !s.is_empty())
        .collect();
    if samples.len() < 2 {
        let decision = Decision::skipped(
            Stage::Omnibus,
            &channel.name,
            order.labels().to_vec(),
            format!("{} skipped: {} group(s) with data, needs 2", test, samples.len()),
        );
        let result = OmnibusResult {
            biomarker: channel.name.clone(),
            test,
            statistic: f64::NAN,
            raw_p: f64::NAN,
            corrected_p: f64::NAN,
        };
        return Ok((result, decision));
    }

    let result = backend
        .omnibus(test, &samples)
        .map_err(|source| SignificanceError::TestFailed {
            stage: Stage::Omnibus,
            biomarker: channel.name.clone(),
            source,
        })?;

    let reason = if normal {
        "every group normal".to_string()
    } else {
        let failing: Vec<&str> = order
            .labels()
            .iter()
            .filter(|g| !normality.is_normal(&channel.name, g, alpha))
            .map(String::as_str)
            .collect();
        format!("non-normal or untested: {}", failing.join(", "))
    };
    let decision = Decision::ran(
        Stage::Omnibus,
        &channel.name,
        order.labels().to_vec(),
        test,
        reason,
    );

    Ok((
        OmnibusResult {
            biomarker: channel.name.clone(),
            test,
            statistic: result.statistic,
            raw_p: result.p_value,
            corrected_p: f64::NAN,
        },
        decision,
    ))
}

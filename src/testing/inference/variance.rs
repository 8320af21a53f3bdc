//! Homogeneity of variance.

use super::parametric::one_way_anova;
use crate::testing::TestResult;
use crate::testing::utils::median;
use anyhow::{Context, Result, anyhow};

/// Levene's test with median centring (Brown-Forsythe variant).
///
/// The statistic is the one-way ANOVA F of the absolute deviations from each
/// group's median.
pub fn levene(groups: &[&[f64]]) -> Result<TestResult<f64>> {
    if groups.len() < 2 {
        return Err(anyhow!("Levene needs at least 2 groups, got {}", groups.len()));
    }

    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|group| {
            let center = median(group);
            group.iter().map(|&x| (x - center).abs()).collect()
        })
        .collect();
    let views: Vec<&[f64]> = deviations.iter().map(Vec::as_slice).collect();

    one_way_anova(&views).context("Levene test on absolute median deviations")
}

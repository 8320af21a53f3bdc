use crate::error::{Result as SigResult, SignificanceError};
use anyhow::{Result, anyhow};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Multiple testing correction methods to control for false positives
/// when performing many statistical tests simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CorrectionMethod {
    Bonferroni,
    Sidak,
    Holm,
    Hochberg,
    BenjaminiHochberg,
    BenjaminiYekutieli,
    /// Identity; raw p-values are returned unchanged.
    None,
}

impl CorrectionMethod {
    pub fn name(self) -> &'static str {
        match self {
            CorrectionMethod::Bonferroni => "bonferroni",
            CorrectionMethod::Sidak => "sidak",
            CorrectionMethod::Holm => "holm",
            CorrectionMethod::Hochberg => "simes-hochberg",
            CorrectionMethod::BenjaminiHochberg => "fdr_bh",
            CorrectionMethod::BenjaminiYekutieli => "fdr_by",
            CorrectionMethod::None => "none",
        }
    }

    /// Adjust a complete family of p-values.
    pub fn apply(self, p_values: &[f64]) -> Result<Vec<f64>> {
        match self {
            CorrectionMethod::Bonferroni => bonferroni_correction(p_values),
            CorrectionMethod::Sidak => sidak_correction(p_values),
            CorrectionMethod::Holm => holm_bonferroni_correction(p_values),
            CorrectionMethod::Hochberg => hochberg_correction(p_values),
            CorrectionMethod::BenjaminiHochberg => benjamini_hochberg_correction(p_values),
            CorrectionMethod::BenjaminiYekutieli => benjamini_yekutieli_correction(p_values),
            CorrectionMethod::None => {
                validate_p_values(p_values)?;
                Ok(p_values.to_vec())
            }
        }
    }
}

impl fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CorrectionMethod {
    type Err = SignificanceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bonferroni" => Ok(CorrectionMethod::Bonferroni),
            "sidak" => Ok(CorrectionMethod::Sidak),
            "holm" => Ok(CorrectionMethod::Holm),
            "simes-hochberg" | "hochberg" => Ok(CorrectionMethod::Hochberg),
            "fdr_bh" | "bh" | "benjamini-hochberg" | "fdr_i" => {
                Ok(CorrectionMethod::BenjaminiHochberg)
            }
            "fdr_by" | "by" | "benjamini-yekutieli" | "fdr_n" => {
                Ok(CorrectionMethod::BenjaminiYekutieli)
            }
            "none" => Ok(CorrectionMethod::None),
            _ => Err(SignificanceError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Correct one family, leaving NaN entries (tests that did not run) out of it.
///
/// NaN positions stay NaN; the remaining values are corrected as if the NaNs
/// were absent, so the family size counts only tests that ran.
pub fn correct_family(p_values: &[f64], method: CorrectionMethod) -> Result<Vec<f64>> {
    let finite: Vec<(usize, f64)> = p_values
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .map(|(i, &p)| (i, p))
        .collect();

    let mut corrected = vec![f64::NAN; p_values.len()];
    if finite.is_empty() {
        return Ok(corrected);
    }

    let family: Vec<f64> = finite.iter().map(|&(_, p)| p).collect();
    let adjusted = method.apply(&family)?;
    for (&(idx, _), adj) in finite.iter().zip(adjusted) {
        corrected[idx] = adj;
    }
    Ok(corrected)
}

/// Correct p-values with a method selected by name.
///
/// Output has the input's length and order. Unknown names fail with
/// [`SignificanceError::UnsupportedMethod`]; `alpha` must lie in (0, 1).
pub fn correct(p_values: &[f64], alpha: f64, method: &str) -> SigResult<Vec<f64>> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(SignificanceError::Configuration(format!(
            "alpha must be in (0, 1), got {}",
            alpha
        )));
    }
    let method: CorrectionMethod = method.parse()?;
    correct_family(p_values, method).map_err(|source| SignificanceError::Correction {
        stage: crate::error::Stage::Correction,
        source,
    })
}

fn validate_p_values(p_values: &[f64]) -> Result<()> {
    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(anyhow!("Invalid p-value at index {}: {}", i, p));
        }
    }
    Ok(())
}

fn validated_len(p_values: &[f64]) -> Result<usize> {
    if p_values.is_empty() {
        return Err(anyhow!("Empty p-value array"));
    }
    validate_p_values(p_values)?;
    Ok(p_values.len())
}

/// Indices ordered by ascending p-value.
fn ascending_order(p_values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..p_values.len()).collect();
    order.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// Apply Bonferroni correction to p-values
///
/// Bonferroni correction is a simple but conservative method that multiplies
/// each p-value by the number of tests.
pub fn bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    let n = validated_len(p_values)?;
    Ok(p_values.iter().map(|&p| (p * n as f64).min(1.0)).collect())
}

/// Šidák correction, `1 - (1 - p)^n`.
pub fn sidak_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    let n = validated_len(p_values)?;
    Ok(p_values
        .iter()
        .map(|&p| (-((-p).ln_1p() * n as f64).exp_m1()).min(1.0))
        .collect())
}

/// Apply Benjamini-Hochberg (BH) procedure for controlling false discovery rate
///
/// The BH procedure controls the false discovery rate (FDR), which is the expected
/// proportion of false positives among all rejected null hypotheses.
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    let n = validated_len(p_values)?;
    Ok(step_up(p_values, |rank| n as f64 / rank as f64))
}

/// Apply Benjamini-Yekutieli (BY) procedure for controlling false discovery rate under dependence
///
/// The BY procedure is a more conservative variant of the BH procedure that is valid
/// under arbitrary dependence structures among the tests.
pub fn benjamini_yekutieli_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    let n = validated_len(p_values)?;
    let c_n: f64 = (1..=n).map(|i| 1.0 / i as f64).sum();
    Ok(step_up(p_values, |rank| c_n * n as f64 / rank as f64))
}

/// Apply Hochberg's step-up method for controlling family-wise error rate
pub fn hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    let n = validated_len(p_values)?;
    Ok(step_up(p_values, |rank| (n - rank + 1) as f64))
}

/// Step-up adjustment: scale the rank-`r` p-value by `factor(r)` and take the
/// running minimum from the largest p-value down.
fn step_up<F>(p_values: &[f64], factor: F) -> Vec<f64>
where
    F: Fn(usize) -> f64,
{
    let order = ascending_order(p_values);
    let mut adjusted = vec![0.0; p_values.len()];
    let mut current_min: f64 = 1.0;

    for i in (0..order.len()).rev() {
        let idx = order[i];
        let adjustment = (p_values[idx] * factor(i + 1)).min(1.0);
        current_min = adjustment.min(current_min);
        adjusted[idx] = current_min;
    }

    adjusted
}

/// Apply Holm-Bonferroni (step-down) method for controlling family-wise error rate
///
/// The Holm procedure is a step-down method that controls the family-wise error rate (FWER)
/// and is uniformly more powerful than the standard Bonferroni correction.
pub fn holm_bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    let n = validated_len(p_values)?;
    let order = ascending_order(p_values);
    let mut adjusted = vec![0.0; n];
    let mut current_max: f64 = 0.0;

    for (i, &idx) in order.iter().enumerate() {
        let adjustment = (p_values[idx] * (n - i) as f64).min(1.0);
        current_max = adjustment.max(current_max);
        adjusted[idx] = current_max;
    }

    Ok(adjusted)
}

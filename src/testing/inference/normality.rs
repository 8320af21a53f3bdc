//! Univariate normality tests.
//!
//! [`shapiro_wilk`] follows Royston's (1995) approximation (algorithm AS R94)
//! and is used for small samples. [`dagostino_pearson`] combines the skewness
//! and kurtosis z-scores into the K² omnibus statistic and is used for large
//! samples.

use crate::testing::TestResult;
use anyhow::{Result, anyhow};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use std::f64::consts::PI;

const SMALL_RANGE: f64 = 1e-19;

// Polynomial coefficients, lowest power first.
const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const C3: [f64; 4] = [0.544, -0.39978, 0.025054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const G: [f64; 2] = [-2.273, 0.459];

fn poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Shapiro-Wilk W test. Needs at least three observations with a non-zero range.
pub fn shapiro_wilk(sample: &[f64]) -> Result<TestResult<f64>> {
    let n = sample.len();
    if n < 3 {
        return Err(anyhow!("Shapiro-Wilk needs at least 3 observations, got {}", n));
    }

    let mut x = sample.to_vec();
    x.sort_by(|a, b| a.total_cmp(b));
    if x[n - 1] - x[0] < SMALL_RANGE {
        return Err(anyhow!("Shapiro-Wilk undefined: sample has zero range"));
    }

    let coefficients = shapiro_wilk_coefficients(n)?;

    let mean = x.iter().sum::<f64>() / n as f64;
    let ss: f64 = x.iter().map(|&v| (v - mean).powi(2)).sum();
    let numerator: f64 = coefficients
        .iter()
        .enumerate()
        .map(|(i, &a)| a * (x[n - 1 - i] - x[i]))
        .sum();
    let w = (numerator * numerator / ss).min(1.0);

    let p_value = shapiro_wilk_p_value(w, n)?;
    Ok(TestResult::new(w, p_value))
}

/// Upper half of the antisymmetric coefficient vector, `a_1 >= a_2 >= ...`.
fn shapiro_wilk_coefficients(n: usize) -> Result<Vec<f64>> {
    let half = n / 2;
    if n == 3 {
        return Ok(vec![0.5_f64.sqrt()]);
    }

    let normal = Normal::new(0.0, 1.0)?;
    let an25 = n as f64 + 0.25;
    let m: Vec<f64> = (1..=half)
        .map(|i| normal.inverse_cdf((i as f64 - 0.375) / an25))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / (n as f64).sqrt();

    let a1 = poly(&C1, rsn) - m[0] / ssumm2;
    let mut a = vec![0.0; half];
    a[0] = a1;

    let (first_free, fac) = if n > 5 {
        let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
        a[1] = a2;
        let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
            / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
            .sqrt();
        (2, fac)
    } else {
        let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
        (1, fac)
    };

    for i in first_free..half {
        a[i] = -m[i] / fac;
    }
    Ok(a)
}

fn shapiro_wilk_p_value(w: f64, n: usize) -> Result<f64> {
    if n == 3 {
        // Exact distribution for n = 3.
        let p = 6.0 / PI * (w.sqrt().asin() - (0.75_f64).sqrt().asin());
        return Ok(p.clamp(0.0, 1.0));
    }

    let an = n as f64;
    let mut w1 = (1.0 - w).ln();
    let (m, s) = if n <= 11 {
        let gamma = poly(&G, an);
        if w1 >= gamma {
            return Ok(1e-99);
        }
        w1 = -(gamma - w1).ln();
        (poly(&C3, an), poly(&C4, an).exp())
    } else {
        let xx = an.ln();
        (poly(&C5, xx), poly(&C6, xx).exp())
    };

    let normal = Normal::new(m, s)?;
    Ok(normal.sf(w1))
}

/// D'Agostino-Pearson K² test. Needs at least eight observations.
pub fn dagostino_pearson(sample: &[f64]) -> Result<TestResult<f64>> {
    let n = sample.len();
    if n < 8 {
        return Err(anyhow!(
            "D'Agostino-Pearson needs at least 8 observations, got {}",
            n
        ));
    }

    let nf = n as f64;
    let mean = sample.iter().sum::<f64>() / nf;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &v in sample {
        let d = v - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    m2 /= nf;
    m3 /= nf;
    m4 /= nf;
    if m2 <= 0.0 {
        return Err(anyhow!("D'Agostino-Pearson undefined: zero variance"));
    }

    let skewness = m3 / m2.powf(1.5);
    let kurtosis = m4 / (m2 * m2);
    let z_skew = skewness_z(skewness, nf);
    let z_kurt = kurtosis_z(kurtosis, nf);
    if !z_kurt.is_finite() {
        return Err(anyhow!("D'Agostino-Pearson kurtosis statistic is undefined"));
    }

    let k2 = z_skew * z_skew + z_kurt * z_kurt;
    let chi2 = ChiSquared::new(2.0)?;
    Ok(TestResult::new(k2, chi2.sf(k2))
        .with_degrees_of_freedom(2.0)
        .with_metadata("skewness_z", z_skew)
        .with_metadata("kurtosis_z", z_kurt))
}

fn skewness_z(b2: f64, n: f64) -> f64 {
    let y = b2 * (((n + 1.0) * (n + 3.0)) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    delta * (y / alpha).asinh()
}

fn kurtosis_z(b2: f64, n: f64) -> f64 {
    let expected = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 = 24.0 * n * (n - 2.0) * (n - 3.0)
        / ((n + 1.0) * (n + 1.0) * (n + 3.0) * (n + 5.0));
    let x = (b2 - expected) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * ((6.0 * (n + 3.0) * (n + 5.0)) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0
        + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    (term1 - term2) / (2.0 / (9.0 * a)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic, roughly normal sample from inverse-CDF spacing.
    fn normal_scores(n: usize) -> Vec<f64> {
        let normal = Normal::new(10.0, 2.0).unwrap();
        (1..=n)
            .map(|i| normal.inverse_cdf((i as f64 - 0.5) / n as f64))
            .collect()
    }

    fn skewed(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i as f64 * 0.25).exp()).collect()
    }

    #[test]
    fn coefficients_match_published_table() {
        // Royston's approximation against the exact n = 10 weights.
        let a = shapiro_wilk_coefficients(10).unwrap();
        assert_relative_eq!(a[0], 0.5739, epsilon = 2e-3);
        assert_relative_eq!(a[1], 0.3291, epsilon = 2e-3);
        assert_relative_eq!(a[4], 0.0399, epsilon = 2e-3);
    }

    #[test]
    fn shapiro_n3_exact() {
        // Equally spaced triple gives W = 1 and p = 1.
        let result = shapiro_wilk(&[1.0, 2.0, 3.0]).unwrap();
        assert_relative_eq!(result.statistic, 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.p_value, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn shapiro_reference_value() {
        let heights = [148.0, 154.0, 158.0, 160.0, 161.0, 162.0, 166.0, 170.0, 182.0, 195.0, 236.0];
        let result = shapiro_wilk(&heights).unwrap();
        assert_relative_eq!(result.statistic, 0.78881, epsilon = 1e-4);
        assert_relative_eq!(result.p_value, 0.006704, epsilon = 1e-4);
    }

    #[test]
    fn shapiro_accepts_normal_scores() {
        for n in [8, 20, 45] {
            let result = shapiro_wilk(&normal_scores(n)).unwrap();
            assert!(result.statistic > 0.95, "n = {}: W = {}", n, result.statistic);
            assert!(result.p_value > 0.5, "n = {}: p = {}", n, result.p_value);
        }
    }

    #[test]
    fn shapiro_rejects_exponential_growth() {
        let result = shapiro_wilk(&skewed(30)).unwrap();
        assert!(result.p_value < 0.01, "p = {}", result.p_value);
    }

    #[test]
    fn shapiro_input_errors() {
        assert!(shapiro_wilk(&[1.0, 2.0]).is_err());
        assert!(shapiro_wilk(&[4.0, 4.0, 4.0, 4.0]).is_err());
    }

    #[test]
    fn dagostino_accepts_normal_scores() {
        let result = dagostino_pearson(&normal_scores(200)).unwrap();
        assert!(result.p_value > 0.5, "p = {}", result.p_value);
    }

    #[test]
    fn dagostino_rejects_skewed_sample() {
        let result = dagostino_pearson(&skewed(80)).unwrap();
        assert!(result.p_value < 0.001, "p = {}", result.p_value);
        assert!(result.metadata["skewness_z"] > 0.0);
    }

    #[test]
    fn dagostino_input_errors() {
        assert!(dagostino_pearson(&[1.0; 5]).is_err());
        assert!(dagostino_pearson(&[1.0; 60]).is_err());
    }
}

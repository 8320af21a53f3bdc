//! Parametric tests: Welch's two-sample t-test and one-way ANOVA.

use crate::testing::TestResult;
use crate::testing::utils::{mean, sample_variance};
use anyhow::{Result, anyhow};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

/// Welch's t-test comparing two samples without assuming equal variances.
///
/// Each sample needs at least two observations. Fails when both samples have
/// zero variance, since the statistic is undefined.
///
/// # Returns
///
/// `TestResult` containing the t-statistic, the two-sided p-value and the
/// Welch-Satterthwaite degrees of freedom.
pub fn welch_t_test(x: &[f64], y: &[f64]) -> Result<TestResult<f64>> {
    let nx = x.len();
    let ny = y.len();
    if nx < 2 || ny < 2 {
        return Err(anyhow!(
            "Welch t-test needs at least 2 observations per group, got {} and {}",
            nx,
            ny
        ));
    }

    let n1 = nx as f64;
    let n2 = ny as f64;
    let mean_diff = mean(x) - mean(y);

    let term1 = sample_variance(x) / n1;
    let term2 = sample_variance(y) / n2;
    let combined_var = term1 + term2;
    if combined_var <= 0.0 {
        return Err(anyhow!("Welch t-test undefined: both groups have zero variance"));
    }

    let t_stat = mean_diff / combined_var.sqrt();

    // Welch-Satterthwaite equation for degrees of freedom
    let df = combined_var * combined_var
        / (term1 * term1 / (n1 - 1.0) + term2 * term2 / (n2 - 1.0));

    let p_value = t_test_p_value(t_stat, df)?;
    Ok(TestResult::new(t_stat, p_value)
        .with_degrees_of_freedom(df)
        .with_metadata("mean_difference", mean_diff))
}

/// Two-sided p-value of a t statistic.
fn t_test_p_value(t_stat: f64, df: f64) -> Result<f64> {
    if !t_stat.is_finite() {
        return Ok(if t_stat.is_infinite() { 0.0 } else { 1.0 });
    }
    let t_dist = StudentsT::new(0.0, 1.0, df)?;
    Ok((2.0 * t_dist.sf(t_stat.abs())).min(1.0))
}

/// One-way analysis of variance across `k >= 2` groups.
///
/// Every group must be non-empty and the total sample must exceed the number
/// of groups. Fails when the within-group variance is zero.
pub fn one_way_anova(groups: &[&[f64]]) -> Result<TestResult<f64>> {
    let k = groups.len();
    if k < 2 {
        return Err(anyhow!("ANOVA needs at least 2 groups, got {}", k));
    }
    if let Some(idx) = groups.iter().position(|g| g.is_empty()) {
        return Err(anyhow!("ANOVA group {} is empty", idx));
    }

    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    if n_total <= k {
        return Err(anyhow!(
            "ANOVA needs more observations ({}) than groups ({})",
            n_total,
            k
        ));
    }

    let grand_mean = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n_total as f64;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for group in groups {
        let group_mean = mean(group);
        ss_between += group.len() as f64 * (group_mean - grand_mean).powi(2);
        ss_within += group.iter().map(|&x| (x - group_mean).powi(2)).sum::<f64>();
    }

    let df_between = (k - 1) as f64;
    let df_within = (n_total - k) as f64;
    let ms_within = ss_within / df_within;
    if ms_within <= 0.0 {
        return Err(anyhow!("ANOVA undefined: zero within-group variance"));
    }

    let f_stat = (ss_between / df_between) / ms_within;
    let f_dist = FisherSnedecor::new(df_between, df_within)?;
    let p_value = f_dist.sf(f_stat);

    Ok(TestResult::new(f_stat, p_value)
        .with_degrees_of_freedom(df_between)
        .with_metadata("df_within", df_within))
}

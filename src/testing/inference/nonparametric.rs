//! Rank-based tests: Mann-Whitney U and Kruskal-Wallis H.

use crate::testing::TestResult;
use crate::testing::utils::{average_ranks, tie_term};
use anyhow::{Result, anyhow};
use single_utilities::traits::FloatOps;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// Two-sided Mann-Whitney U test.
///
/// Uses the normal approximation with tie-corrected variance and a continuity
/// correction. The reported statistic is U for the first sample. When every
/// observation is tied the test carries no information and the p-value is 1.
pub fn mann_whitney<T>(x: &[T], y: &[T]) -> Result<TestResult<f64>>
where
    T: FloatOps,
{
    let nx = x.len();
    let ny = y.len();

    if nx == 0 || ny == 0 {
        return Err(anyhow!("Mann-Whitney needs non-empty groups, got {} and {}", nx, ny));
    }

    let mut combined: Vec<T> = Vec::with_capacity(nx + ny);
    combined.extend_from_slice(x);
    combined.extend_from_slice(y);
    let (ranks, ties) = average_ranks(&combined);

    let mut rank_sum_x = T::zero();
    for &rank in &ranks[..nx] {
        rank_sum_x += rank;
    }
    let rank_sum_x = rank_sum_x
        .to_f64()
        .ok_or_else(|| anyhow!("rank sum is not representable as f64"))?;

    let n1 = nx as f64;
    let n2 = ny as f64;
    let n = n1 + n2;
    let u_x = rank_sum_x - n1 * (n1 + 1.0) / 2.0;
    let u_y = n1 * n2 - u_x;

    let mean_u = n1 * n2 / 2.0;
    let var_u = n1 * n2 / 12.0 * ((n + 1.0) - tie_term(&ties) / (n * (n - 1.0)));

    let p_value = if var_u > 0.0 {
        let z = (u_x.max(u_y) - mean_u - 0.5) / var_u.sqrt();
        let normal = Normal::new(0.0, 1.0)?;
        (2.0 * normal.sf(z)).min(1.0)
    } else {
        1.0
    };

    Ok(TestResult::new(u_x, p_value)
        .with_metadata("mean_u", mean_u)
        .with_metadata("var_u", var_u)
        .with_metadata("nx", n1)
        .with_metadata("ny", n2))
}

/// Kruskal-Wallis H test across `k >= 2` groups, tie corrected.
///
/// Fails when every observation is tied, since H is undefined.
pub fn kruskal_wallis(groups: &[&[f64]]) -> Result<TestResult<f64>> {
    let k = groups.len();
    if k < 2 {
        return Err(anyhow!("Kruskal-Wallis needs at least 2 groups, got {}", k));
    }
    if let Some(idx) = groups.iter().position(|g| g.is_empty()) {
        return Err(anyhow!("Kruskal-Wallis group {} is empty", idx));
    }

    let combined: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = combined.len() as f64;
    let (ranks, ties) = average_ranks(&combined);

    let mut offset = 0;
    let mut weighted = 0.0;
    for group in groups {
        let rank_sum: f64 = ranks[offset..offset + group.len()].iter().sum();
        weighted += rank_sum * rank_sum / group.len() as f64;
        offset += group.len();
    }

    let h = 12.0 / (n * (n + 1.0)) * weighted - 3.0 * (n + 1.0);
    let tie_correction = 1.0 - tie_term(&ties) / (n * n * n - n);
    if tie_correction <= 0.0 {
        return Err(anyhow!("Kruskal-Wallis undefined: all observations are identical"));
    }
    let h = h / tie_correction;

    let df = (k - 1) as f64;
    let chi2 = ChiSquared::new(df)?;
    Ok(TestResult::new(h, chi2.sf(h)).with_degrees_of_freedom(df))
}

use num_traits::NumCast;
use single_utilities::traits::FloatOps;
use std::cmp::Ordering;

/// Rank values with ties averaged (1-based), returned in input order.
///
/// Also returns the size of every tie block, which tie corrections need.
pub fn average_ranks<T>(values: &[T]) -> (Vec<T>, Vec<usize>)
where
    T: FloatOps,
{
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![T::zero(); values.len()];
    let mut ties = Vec::new();
    let mut i = 0;
    while i < order.len() {
        let val = values[order[i]];
        let mut j = i + 1;

        while j < order.len() && values[order[j]] == val {
            j += 1;
        }

        let rank = <T as NumCast>::from(i + j + 1).unwrap() / <T as NumCast>::from(2).unwrap();
        for &idx in &order[i..j] {
            ranks[idx] = rank;
        }
        ties.push(j - i);

        i = j;
    }

    (ranks, ties)
}

/// `sum(t^3 - t)` over tie blocks.
pub fn tie_term(ties: &[usize]) -> f64 {
    ties.iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum()
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance; NaN below two observations.
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, 0.5)
}

/// Quantile of sorted data with linear interpolation between order statistics.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

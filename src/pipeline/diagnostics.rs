//! Per-group normality and per-biomarker variance homogeneity.

use super::{Decision, correction_error};
use crate::data::{BiomarkerChannel, Dataset, GroupOrder};
use crate::error::{Result, SignificanceError, Stage};
use crate::testing::NormalityTest;
use crate::testing::correction::{CorrectionMethod, correct_family};
use crate::testing::inference::TestPrimitives;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

/// Normality p-values for every (biomarker, group) cell.
///
/// Rows follow the biomarker order the table was built with, columns follow
/// the [`GroupOrder`]. Cells whose test did not run hold NaN in both the raw
/// and corrected tables.
#[derive(Debug, Clone, Serialize)]
pub struct NormalityTable {
    biomarkers: Vec<String>,
    groups: GroupOrder,
    tests: Array2<NormalityTest>,
    raw: Array2<f64>,
    corrected: Array2<f64>,
    #[serde(skip)]
    decisions: Vec<Decision>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalityCell {
    pub test: NormalityTest,
    pub raw_p: f64,
    pub corrected_p: f64,
}

impl NormalityTable {
    /// Build a table from already corrected p-values, one row per biomarker.
    pub fn from_corrected(
        biomarkers: Vec<String>,
        groups: GroupOrder,
        corrected: Array2<f64>,
    ) -> Result<Self> {
        if corrected.dim() != (biomarkers.len(), groups.len()) {
            return Err(SignificanceError::Schema(format!(
                "normality table shape {:?} does not match {} biomarkers x {} groups",
                corrected.dim(),
                biomarkers.len(),
                groups.len()
            )));
        }
        let tests = corrected.mapv(|p| {
            if p.is_nan() {
                NormalityTest::NotRun
            } else {
                NormalityTest::External
            }
        });
        Ok(NormalityTable {
            biomarkers,
            groups,
            tests,
            raw: corrected.clone(),
            corrected,
            decisions: Vec::new(),
        })
    }

    pub fn biomarkers(&self) -> &[String] {
        &self.biomarkers
    }

    pub fn groups(&self) -> &GroupOrder {
        &self.groups
    }

    pub fn raw(&self) -> ArrayView2<'_, f64> {
        self.raw.view()
    }

    pub fn corrected(&self) -> ArrayView2<'_, f64> {
        self.corrected.view()
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn contains(&self, biomarker: &str) -> bool {
        self.row(biomarker).is_some()
    }

    fn row(&self, biomarker: &str) -> Option<usize> {
        self.biomarkers.iter().position(|b| b == biomarker)
    }

    pub fn cell(&self, biomarker: &str, group: &str) -> Option<NormalityCell> {
        let i = self.row(biomarker)?;
        let j = self.groups.position(group)?;
        Some(NormalityCell {
            test: self.tests[[i, j]],
            raw_p: self.raw[[i, j]],
            corrected_p: self.corrected[[i, j]],
        })
    }

    /// Corrected p strictly above `alpha`. NaN and unknown cells are not normal.
    pub fn is_normal(&self, biomarker: &str, group: &str, alpha: f64) -> bool {
        self.cell(biomarker, group)
            .is_some_and(|cell| cell.corrected_p > alpha)
    }

    /// Whether every listed group is normal; `None` if the biomarker is absent.
    pub fn all_normal<S: AsRef<str>>(&self, biomarker: &str, groups: &[S], alpha: f64) -> Option<bool> {
        self.row(biomarker)?;
        Some(
            groups
                .iter()
                .all(|g| self.is_normal(biomarker, g.as_ref(), alpha)),
        )
    }
}

/// Run the size-appropriate normality test on every (biomarker, group) cell and
/// correct all cells as one family.
pub fn assess_normality<B: TestPrimitives + ?Sized>(
    backend: &B,
    dataset: &Dataset,
    biomarkers: &[String],
    group_column: &str,
    correction: CorrectionMethod,
) -> Result<NormalityTable> {
    let (order, channels) = dataset.channels(biomarkers, group_column)?;
    normality_from_channels(backend, &order, &channels, correction)
}

type NormalityRow = (Vec<(NormalityTest, f64)>, Vec<Decision>);

pub(crate) fn normality_from_channels<B: TestPrimitives + ?Sized>(
    backend: &B,
    order: &GroupOrder,
    channels: &[BiomarkerChannel],
    correction: CorrectionMethod,
) -> Result<NormalityTable> {
    info!(
        biomarkers = channels.len(),
        groups = order.len(),
        "assessing normality"
    );

    let rows: Vec<NormalityRow> = channels
        .par_iter()
        .map(|channel| normality_row(backend, order, channel))
        .collect::<Result<Vec<_>>>()?;

    let shape = (channels.len(), order.len());
    let mut tests = Array2::from_elem(shape, NormalityTest::NotRun);
    let mut raw = Array2::from_elem(shape, f64::NAN);
    let mut decisions = Vec::new();
    for (i, (cells, row_decisions)) in rows.into_iter().enumerate() {
        for (j, (test, p)) in cells.into_iter().enumerate() {
            tests[[i, j]] = test;
            raw[[i, j]] = p;
        }
        decisions.extend(row_decisions);
    }

    let family: Vec<f64> = raw.iter().copied().collect();
    let adjusted =
        correct_family(&family, correction).map_err(correction_error(Stage::Normality))?;
    let mut corrected = raw.clone();
    for (slot, p) in corrected.iter_mut().zip(adjusted) {
        *slot = p;
    }

    Ok(NormalityTable {
        biomarkers: channels.iter().map(|c| c.name.clone()).collect(),
        groups: order.clone(),
        tests,
        raw,
        corrected,
        decisions,
    })
}

fn normality_row<B: TestPrimitives + ?Sized>(
    backend: &B,
    order: &GroupOrder,
    channel: &BiomarkerChannel,
) -> Result<NormalityRow> {
    let mut cells = Vec::with_capacity(order.len());
    let mut decisions = Vec::with_capacity(order.len());

    for (pos, group) in order.labels().iter().enumerate() {
        let sample = channel.group(pos);
        let test = NormalityTest::for_sample_size(sample.len());

        if test == NormalityTest::NotRun {
            let reason = SignificanceError::InsufficientSample {
                biomarker: channel.name.clone(),
                group: group.clone(),
                n: sample.len(),
                required: NormalityTest::MIN_SAMPLE,
            };
            decisions.push(Decision::skipped(
                Stage::Normality,
                &channel.name,
                vec![group.clone()],
                reason.to_string(),
            ));
            cells.push((test, f64::NAN));
            continue;
        }

        let result = backend
            .normality(test, sample)
            .map_err(|source| SignificanceError::TestFailed {
                stage: Stage::Normality,
                biomarker: channel.name.clone(),
                source,
            })?;
        decisions.push(Decision::ran(
            Stage::Normality,
            &channel.name,
            vec![group.clone()],
            test,
            format!("n = {}, raw p = {:.4}", sample.len(), result.p_value),
        ));
        cells.push((test, result.p_value));
    }

    Ok((cells, decisions))
}

/// Smallest group Levene's test takes in; below it the absolute median
/// deviations carry no spread.
pub const LEVENE_MIN_SAMPLE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceResult {
    pub biomarker: String,
    pub statistic: f64,
    pub raw_p: f64,
    pub corrected_p: f64,
}

/// Levene results per biomarker, corrected across biomarkers.
#[derive(Debug, Clone, Serialize)]
pub struct VarianceTable {
    results: Vec<VarianceResult>,
    #[serde(skip)]
    decisions: Vec<Decision>,
}

impl VarianceTable {
    pub fn results(&self) -> &[VarianceResult] {
        &self.results
    }

    pub fn get(&self, biomarker: &str) -> Option<&VarianceResult> {
        self.results.iter().find(|r| r.biomarker == biomarker)
    }

    /// Corrected p above `alpha`; `None` for unknown biomarkers.
    pub fn is_homogeneous(&self, biomarker: &str, alpha: f64) -> Option<bool> {
        self.get(biomarker).map(|r| r.corrected_p > alpha)
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }
}

/// One Levene test per biomarker across all groups with at least
/// [`LEVENE_MIN_SAMPLE`] values. Smaller groups are left out with a warning.
pub fn assess_variance_homogeneity<B: TestPrimitives + ?Sized>(
    backend: &B,
    dataset: &Dataset,
    biomarkers: &[String],
    group_column: &str,
    correction: CorrectionMethod,
) -> Result<VarianceTable> {
    let (order, channels) = dataset.channels(biomarkers, group_column)?;
    variance_from_channels(backend, &channels, &order, correction)
}

pub(crate) fn variance_from_channels<B: TestPrimitives + ?Sized>(
    backend: &B,
    channels: &[BiomarkerChannel],
    order: &GroupOrder,
    correction: CorrectionMethod,
) -> Result<VarianceTable> {
    info!(biomarkers = channels.len(), "assessing variance homogeneity");

    let rows: Vec<(VarianceResult, Vec<Decision>)> = channels
        .par_iter()
        .map(|channel| variance_row(backend, order, channel))
        .collect::<Result<Vec<_>>>()?;

    let (mut results, decisions): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
    let family: Vec<f64> = results.iter().map(|r| r.raw_p).collect();
    let adjusted =
        correct_family(&family, correction).map_err(correction_error(Stage::Variance))?;
    for (result, p) in results.iter_mut().zip(adjusted) {
        result.corrected_p = p;
    }

    Ok(VarianceTable {
        results,
        decisions: decisions.into_iter().flatten().collect(),
    })
}

fn variance_row<B: TestPrimitives + ?Sized>(
    backend: &B,
    order: &GroupOrder,
    channel: &BiomarkerChannel,
) -> Result<(VarianceResult, Vec<Decision>)> {
    let mut labels = Vec::new();
    let mut samples: Vec<&[f64]> = Vec::new();
    let mut too_small = Vec::new();
    for (pos, label) in order.labels().iter().enumerate() {
        let sample = channel.group(pos);
        if sample.len() >= LEVENE_MIN_SAMPLE {
            labels.push(label.clone());
            samples.push(sample);
        } else if !sample.is_empty() {
            let reason = SignificanceError::InsufficientSample {
                biomarker: channel.name.clone(),
                group: label.clone(),
                n: sample.len(),
                required: LEVENE_MIN_SAMPLE,
            };
            too_small.push(Decision::skipped(
                Stage::Variance,
                &channel.name,
                vec![label.clone()],
                format!("left out of Levene: {}", reason),
            ));
        }
    }

    if samples.len() < 2 {
        let decision = Decision::skipped(
            Stage::Variance,
            &channel.name,
            labels,
            format!(
                "{} group(s) with at least {} values, Levene needs 2",
                samples.len(),
                LEVENE_MIN_SAMPLE
            ),
        );
        let result = VarianceResult {
            biomarker: channel.name.clone(),
            statistic: f64::NAN,
            raw_p: f64::NAN,
            corrected_p: f64::NAN,
        };
        let mut decisions = vec![decision];
        decisions.extend(too_small);
        return Ok((result, decisions));
    }

    let levene = backend
        .levene(&samples)
        .map_err(|source| SignificanceError::TestFailed {
            stage: Stage::Variance,
            biomarker: channel.name.clone(),
            source,
        })?;
    let decision = Decision::ran(
        Stage::Variance,
        &channel.name,
        labels,
        "Levene",
        format!("{} groups, raw p = {:.4}", samples.len(), levene.p_value),
    );
    let result = VarianceResult {
        biomarker: channel.name.clone(),
        statistic: levene.statistic,
        raw_p: levene.p_value,
        corrected_p: f64::NAN,
    };
    let mut decisions = vec![decision];
    decisions.extend(too_small);
    Ok((result, decisions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::inference::StatrsBackend;
    use approx::assert_relative_eq;
    use ndarray::array;
    use statrs::distribution::{ContinuousCDF, Normal};

    fn normal_scores(n: usize, mean: f64) -> Vec<f64> {
        let normal = Normal::new(mean, 1.0).unwrap();
        (1..=n)
            .map(|i| normal.inverse_cdf((i as f64 - 0.5) / n as f64))
            .collect()
    }

    fn dataset(groups: &[(&str, Vec<f64>)]) -> Dataset {
        let mut labels = Vec::new();
        let mut values = Vec::new();
        for (label, sample) in groups {
            for &v in sample {
                labels.push(Some(label.to_string()));
                values.push(Some(v));
            }
        }
        Dataset::new()
            .with_labels("group", labels)
            .unwrap()
            .with_values("marker", values)
            .unwrap()
    }

    #[test]
    fn selects_test_by_sample_size() {
        let data = dataset(&[
            ("A", normal_scores(10, 0.0)),
            ("B", normal_scores(60, 1.0)),
            ("C", vec![1.0, 2.0]),
        ]);
        let table = assess_normality(
            &StatrsBackend,
            &data,
            &["marker".to_string()],
            "group",
            CorrectionMethod::BenjaminiHochberg,
        )
        .unwrap();

        assert_eq!(table.cell("marker", "A").unwrap().test, NormalityTest::ShapiroWilk);
        assert_eq!(table.cell("marker", "B").unwrap().test, NormalityTest::DAgostinoPearson);
        let c = table.cell("marker", "C").unwrap();
        assert_eq!(c.test, NormalityTest::NotRun);
        assert!(c.raw_p.is_nan() && c.corrected_p.is_nan());
        assert!(!table.is_normal("marker", "C", 0.05));
        assert!(table.decisions().iter().any(|d| d.is_skip() && d.groups == ["C"]));
    }

    #[test]
    fn nan_cells_do_not_count_in_the_family() {
        let data = dataset(&[
            ("A", normal_scores(10, 0.0)),
            ("B", normal_scores(12, 1.0)),
            ("C", vec![5.0]),
        ]);
        let bonferroni = assess_normality(
            &StatrsBackend,
            &data,
            &["marker".to_string()],
            "group",
            CorrectionMethod::Bonferroni,
        )
        .unwrap();
        let a = bonferroni.cell("marker", "A").unwrap();
        assert_relative_eq!(a.corrected_p, (a.raw_p * 2.0).min(1.0), epsilon = 1e-12);
    }

    #[test]
    fn degenerate_group_fails_with_stage() {
        let data = dataset(&[("A", vec![3.0; 6]), ("B", normal_scores(8, 0.0))]);
        let err = assess_normality(
            &StatrsBackend,
            &data,
            &["marker".to_string()],
            "group",
            CorrectionMethod::None,
        )
        .unwrap_err();
        match err {
            SignificanceError::TestFailed { stage, biomarker, .. } => {
                assert_eq!(stage, Stage::Normality);
                assert_eq!(biomarker, "marker");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn missing_biomarker_is_schema_error() {
        let data = dataset(&[("A", vec![1.0, 2.0, 3.0])]);
        let result = assess_normality(
            &StatrsBackend,
            &data,
            &["absent".to_string()],
            "group",
            CorrectionMethod::None,
        );
        assert!(matches!(result, Err(SignificanceError::Schema(_))));
    }

    #[test]
    fn from_corrected_lookups() {
        let order = GroupOrder::from_labels(["A", "B", "C"]);
        let table = NormalityTable::from_corrected(
            vec!["x".to_string()],
            order.clone(),
            array![[0.9, 0.9, f64::NAN]],
        )
        .unwrap();
        assert!(table.is_normal("x", "A", 0.05));
        assert!(!table.is_normal("x", "C", 0.05));
        assert!(!table.is_normal("y", "A", 0.05));
        assert_eq!(table.all_normal("x", &["A", "B"], 0.05), Some(true));
        assert_eq!(table.all_normal("x", order.labels(), 0.05), Some(false));
        assert_eq!(table.all_normal("y", order.labels(), 0.05), None);

        let bad = NormalityTable::from_corrected(vec!["x".to_string()], order, array![[0.9]]);
        assert!(matches!(bad, Err(SignificanceError::Schema(_))));
    }

    #[test]
    fn levene_per_biomarker() {
        let tight: Vec<f64> = normal_scores(20, 0.0).iter().map(|v| v * 0.1).collect();
        let wide: Vec<f64> = normal_scores(20, 0.0).iter().map(|v| v * 10.0).collect();
        let data = dataset(&[("A", tight), ("B", wide), ("C", vec![])]);
        let table = assess_variance_homogeneity(
            &StatrsBackend,
            &data,
            &["marker".to_string()],
            "group",
            CorrectionMethod::BenjaminiHochberg,
        )
        .unwrap();
        let result = table.get("marker").unwrap();
        assert!(result.corrected_p < 0.001, "p = {}", result.corrected_p);
        assert_eq!(table.is_homogeneous("marker", 0.05), Some(false));
        assert_eq!(table.decisions()[0].groups, ["A", "B"]);
    }

    #[test]
    fn levene_skips_single_group() {
        let data = dataset(&[("A", vec![1.0, 2.0, 4.0])]);
        let table = assess_variance_homogeneity(
            &StatrsBackend,
            &data,
            &["marker".to_string()],
            "group",
            CorrectionMethod::Holm,
        )
        .unwrap();
        assert!(table.get("marker").unwrap().corrected_p.is_nan());
        assert!(table.decisions()[0].is_skip());
    }

    #[test]
    fn levene_leaves_out_groups_of_two() {
        let data = dataset(&[
            ("A", normal_scores(12, 0.0)),
            ("B", normal_scores(12, 1.0)),
            ("C", vec![4.0, 9.0]),
        ]);
        let table = assess_variance_homogeneity(
            &StatrsBackend,
            &data,
            &["marker".to_string()],
            "group",
            CorrectionMethod::None,
        )
        .unwrap();
        assert!(table.get("marker").unwrap().raw_p.is_finite());
        assert_eq!(table.decisions()[0].groups, ["A", "B"]);
        assert!(table.decisions().iter().any(|d| d.is_skip() && d.groups == ["C"]));

        let all_pairs = dataset(&[("A", vec![1.0, 2.0]), ("B", vec![3.0, 5.0]), ("C", vec![8.0, 13.0])]);
        let table = assess_variance_homogeneity(
            &StatrsBackend,
            &all_pairs,
            &["marker".to_string()],
            "group",
            CorrectionMethod::None,
        )
        .unwrap();
        assert!(table.get("marker").unwrap().raw_p.is_nan());
        assert!(table.decisions().iter().all(Decision::is_skip));
    }

    #[test]
    fn levene_family_spans_biomarkers() {
        let tight: Vec<f64> = normal_scores(15, 0.0).iter().map(|v| v * 0.5).collect();
        let wide: Vec<f64> = normal_scores(15, 0.0).iter().map(|v| v * 2.0).collect();
        let mut labels = Vec::new();
        let mut first = Vec::new();
        let mut second = Vec::new();
        for (label, a, b) in [("A", &tight, &tight), ("B", &tight, &wide)] {
            for (x, y) in a.iter().zip(b.iter()) {
                labels.push(Some(label.to_string()));
                first.push(Some(*x + (first.len() % 4) as f64 * 0.1));
                second.push(Some(*y));
            }
        }
        let data = Dataset::new()
            .with_labels("group", labels)
            .unwrap()
            .with_values("IL6", first)
            .unwrap()
            .with_values("GFAP", second)
            .unwrap();
        let table = assess_variance_homogeneity(
            &StatrsBackend,
            &data,
            &["IL6".to_string(), "GFAP".to_string()],
            "group",
            CorrectionMethod::Bonferroni,
        )
        .unwrap();

        println!("=== LEVENE, BONFERRONI OVER TWO BIOMARKERS ===");
        for result in table.results() {
            println!("{}: raw p = {}, corrected p = {}", result.biomarker, result.raw_p, result.corrected_p);
            assert!(result.raw_p.is_finite());
            assert_relative_eq!(result.corrected_p, (2.0 * result.raw_p).min(1.0), epsilon = 1e-12);
        }
        assert_eq!(table.results().len(), 2);
    }
}

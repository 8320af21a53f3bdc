//! Pairwise group comparisons and the significance map they produce.

use super::{Decision, check_alpha, correction_error};
use crate::data::{BiomarkerChannel, Dataset, GroupOrder, GroupPair};
use crate::error::{Result, SignificanceError, Stage};
use crate::pipeline::diagnostics::NormalityTable;
use crate::pipeline::omnibus::OmnibusTable;
use crate::testing::PairwiseTest;
use crate::testing::correction::{CorrectionMethod, correct_family};
use crate::testing::inference::TestPrimitives;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairwiseResult {
    pub biomarker: String,
    pub pair: GroupPair,
    pub test: PairwiseTest,
    pub statistic: f64,
    pub raw_p: f64,
    pub corrected_p: f64,
}

/// A significant pair and its corrected p-value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignificanceRecord {
    pub pair: GroupPair,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct BiomarkerSignificance {
    biomarker: String,
    records: Vec<SignificanceRecord>,
}

/// Significant pairs per biomarker, in insertion order.
///
/// Biomarkers keep the order in which they were first inserted and each
/// biomarker's records keep their insertion order, which is the stacking
/// order of the brackets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SignificanceMap {
    entries: Vec<BiomarkerSignificance>,
}

impl SignificanceMap {
    pub fn new() -> Self {
        SignificanceMap::default()
    }

    pub fn insert(&mut self, biomarker: &str, pair: GroupPair, p_value: f64) {
        let record = SignificanceRecord { pair, p_value };
        match self.entries.iter_mut().find(|e| e.biomarker == biomarker) {
            Some(entry) => entry.records.push(record),
            None => self.entries.push(BiomarkerSignificance {
                biomarker: biomarker.to_string(),
                records: vec![record],
            }),
        }
    }

    pub fn get(&self, biomarker: &str) -> Option<&[SignificanceRecord]> {
        self.entries
            .iter()
            .find(|e| e.biomarker == biomarker)
            .map(|e| e.records.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SignificanceRecord])> {
        self.entries
            .iter()
            .map(|e| (e.biomarker.as_str(), e.records.as_slice()))
    }

    /// Total number of significant pairs.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct PairwiseOutcome {
    pub significance: SignificanceMap,
    /// Every pair that was tested, in enumeration order.
    pub results: Vec<PairwiseResult>,
    pub decisions: Vec<Decision>,
}

/// Test every group pair of every biomarker.
///
/// Both groups normal selects Welch's t-test, anything else Mann-Whitney U.
/// With an omnibus table and more than two groups, biomarkers whose omnibus
/// test is not significant are skipped. All tested pairs across all
/// biomarkers form one correction family.
#[allow(clippy::too_many_arguments)]
pub fn pairwise_compare<B: TestPrimitives + ?Sized>(
    backend: &B,
    dataset: &Dataset,
    biomarkers: &[String],
    group_column: &str,
    normality: &NormalityTable,
    omnibus: Option<&OmnibusTable>,
    alpha: f64,
    correction: CorrectionMethod,
) -> Result<PairwiseOutcome> {
    let (order, channels) = dataset.channels(biomarkers, group_column)?;
    pairwise_from_channels(backend, &order, &channels, normality, omnibus, alpha, correction)
}

type PairwiseRow = (Vec<PairwiseResult>, Vec<Decision>);

pub(crate) fn pairwise_from_channels<B: TestPrimitives + ?Sized>(
    backend: &B,
    order: &GroupOrder,
    channels: &[BiomarkerChannel],
    normality: &NormalityTable,
    omnibus: Option<&OmnibusTable>,
    alpha: f64,
    correction: CorrectionMethod,
) -> Result<PairwiseOutcome> {
    check_alpha(alpha)?;
    let gate = omnibus.filter(|_| order.len() > 2);
    info!(
        biomarkers = channels.len(),
        pairs = order.len() * order.len().saturating_sub(1) / 2,
        gated = gate.is_some(),
        "running pairwise tests"
    );

    let rows: Vec<PairwiseRow> = channels
        .par_iter()
        .map(|channel| pairwise_row(backend, order, channel, normality, gate, alpha))
        .collect::<Result<Vec<_>>>()?;

    let mut results = Vec::new();
    let mut decisions = Vec::new();
    for (row_results, row_decisions) in rows {
        results.extend(row_results);
        decisions.extend(row_decisions);
    }

    let family: Vec<f64> = results.iter().map(|r| r.raw_p).collect();
    let adjusted =
        correct_family(&family, correction).map_err(correction_error(Stage::Pairwise))?;
    let mut significance = SignificanceMap::new();
    for (result, p) in results.iter_mut().zip(adjusted) {
        result.corrected_p = p;
        if p < alpha {
            significance.insert(&result.biomarker, result.pair.clone(), p);
        }
    }

    Ok(PairwiseOutcome {
        significance,
        results,
        decisions,
    })
}

fn pairwise_row<B: TestPrimitives + ?Sized>(
    backend: &B,
    order: &GroupOrder,
    channel: &BiomarkerChannel,
    normality: &NormalityTable,
    gate: Option<&OmnibusTable>,
    alpha: f64,
) -> Result<PairwiseRow> {
    let mut results = Vec::new();
    let mut decisions = Vec::new();

    if let Some(omnibus) = gate {
        if !omnibus.is_significant(&channel.name, alpha) {
            let reason = match omnibus.get(&channel.name) {
                Some(result) => format!(
                    "omnibus {} not significant (corrected p = {:.4})",
                    result.test, result.corrected_p
                ),
                None => "no omnibus result".to_string(),
            };
            decisions.push(Decision::gated(
                Stage::Pairwise,
                &channel.name,
                order.labels().to_vec(),
                reason,
            ));
            return Ok((results, decisions));
        }
    }

    for pair in order.pairs() {
        let groups = vec![pair.first.clone(), pair.second.clone()];
        let (Some(i), Some(j)) = (order.position(&pair.first), order.position(&pair.second))
        else {
            continue;
        };
        let (x, y) = (channel.group(i), channel.group(j));

        let first_normal = normality.is_normal(&channel.name, &pair.first, alpha);
        let second_normal = normality.is_normal(&channel.name, &pair.second, alpha);
        let test = if first_normal && second_normal {
            PairwiseTest::TTest
        } else {
            PairwiseTest::MannWhitney
        };

        let required = test.min_sample();
        if let Some((group, n)) = [(&pair.first, x.len()), (&pair.second, y.len())]
            .into_iter()
            .find(|&(_, n)| n < required)
        {
            let reason = SignificanceError::InsufficientSample {
                biomarker: channel.name.clone(),
                group: group.clone(),
                n,
                required,
            };
            decisions.push(Decision::skipped(
                Stage::Pairwise,
                &channel.name,
                groups,
                format!("{} skipped: {}", test, reason),
            ));
            continue;
        }

        let result = backend
            .pairwise(test, x, y)
            .map_err(|source| SignificanceError::TestFailed {
                stage: Stage::Pairwise,
                biomarker: channel.name.clone(),
                source,
            })?;

        let reason = match (first_normal, second_normal) {
            (true, true) => "both groups normal".to_string(),
            (false, true) => format!("{} not normal", pair.first),
            (true, false) => format!("{} not normal", pair.second),
            (false, false) => "neither group normal".to_string(),
        };
        decisions.push(Decision::ran(Stage::Pairwise, &channel.name, groups, test, reason));
        results.push(PairwiseResult {
            biomarker: channel.name.clone(),
            pair,
            test,
            statistic: result.statistic,
            raw_p: result.p_value,
            corrected_p: f64::NAN,
        });
    }

    Ok((results, decisions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestResult;
    use ndarray::array;

    struct Fixed;

    impl TestPrimitives for Fixed {
        fn shapiro_wilk(&self, _: &[f64]) -> anyhow::Result<TestResult<f64>> {
            Ok(TestResult::new(0.99, 0.9))
        }
        fn dagostino_pearson(&self, _: &[f64]) -> anyhow::Result<TestResult<f64>> {
            Ok(TestResult::new(0.5, 0.9))
        }
        fn levene(&self, _: &[&[f64]]) -> anyhow::Result<TestResult<f64>> {
            Ok(TestResult::new(1.0, 0.5))
        }
        fn anova(&self, _: &[&[f64]]) -> anyhow::Result<TestResult<f64>> {
            Ok(TestResult::new(4.0, 0.01))
        }
        fn kruskal_wallis(&self, _: &[&[f64]]) -> anyhow::Result<TestResult<f64>> {
            Ok(TestResult::new(9.0, 0.2))
        }
        fn welch_t_test(&self, _: &[f64], _: &[f64]) -> anyhow::Result<TestResult<f64>> {
            Ok(TestResult::new(2.0, 0.001))
        }
        fn mann_whitney(&self, _: &[f64], _: &[f64]) -> anyhow::Result<TestResult<f64>> {
            Ok(TestResult::new(10.0, 0.04))
        }
    }

    fn data(sizes: [usize; 3]) -> Dataset {
        let mut labels = Vec::new();
        let mut values = Vec::new();
        for (label, n) in ["A", "B", "C"].iter().zip(sizes) {
            for i in 0..n {
                labels.push(Some(label.to_string()));
                values.push(Some(i as f64));
            }
        }
        Dataset::new()
            .with_labels("group", labels)
            .unwrap()
            .with_values("marker", values)
            .unwrap()
    }

    fn normality(p: [f64; 3]) -> NormalityTable {
        NormalityTable::from_corrected(
            vec!["marker".to_string()],
            GroupOrder::from_labels(["A", "B", "C"]),
            array![[p[0], p[1], p[2]]],
        )
        .unwrap()
    }

    fn compare(
        sizes: [usize; 3],
        p: [f64; 3],
        omnibus: Option<&OmnibusTable>,
        correction: CorrectionMethod,
    ) -> PairwiseOutcome {
        pairwise_compare(
            &Fixed,
            &data(sizes),
            &["marker".to_string()],
            "group",
            &normality(p),
            omnibus,
            0.05,
            correction,
        )
        .unwrap()
    }

    #[test]
    fn test_selection_follows_both_groups() {
        let outcome = compare([40, 45, 60], [0.9, 0.9, 0.01], None, CorrectionMethod::None);
        let tests: Vec<(String, String, String)> = outcome
            .results
            .iter()
            .map(|r| (r.pair.first.clone(), r.pair.second.clone(), r.test.to_string()))
            .collect();
        assert_eq!(
            tests,
            vec![
                ("A".into(), "B".into(), "t-test".into()),
                ("A".into(), "C".into(), "Mann-Whitney".into()),
                ("B".into(), "C".into(), "Mann-Whitney".into()),
            ]
        );
    }

    #[test]
    fn one_global_family() {
        // raw p: 0.001, 0.04, 0.04; Bonferroni over 3 keeps only A-B.
        let outcome = compare([5, 5, 5], [0.9, 0.9, 0.01], None, CorrectionMethod::Bonferroni);
        let records = outcome.significance.get("marker").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pair.first, "A");
        assert_eq!(records[0].pair.second, "B");
        assert!((records[0].p_value - 0.003).abs() < 1e-12);
        assert!((outcome.results[1].corrected_p - 0.12).abs() < 1e-12);
    }

    #[test]
    fn small_groups_are_skipped_not_failed() {
        let outcome = compare([1, 5, 5], [0.9, 0.9, 0.9], None, CorrectionMethod::None);
        // A has one value: both t-tests involving A are skipped.
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].pair.first, "B");
        let skips: Vec<&Decision> = outcome.decisions.iter().filter(|d| d.is_skip()).collect();
        assert_eq!(skips.len(), 2);
        assert!(skips[0].reason.contains("n = 1"));
    }

    #[test]
    fn omnibus_gate_skips_whole_biomarker() {
        let dataset = data([5, 5, 5]);
        let table = normality([0.01, 0.01, 0.01]);
        let omnibus = crate::pipeline::omnibus::test_group_differences(
            &Fixed,
            &dataset,
            &["marker".to_string()],
            "group",
            &table,
            0.05,
            CorrectionMethod::None,
        )
        .unwrap();
        // Kruskal-Wallis returns 0.2 here.
        let outcome = compare([5, 5, 5], [0.01, 0.01, 0.01], Some(&omnibus), CorrectionMethod::None);
        assert!(outcome.results.is_empty());
        assert!(outcome.significance.is_empty());
        assert_eq!(outcome.decisions.len(), 1);
        assert!(outcome.decisions[0].is_skip());
    }

    #[test]
    fn map_preserves_insertion_order() {
        let order = GroupOrder::from_labels(["A", "B", "C"]);
        let mut map = SignificanceMap::new();
        map.insert("x", GroupPair::canonical("A", "C", &order).unwrap(), 0.001);
        map.insert("y", GroupPair::canonical("A", "B", &order).unwrap(), 0.01);
        map.insert("x", GroupPair::canonical("B", "A", &order).unwrap(), 0.04);
        let x = map.get("x").unwrap();
        assert_eq!(x[0].pair.second, "C");
        assert_eq!(x[1].pair.second, "B");
        assert_eq!(map.iter().map(|(b, _)| b).collect::<Vec<_>>(), ["x", "y"]);
        assert_eq!(map.len(), 3);
        assert!(map.get("z").is_none());
    }
}

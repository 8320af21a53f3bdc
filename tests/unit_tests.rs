use boxplot_significance::data::{Dataset, GroupOrder, GroupPair};
use boxplot_significance::error::SignificanceError;
use boxplot_significance::layout::{self, FilteredRange, LabelFormat, LayoutConfig};
use boxplot_significance::pipeline::{
    NormalityTable, SignificanceMap, pairwise_compare, test_group_differences,
};
use boxplot_significance::testing::correction::{CorrectionMethod, correct};
use boxplot_significance::testing::inference::StatrsBackend;
use boxplot_significance::testing::inference::nonparametric::mann_whitney;
use boxplot_significance::testing::inference::parametric::{one_way_anova, welch_t_test};
use ndarray::array;

fn biomarker() -> Vec<String> {
    vec!["TREM2".to_string()]
}

/// Three groups of the given sizes with a mild upward shift per group.
fn cohort(sizes: [usize; 3]) -> Dataset {
    let mut labels = Vec::new();
    let mut values = Vec::new();
    for (shift, (label, n)) in ["A", "B", "C"].iter().zip(sizes).enumerate() {
        for i in 0..n {
            labels.push(Some(label.to_string()));
            values.push(Some(shift as f64 * 0.5 + (i % 7) as f64 + (i % 3) as f64 * 0.25));
        }
    }
    Dataset::new()
        .with_labels("diagnosis", labels)
        .unwrap()
        .with_values("TREM2", values)
        .unwrap()
}

fn normality(p: [f64; 3]) -> NormalityTable {
    NormalityTable::from_corrected(
        biomarker(),
        GroupOrder::from_labels(["A", "B", "C"]),
        array![[p[0], p[1], p[2]]],
    )
    .unwrap()
}

#[cfg(test)]
mod test_selection {
    use super::*;

    #[test]
    fn omnibus_picks_anova_when_every_group_is_normal() {
        let result = test_group_differences(
            &StatrsBackend,
            &cohort([40, 45, 60]),
            &biomarker(),
            "diagnosis",
            &normality([0.9, 0.9, 0.9]),
            0.05,
            CorrectionMethod::BenjaminiHochberg,
        )
        .unwrap();

        let row = result.get("TREM2").unwrap();
        println!("=== OMNIBUS, ALL NORMAL ===");
        println!("test = {}, statistic = {}, p = {}", row.test, row.statistic, row.raw_p);
        assert_eq!(row.test.to_string(), "ANOVA");
    }

    #[test]
    fn omnibus_picks_kruskal_wallis_when_one_group_is_not() {
        let result = test_group_differences(
            &StatrsBackend,
            &cohort([40, 45, 60]),
            &biomarker(),
            "diagnosis",
            &normality([0.9, 0.9, 0.01]),
            0.05,
            CorrectionMethod::BenjaminiHochberg,
        )
        .unwrap();
        assert_eq!(result.get("TREM2").unwrap().test.to_string(), "Kruskal-Wallis");
    }

    #[test]
    fn pairwise_picks_test_from_both_groups() {
        let outcome = pairwise_compare(
            &StatrsBackend,
            &cohort([40, 45, 60]),
            &biomarker(),
            "diagnosis",
            &normality([0.9, 0.9, 0.01]),
            None,
            0.05,
            CorrectionMethod::BenjaminiHochberg,
        )
        .unwrap();

        let test_for = |a: &str, b: &str| {
            outcome
                .results
                .iter()
                .find(|r| r.pair.first == a && r.pair.second == b)
                .map(|r| r.test.to_string())
                .unwrap()
        };
        assert_eq!(test_for("A", "B"), "t-test");
        assert_eq!(test_for("A", "C"), "Mann-Whitney");
        assert_eq!(test_for("B", "C"), "Mann-Whitney");
    }

    #[test]
    fn omnibus_refuses_two_groups() {
        let dataset = Dataset::new()
            .with_labels(
                "diagnosis",
                vec![Some("A".into()), Some("A".into()), Some("B".into()), Some("B".into())],
            )
            .unwrap()
            .with_values("TREM2", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)])
            .unwrap();
        let table = NormalityTable::from_corrected(
            biomarker(),
            GroupOrder::from_labels(["A", "B"]),
            array![[0.9, 0.9]],
        )
        .unwrap();

        for alpha in [0.01, 0.05, 0.2] {
            let result = test_group_differences(
                &StatrsBackend,
                &dataset,
                &biomarker(),
                "diagnosis",
                &table,
                alpha,
                CorrectionMethod::Holm,
            );
            assert!(matches!(
                result,
                Err(SignificanceError::InsufficientGroups { found: 2, .. })
            ));
        }
    }
}

#[cfg(test)]
mod primitives {
    use super::*;

    #[test]
    fn shifted_groups_are_detected() {
        let low = [1.0, 2.0, 3.0, 2.0, 2.0];
        let high = [9.0, 10.0, 11.0, 10.0, 10.0];

        let t = welch_t_test(&high, &low).unwrap();
        println!("\n=== SHIFTED GROUPS ===");
        println!("Welch t = {}, p = {}", t.statistic, t.p_value);
        assert!(t.p_value < 0.001);
        assert!(t.statistic > 5.0);

        let u = mann_whitney(&high, &low).unwrap();
        assert_eq!(u.statistic, 25.0);
        assert!(u.p_value < 0.05);

        let f = one_way_anova(&[&low, &high]).unwrap();
        assert!(f.p_value < 0.001);
    }

    #[test]
    fn same_shape_groups_are_not() {
        let a = [3.1, 3.2, 3.0, 3.1, 3.0];
        let b = [3.0, 3.1, 3.2, 3.0, 3.1];

        let t = welch_t_test(&a, &b).unwrap();
        assert!(t.statistic.abs() < 1e-9);
        assert!(t.p_value > 0.99);

        let u = mann_whitney(&a, &b).unwrap();
        assert!(u.p_value > 0.5);
    }

    #[test]
    fn welch_needs_spread() {
        assert!(welch_t_test(&[5.0, 5.0, 5.0], &[5.0, 5.0, 5.0]).is_err());
        assert!(welch_t_test(&[5.0], &[1.0, 2.0]).is_err());
    }
}

#[cfg(test)]
mod correction_by_name {
    use super::*;

    #[test]
    fn names_and_aliases() {
        let p = [0.01, 0.04, 0.03];
        let bh = correct(&p, 0.05, "fdr_bh").unwrap();
        assert_eq!(bh, correct(&p, 0.05, "benjamini-hochberg").unwrap());
        for (raw, adjusted) in p.iter().zip(&bh) {
            assert!(adjusted >= raw);
        }
        assert!(matches!(
            correct(&p, 0.05, "tukey"),
            Err(SignificanceError::UnsupportedMethod(_))
        ));
        assert!(matches!(
            correct(&p, 1.5, "holm"),
            Err(SignificanceError::Configuration(_))
        ));
    }

    #[test]
    fn out_of_range_p_is_a_correction_error() {
        assert!(matches!(
            correct(&[0.5, 1.2], 0.05, "bonferroni"),
            Err(SignificanceError::Correction { .. })
        ));
    }

    #[test]
    fn nan_passes_through() {
        let corrected = correct(&[0.01, f64::NAN, 0.02], 0.05, "bonferroni").unwrap();
        assert_eq!(corrected.len(), 3);
        assert!((corrected[0] - 0.02).abs() < 1e-12);
        assert!(corrected[1].is_nan());
        assert!((corrected[2] - 0.04).abs() < 1e-12);
    }
}

#[cfg(test)]
mod bracket_layout {
    use super::*;
    use proptest::prelude::*;

    fn order() -> GroupOrder {
        GroupOrder::from_labels(["A", "B", "C", "D"])
    }

    #[test]
    fn two_brackets_stack_as_documented() {
        let order = order();
        let mut significance = SignificanceMap::new();
        significance.insert("TREM2", GroupPair::canonical("A", "B", &order).unwrap(), 0.04);
        significance.insert("TREM2", GroupPair::canonical("A", "C", &order).unwrap(), 0.001);

        let range = FilteredRange {
            biomarker: "TREM2".to_string(),
            min: -5.0,
            max: 5.0,
            groups: vec![vec![-5.0, 5.0]],
        };
        let config = LayoutConfig {
            bar_height_factor: 0.02,
            y_top_factor: 0.0,
            label_format: LabelFormat::Asterisk,
            ..LayoutConfig::default()
        };
        let layouts = layout::layout(&[range], &significance, &order, &config).unwrap();
        let heights: Vec<f64> = layouts[0].brackets.iter().map(|b| b.height).collect();
        let symbols: Vec<&str> = layouts[0].brackets.iter().map(|b| b.label.as_str()).collect();

        assert!((heights[0] - 5.2).abs() < 1e-12);
        assert!((heights[1] - 5.4).abs() < 1e-12);
        assert_eq!(symbols, ["*", "***"]);
    }

    proptest! {
        #[test]
        fn heights_strictly_increase(
            k in 1usize..7,
            min in -100.0f64..100.0,
            span in 0.5f64..50.0,
            factor in 0.001f64..0.5,
        ) {
            let order = order();
            let pairs = order.pairs();
            let mut significance = SignificanceMap::new();
            for pair in pairs.iter().take(k) {
                significance.insert("m", pair.clone(), 0.01);
            }
            let range = FilteredRange {
                biomarker: "m".to_string(),
                min,
                max: min + span,
                groups: Vec::new(),
            };
            let config = LayoutConfig { bar_height_factor: factor, ..LayoutConfig::default() };
            let layouts = layout::layout(&[range], &significance, &order, &config).unwrap();
            let brackets = &layouts[0].brackets;
            prop_assert_eq!(brackets.len(), k);
            for window in brackets.windows(2) {
                prop_assert!(window[1].height > window[0].height);
                prop_assert_eq!(window[1].level, window[0].level + 1);
            }
        }
    }
}

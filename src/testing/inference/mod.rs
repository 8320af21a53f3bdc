use crate::testing::{NormalityTest, OmnibusTest, PairwiseTest, TestResult};
use anyhow::anyhow;

pub mod nonparametric;
pub mod normality;
pub mod parametric;
pub mod variance;

/// Statistical test primitives the pipeline orchestrates.
///
/// Every method returns `(statistic, p-value)` wrapped in a [`TestResult`].
/// Implementations must be shareable across the worker threads that process
/// biomarkers in parallel.
pub trait TestPrimitives: Send + Sync {
    fn shapiro_wilk(&self, sample: &[f64]) -> anyhow::Result<TestResult<f64>>;

    fn dagostino_pearson(&self, sample: &[f64]) -> anyhow::Result<TestResult<f64>>;

    fn levene(&self, groups: &[&[f64]]) -> anyhow::Result<TestResult<f64>>;

    fn anova(&self, groups: &[&[f64]]) -> anyhow::Result<TestResult<f64>>;

    fn kruskal_wallis(&self, groups: &[&[f64]]) -> anyhow::Result<TestResult<f64>>;

    fn welch_t_test(&self, x: &[f64], y: &[f64]) -> anyhow::Result<TestResult<f64>>;

    fn mann_whitney(&self, x: &[f64], y: &[f64]) -> anyhow::Result<TestResult<f64>>;

    fn normality(&self, test: NormalityTest, sample: &[f64]) -> anyhow::Result<TestResult<f64>> {
        match test {
            NormalityTest::ShapiroWilk => self.shapiro_wilk(sample),
            NormalityTest::DAgostinoPearson => self.dagostino_pearson(sample),
            NormalityTest::NotRun | NormalityTest::External => Err(anyhow!(
                "no normality test applies to a sample of {}",
                sample.len()
            )),
        }
    }

    fn omnibus(&self, test: OmnibusTest, groups: &[&[f64]]) -> anyhow::Result<TestResult<f64>> {
        match test {
            OmnibusTest::Anova => self.anova(groups),
            OmnibusTest::KruskalWallis => self.kruskal_wallis(groups),
        }
    }

    fn pairwise(
        &self,
        test: PairwiseTest,
        x: &[f64],
        y: &[f64],
    ) -> anyhow::Result<TestResult<f64>> {
        match test {
            PairwiseTest::TTest => self.welch_t_test(x, y),
            PairwiseTest::MannWhitney => self.mann_whitney(x, y),
        }
    }
}

/// Default primitives built on `statrs` distributions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatrsBackend;

impl TestPrimitives for StatrsBackend {
    fn shapiro_wilk(&self, sample: &[f64]) -> anyhow::Result<TestResult<f64>> {
        normality::shapiro_wilk(sample)
    }

    fn dagostino_pearson(&self, sample: &[f64]) -> anyhow::Result<TestResult<f64>> {
        normality::dagostino_pearson(sample)
    }

    fn levene(&self, groups: &[&[f64]]) -> anyhow::Result<TestResult<f64>> {
        variance::levene(groups)
    }

    fn anova(&self, groups: &[&[f64]]) -> anyhow::Result<TestResult<f64>> {
        parametric::one_way_anova(groups)
    }

    fn kruskal_wallis(&self, groups: &[&[f64]]) -> anyhow::Result<TestResult<f64>> {
        nonparametric::kruskal_wallis(groups)
    }

    fn welch_t_test(&self, x: &[f64], y: &[f64]) -> anyhow::Result<TestResult<f64>> {
        parametric::welch_t_test(x, y)
    }

    fn mann_whitney(&self, x: &[f64], y: &[f64]) -> anyhow::Result<TestResult<f64>> {
        nonparametric::mann_whitney(x, y)
    }
}

use serde::Serialize;
use single_utilities::traits::FloatOps;
use std::collections::HashMap;
use std::fmt;

pub mod correction;
pub mod inference;

pub mod utils;

/// Normality test chosen for one (biomarker, group) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NormalityTest {
    ShapiroWilk,
    DAgostinoPearson,
    /// Too few observations; the cell is NaN.
    NotRun,
    /// p-value supplied by the caller rather than computed here.
    External,
}

impl NormalityTest {
    /// Smallest sample that gets the large-sample test.
    pub const LARGE_SAMPLE: usize = 50;
    /// Smallest sample any normality test runs on.
    pub const MIN_SAMPLE: usize = 3;

    pub fn for_sample_size(n: usize) -> Self {
        if n < Self::MIN_SAMPLE {
            NormalityTest::NotRun
        } else if n < Self::LARGE_SAMPLE {
            NormalityTest::ShapiroWilk
        } else {
            NormalityTest::DAgostinoPearson
        }
    }
}

impl fmt::Display for NormalityTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NormalityTest::ShapiroWilk => "Shapiro-Wilk",
            NormalityTest::DAgostinoPearson => "D'Agostino-Pearson",
            NormalityTest::NotRun => "not run",
            NormalityTest::External => "external",
        })
    }
}

/// Global k-sample test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OmnibusTest {
    Anova,
    KruskalWallis,
}

impl fmt::Display for OmnibusTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OmnibusTest::Anova => "ANOVA",
            OmnibusTest::KruskalWallis => "Kruskal-Wallis",
        })
    }
}

/// Two-sample test used for a group pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PairwiseTest {
    /// Welch's t-test, no equal-variance assumption.
    TTest,
    MannWhitney,
}

impl PairwiseTest {
    /// Fewest observations per group the test accepts.
    pub fn min_sample(self) -> usize {
        match self {
            PairwiseTest::TTest => 2,
            PairwiseTest::MannWhitney => 1,
        }
    }
}

impl fmt::Display for PairwiseTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PairwiseTest::TTest => "t-test",
            PairwiseTest::MannWhitney => "Mann-Whitney",
        })
    }
}

#[derive(Debug, Clone)]
pub struct TestResult<T> {
    /// The test statistic value (e.g., W, F, H, t, U)
    pub statistic: T,
    /// The p-value of the test
    pub p_value: T,
    /// Degrees of freedom (for parametric inference)
    pub degrees_of_freedom: Option<T>,
    /// Additional test-specific information
    pub metadata: HashMap<String, T>,
}

impl<T> TestResult<T>
where
    T: FloatOps,
{
    /// Create a new test result with minimal information
    pub fn new(statistic: T, p_value: T) -> Self {
        TestResult {
            statistic,
            p_value,
            degrees_of_freedom: None,
            metadata: HashMap::new(),
        }
    }

    /// Add degrees of freedom to the result
    pub fn with_degrees_of_freedom(mut self, df: T) -> Self {
        self.degrees_of_freedom = Some(df);
        self
    }

    /// Add additional metadata
    pub fn with_metadata(mut self, key: &str, value: T) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Check if the result is statistically significant at the given threshold
    pub fn is_significant(&self, alpha: T) -> bool {
        self.p_value < alpha
    }
}

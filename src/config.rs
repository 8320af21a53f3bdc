//! Pipeline and display configuration.
//!
//! Both structs deserialize from JSON with every field optional; missing
//! fields take the documented defaults. [`PipelineConfig::validate`]
//! rejects unknown correction methods and label formats before any test runs.

use crate::error::{Result, SignificanceError};
use crate::layout::{LabelFormat, LayoutConfig};
use crate::testing::correction::CorrectionMethod;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the multiple-testing correction, e.g. `fdr_bh` or `bonferroni`.
    pub correction_method: String,
    /// Significance threshold.
    pub alpha: f64,
    /// Lower percentile of the per-group axis filter.
    pub iqr_min: f64,
    /// Upper percentile of the per-group axis filter.
    pub iqr_max: f64,
    pub bar_height_factor: f64,
    pub bar_tips_factor: f64,
    pub y_top_factor: f64,
    pub y_range_factor: f64,
    pub asterisk_factor: f64,
    /// `text` or `asterisk`.
    pub p_value_format: String,
    /// Require a significant omnibus test before pairwise testing.
    pub omnibus_gating: bool,
    pub display: DisplayConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            correction_method: "fdr_bh".to_string(),
            alpha: 0.05,
            iqr_min: 0.05,
            iqr_max: 0.95,
            bar_height_factor: 0.02,
            bar_tips_factor: 0.005,
            y_top_factor: 0.05,
            y_range_factor: 0.1,
            asterisk_factor: 0.02,
            p_value_format: "text".to_string(),
            omnibus_gating: true,
            display: DisplayConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn correction(&self) -> Result<CorrectionMethod> {
        self.correction_method.parse()
    }

    pub fn label_format(&self) -> Result<LabelFormat> {
        self.p_value_format.parse()
    }

    pub fn layout(&self) -> Result<LayoutConfig> {
        Ok(LayoutConfig {
            iqr_min: self.iqr_min,
            iqr_max: self.iqr_max,
            bar_height_factor: self.bar_height_factor,
            bar_tips_factor: self.bar_tips_factor,
            y_top_factor: self.y_top_factor,
            y_range_factor: self.y_range_factor,
            asterisk_factor: self.asterisk_factor,
            label_format: self.label_format()?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.correction()?;
        self.label_format()?;
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(SignificanceError::Configuration(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.iqr_min)
            || !(0.0..=1.0).contains(&self.iqr_max)
            || self.iqr_min >= self.iqr_max
        {
            return Err(SignificanceError::Configuration(format!(
                "iqr bounds must satisfy 0 <= iqr_min < iqr_max <= 1, got {} and {}",
                self.iqr_min, self.iqr_max
            )));
        }
        let factors = [
            ("bar_height_factor", self.bar_height_factor),
            ("bar_tips_factor", self.bar_tips_factor),
            ("y_top_factor", self.y_top_factor),
            ("y_range_factor", self.y_range_factor),
            ("asterisk_factor", self.asterisk_factor),
        ];
        for (name, value) in factors {
            if !value.is_finite() || value < 0.0 {
                return Err(SignificanceError::Configuration(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.bar_height_factor == 0.0 {
            return Err(SignificanceError::Configuration(
                "bar_height_factor must be positive so stacked brackets do not overlap".to_string(),
            ));
        }
        Ok(())
    }
}

/// Presentation settings handed to the renderer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Panel title per biomarker; the biomarker name is used when absent.
    pub titles: HashMap<String, String>,
    /// Y axis label per biomarker; the biomarker name is used when absent.
    pub y_axis_labels: HashMap<String, String>,
    /// Colour per group label.
    pub palette: HashMap<String, String>,
    /// Tick label per group position; group labels are used when absent.
    pub xtick_labels: Option<Vec<String>>,
    pub fig_size: (f64, f64),
    /// Subplot grid as (rows, columns).
    pub grid: (usize, usize),
    pub image_name: String,
    pub jitter_size: f64,
    pub point_alpha: f64,
    pub show_fliers: bool,
    pub show_title: bool,
    pub show_y_labels: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            titles: HashMap::new(),
            y_axis_labels: HashMap::new(),
            palette: HashMap::new(),
            xtick_labels: None,
            fig_size: (10.0, 6.0),
            grid: (1, 1),
            image_name: "boxplot.png".to_string(),
            jitter_size: 8.0,
            point_alpha: 0.8,
            show_fliers: false,
            show_title: true,
            show_y_labels: true,
        }
    }
}

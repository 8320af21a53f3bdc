//! Placement of significance brackets above the boxes.
//!
//! Every length is a fraction of the biomarker's filtered value range, so the
//! same factors work for markers measured on very different scales. Brackets
//! for one biomarker stack in insertion order of the significance map, each
//! one `bar_height_factor` higher than the last.

use crate::data::{BiomarkerChannel, GroupOrder, GroupPair};
use crate::error::{Result, SignificanceError};
use crate::pipeline::SignificanceMap;
use crate::testing::utils::quantile_sorted;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

/// How a bracket's p-value is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelFormat {
    /// `p = 0.012`, or `p ≤ 0.001` below one in a thousand.
    Text,
    /// `***` (p ≤ 0.001), `**` (p ≤ 0.01), `*` (p < 0.05), or `ns`.
    Asterisk,
}

impl LabelFormat {
    pub fn label(self, p_value: f64) -> String {
        match self {
            LabelFormat::Text => {
                if p_value < 0.001 {
                    "p ≤ 0.001".to_string()
                } else {
                    format!("p = {:.3}", p_value)
                }
            }
            LabelFormat::Asterisk => {
                let stars = if p_value <= 0.001 {
                    "***"
                } else if p_value <= 0.01 {
                    "**"
                } else if p_value < 0.05 {
                    "*"
                } else {
                    "ns"
                };
                stars.to_string()
            }
        }
    }
}

impl FromStr for LabelFormat {
    type Err = SignificanceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LabelFormat::Text),
            "asterisk" => Ok(LabelFormat::Asterisk),
            other => Err(SignificanceError::Configuration(format!(
                "unknown p-value format '{}', expected 'text' or 'asterisk'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutConfig {
    pub iqr_min: f64,
    pub iqr_max: f64,
    pub bar_height_factor: f64,
    pub bar_tips_factor: f64,
    pub y_top_factor: f64,
    pub y_range_factor: f64,
    pub asterisk_factor: f64,
    pub label_format: LabelFormat,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            iqr_min: 0.05,
            iqr_max: 0.95,
            bar_height_factor: 0.02,
            bar_tips_factor: 0.005,
            y_top_factor: 0.05,
            y_range_factor: 0.1,
            asterisk_factor: 0.02,
            label_format: LabelFormat::Text,
        }
    }
}

/// Axis extent of one biomarker after per-group percentile filtering.
///
/// `groups` holds the retained values of every group in [`GroupOrder`]
/// order; these are what the renderer draws.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredRange {
    pub biomarker: String,
    pub min: f64,
    pub max: f64,
    pub groups: Vec<Vec<f64>>,
}

impl FilteredRange {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Keep values between the `lower` and `upper` quantiles, bounds inclusive.
///
/// Quantiles use linear interpolation between order statistics. The input
/// order of the retained values is preserved.
pub fn iqr_filter(sample: &[f64], lower: f64, upper: f64) -> Vec<f64> {
    if sample.is_empty() {
        return Vec::new();
    }
    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let lo = quantile_sorted(&sorted, lower);
    let hi = quantile_sorted(&sorted, upper);
    sample
        .iter()
        .copied()
        .filter(|&v| v >= lo && v <= hi)
        .collect()
}

/// Filtered range of a channel; `None` when no group has any value.
pub fn filtered_range(channel: &BiomarkerChannel, lower: f64, upper: f64) -> Option<FilteredRange> {
    let groups: Vec<Vec<f64>> = channel
        .samples
        .iter()
        .map(|sample| iqr_filter(sample, lower, upper))
        .collect();
    let (min, max) = groups
        .iter()
        .flatten()
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;
    Some(FilteredRange {
        biomarker: channel.name.clone(),
        min,
        max,
        groups,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BracketGeometry {
    pub pair: GroupPair,
    /// Stacking level, starting at 1.
    pub level: usize,
    pub x1: usize,
    pub x2: usize,
    pub height: f64,
    /// Lower end of the two vertical ticks.
    pub tip: f64,
    pub label: String,
    pub label_x: f64,
    pub label_y: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiomarkerLayout {
    pub biomarker: String,
    /// Value range the factors were scaled by.
    pub scale: f64,
    /// Baseline above the highest filtered value.
    pub top: f64,
    /// Upper y limit of the axis.
    pub ceiling: f64,
    pub brackets: Vec<BracketGeometry>,
}

/// Bracket geometry for every biomarker with at least one significant pair.
pub fn layout(
    ranges: &[FilteredRange],
    significance: &SignificanceMap,
    positions: &GroupOrder,
    config: &LayoutConfig,
) -> Result<Vec<BiomarkerLayout>> {
    let mut layouts = Vec::new();

    for (biomarker, records) in significance.iter() {
        if records.is_empty() {
            continue;
        }
        let range = ranges
            .iter()
            .find(|r| r.biomarker == biomarker)
            .ok_or_else(|| {
                SignificanceError::Schema(format!("no filtered range for biomarker '{}'", biomarker))
            })?;

        let mut scale = range.span();
        if scale <= 0.0 || !scale.is_finite() {
            warn!(
                biomarker,
                span = scale,
                "filtered range is empty, scaling brackets by 1.0"
            );
            scale = 1.0;
        }
        let top = range.max + scale * config.y_top_factor;
        let ceiling = top + scale * config.y_range_factor;

        let mut brackets = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let level = i + 1;
            let x1 = position(positions, biomarker, &record.pair.first)?;
            let x2 = position(positions, biomarker, &record.pair.second)?;
            let height = top + scale * config.bar_height_factor * level as f64;
            brackets.push(BracketGeometry {
                pair: record.pair.clone(),
                level,
                x1,
                x2,
                height,
                tip: height - scale * config.bar_tips_factor,
                label: config.label_format.label(record.p_value),
                label_x: (x1 + x2) as f64 / 2.0,
                label_y: height + scale * config.asterisk_factor,
                p_value: record.p_value,
            });
        }
        debug!(biomarker, brackets = brackets.len(), top, ceiling, "laid out brackets");

        layouts.push(BiomarkerLayout {
            biomarker: biomarker.to_string(),
            scale,
            top,
            ceiling,
            brackets,
        });
    }

    Ok(layouts)
}

fn position(positions: &GroupOrder, biomarker: &str, group: &str) -> Result<usize> {
    positions.position(group).ok_or_else(|| {
        SignificanceError::Schema(format!(
            "significant pair for '{}' names group '{}' with no x position",
            biomarker, group
        ))
    })
}

//! Hand-off to an external plotting tool.
//!
//! A [`RenderPlan`] contains everything needed to draw the scatter and box
//! panels: filtered per-group values, colours, titles, axis ceilings and the
//! bracket geometry. Drawing itself happens outside this crate.

use crate::config::DisplayConfig;
use crate::error::{Result, SignificanceError};
use crate::layout::BracketGeometry;
use crate::pipeline::PipelineReport;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    pub image_name: String,
    pub fig_size: (f64, f64),
    /// Subplot grid as (rows, columns); cells past the last panel stay empty.
    pub grid: (usize, usize),
    pub jitter_size: f64,
    pub point_alpha: f64,
    pub show_fliers: bool,
    pub xtick_labels: Vec<String>,
    pub panels: Vec<Panel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub biomarker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_label: Option<String>,
    pub groups: Vec<GroupSamples>,
    /// Upper y limit; absent when the panel has no brackets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_ceiling: Option<f64>,
    pub brackets: Vec<BracketGeometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSamples {
    pub label: String,
    pub x: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Values left after percentile filtering.
    pub values: Vec<f64>,
}

impl RenderPlan {
    pub fn build(report: &PipelineReport, display: &DisplayConfig) -> Result<Self> {
        let labels = report.groups.labels();
        let xtick_labels = match &display.xtick_labels {
            Some(ticks) if ticks.len() != labels.len() => {
                return Err(SignificanceError::Configuration(format!(
                    "{} x tick labels given for {} groups",
                    ticks.len(),
                    labels.len()
                )));
            }
            Some(ticks) => ticks.clone(),
            None => labels.to_vec(),
        };

        let (rows, cols) = display.grid;
        if rows * cols < report.ranges.len() {
            return Err(SignificanceError::Configuration(format!(
                "grid {}x{} has room for {} panels, {} biomarkers to draw",
                rows,
                cols,
                rows * cols,
                report.ranges.len()
            )));
        }

        let panels = report
            .ranges
            .iter()
            .map(|range| {
                let layout = report.layout_for(&range.biomarker);
                let groups = labels
                    .iter()
                    .zip(&range.groups)
                    .enumerate()
                    .map(|(x, (label, values))| GroupSamples {
                        label: label.clone(),
                        x,
                        color: display.palette.get(label).cloned(),
                        values: values.clone(),
                    })
                    .collect();
                Panel {
                    biomarker: range.biomarker.clone(),
                    title: display.show_title.then(|| {
                        display
                            .titles
                            .get(&range.biomarker)
                            .unwrap_or(&range.biomarker)
                            .clone()
                    }),
                    y_label: display.show_y_labels.then(|| {
                        display
                            .y_axis_labels
                            .get(&range.biomarker)
                            .unwrap_or(&range.biomarker)
                            .clone()
                    }),
                    groups,
                    y_ceiling: layout.map(|l| l.ceiling),
                    brackets: layout.map(|l| l.brackets.clone()).unwrap_or_default(),
                }
            })
            .collect();

        Ok(RenderPlan {
            image_name: display.image_name.clone(),
            fig_size: display.fig_size,
            grid: display.grid,
            jitter_size: display.jitter_size,
            point_alpha: display.point_alpha,
            show_fliers: display.show_fliers,
            xtick_labels,
            panels,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Consumer of a finished plan.
pub trait Renderer {
    fn render(&mut self, plan: &RenderPlan) -> Result<()>;
}

/// Writes the plan as JSON, one document per call.
#[derive(Debug)]
pub struct JsonRenderer<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonRenderer<W> {
    pub fn new(writer: W) -> Self {
        JsonRenderer {
            writer,
            pretty: false,
        }
    }

    pub fn pretty(writer: W) -> Self {
        JsonRenderer {
            writer,
            pretty: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Renderer for JsonRenderer<W> {
    fn render(&mut self, plan: &RenderPlan) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, plan)?;
        } else {
            serde_json::to_writer(&mut self.writer, plan)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

//! Tabular input model: columns, group ordering, and per-biomarker samples.
//!
//! A [`Dataset`] is a set of equally long named columns. A column is either a
//! label column or a numeric column, and any cell may be missing. The group
//! column may be of either kind; biomarker columns must be numeric.

use crate::error::{Result, SignificanceError};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

pub mod reader;

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Labels(Vec<Option<String>>),
    Values(Vec<Option<f64>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Labels(cells) => cells.len(),
            Column::Values(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Values(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new() -> Self {
        Dataset::default()
    }

    /// Add a label column, builder style.
    pub fn with_labels<S: Into<String>>(
        mut self,
        name: S,
        labels: Vec<Option<String>>,
    ) -> Result<Self> {
        self.push_column(name, Column::Labels(labels))?;
        Ok(self)
    }

    /// Add a numeric column, builder style.
    pub fn with_values<S: Into<String>>(mut self, name: S, values: Vec<Option<f64>>) -> Result<Self> {
        self.push_column(name, Column::Values(values))?;
        Ok(self)
    }

    pub fn push_column<S: Into<String>>(&mut self, name: S, column: Column) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(SignificanceError::Schema(format!("duplicate column '{}'", name)));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(SignificanceError::Schema(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    column.len(),
                    first.len()
                )));
            }
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.columns[idx])
    }

    /// Group label of every row; `None` where the group cell is missing.
    pub fn group_labels(&self, group_column: &str) -> Result<Vec<Option<String>>> {
        match self.column(group_column) {
            Some(Column::Labels(cells)) => Ok(cells.clone()),
            Some(Column::Values(cells)) => Ok(cells
                .iter()
                .map(|cell| cell.filter(|v| !v.is_nan()).map(|v| v.to_string()))
                .collect()),
            None => Err(SignificanceError::Schema(format!(
                "group column '{}' not found",
                group_column
            ))),
        }
    }

    pub fn group_order(&self, group_column: &str) -> Result<GroupOrder> {
        let labels = self.group_labels(group_column)?;
        Ok(GroupOrder::from_labels(labels.into_iter().flatten()))
    }

    /// Check that the group column and every biomarker exist and that biomarkers are numeric.
    pub fn validate_schema(&self, biomarkers: &[String], group_column: &str) -> Result<()> {
        if self.column(group_column).is_none() {
            return Err(SignificanceError::Schema(format!(
                "group column '{}' not found",
                group_column
            )));
        }
        for biomarker in biomarkers {
            match self.column(biomarker) {
                Some(Column::Values(_)) => {}
                Some(Column::Labels(_)) => {
                    return Err(SignificanceError::Schema(format!(
                        "biomarker '{}' is not numeric",
                        biomarker
                    )));
                }
                None => {
                    return Err(SignificanceError::Schema(format!(
                        "biomarker '{}' not found",
                        biomarker
                    )));
                }
            }
        }
        Ok(())
    }

    /// Split one biomarker into per-group samples, dropping missing values.
    pub fn channel(
        &self,
        biomarker: &str,
        group_labels: &[Option<String>],
        order: &GroupOrder,
    ) -> Result<BiomarkerChannel> {
        let values = match self.column(biomarker) {
            Some(Column::Values(values)) => values,
            Some(Column::Labels(_)) => {
                return Err(SignificanceError::Schema(format!(
                    "biomarker '{}' is not numeric",
                    biomarker
                )));
            }
            None => {
                return Err(SignificanceError::Schema(format!(
                    "biomarker '{}' not found",
                    biomarker
                )));
            }
        };

        let mut samples = vec![Vec::new(); order.len()];
        for (label, value) in group_labels.iter().zip(values) {
            let (Some(label), Some(value)) = (label, value) else {
                continue;
            };
            if value.is_nan() {
                continue;
            }
            if let Some(pos) = order.position(label) {
                samples[pos].push(*value);
            }
        }

        Ok(BiomarkerChannel {
            name: biomarker.to_string(),
            samples,
        })
    }

    /// Validate the schema and derive the group order plus one channel per biomarker.
    pub fn channels(
        &self,
        biomarkers: &[String],
        group_column: &str,
    ) -> Result<(GroupOrder, Vec<BiomarkerChannel>)> {
        self.validate_schema(biomarkers, group_column)?;
        let labels = self.group_labels(group_column)?;
        let order = GroupOrder::from_labels(labels.iter().flatten().cloned());
        let channels = biomarkers
            .iter()
            .map(|b| self.channel(b, &labels, &order))
            .collect::<Result<Vec<_>>>()?;
        Ok((order, channels))
    }
}

/// Canonical order of the distinct group labels.
///
/// Labels sort numerically when every label parses as a number, otherwise
/// lexicographically. A label's index is its x position on the chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOrder {
    labels: Vec<String>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl GroupOrder {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = labels.into_iter().map(Into::into).collect();
        let numeric: Option<Vec<f64>> = unique.iter().map(|l| l.parse::<f64>().ok()).collect();
        if numeric.is_some() {
            unique.sort_by(|a, b| {
                let (x, y) = (a.parse::<f64>(), b.parse::<f64>());
                match (x, y) {
                    (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
                    _ => a.cmp(b),
                }
            });
        } else {
            unique.sort();
        }
        unique.dedup();

        let positions = unique
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        GroupOrder {
            labels: unique,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.positions.get(label).copied()
    }

    pub fn compare(&self, a: &str, b: &str) -> Option<Ordering> {
        Some(self.position(a)?.cmp(&self.position(b)?))
    }

    /// All unordered pairs, `(g0,g1), (g0,g2), ..., (g1,g2), ...`.
    pub fn pairs(&self) -> Vec<GroupPair> {
        let mut pairs = Vec::with_capacity(self.len() * self.len().saturating_sub(1) / 2);
        for i in 0..self.len() {
            for j in (i + 1)..self.len() {
                pairs.push(GroupPair {
                    first: self.labels[i].clone(),
                    second: self.labels[j].clone(),
                });
            }
        }
        pairs
    }
}

/// Unordered pair of distinct groups, stored in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupPair {
    pub first: String,
    pub second: String,
}

impl GroupPair {
    /// Build a pair in canonical order; `None` if a label is unknown or both are equal.
    pub fn canonical(a: &str, b: &str, order: &GroupOrder) -> Option<GroupPair> {
        match order.compare(a, b)? {
            Ordering::Less => Some(GroupPair {
                first: a.to_string(),
                second: b.to_string(),
            }),
            Ordering::Greater => Some(GroupPair {
                first: b.to_string(),
                second: a.to_string(),
            }),
            Ordering::Equal => None,
        }
    }
}

/// One biomarker's observations split by group, in [`GroupOrder`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomarkerChannel {
    pub name: String,
    pub samples: Vec<Vec<f64>>,
}

impl BiomarkerChannel {
    pub fn group(&self, position: usize) -> &[f64] {
        &self.samples[position]
    }

    pub fn sample_sizes(&self) -> Vec<usize> {
        self.samples.iter().map(Vec::len).collect()
    }
}

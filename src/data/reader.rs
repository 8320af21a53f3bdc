//! CSV input for [`Dataset`].
//!
//! Column kinds are inferred: a column whose non-missing cells all parse as
//! numbers becomes numeric, anything else stays a label column.

use super::{Column, Dataset};
use crate::error::Result;
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const MISSING_MARKERS: [&str; 4] = ["", "NA", "NaN", "nan"];

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.trim())
}

/// Read a headed, comma separated table.
pub fn read_csv<R: Read>(input: R) -> Result<Dataset> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        for (idx, cells) in raw.iter_mut().enumerate() {
            let cell = record.get(idx).unwrap_or("");
            cells.push(if is_missing(cell) {
                None
            } else {
                Some(cell.to_string())
            });
        }
    }

    let mut dataset = Dataset::new();
    for (name, cells) in headers.into_iter().zip(raw) {
        let column = infer_column(cells);
        debug!(column = %name, numeric = column.is_numeric(), "inferred column kind");
        dataset.push_column(name, column)?;
    }
    Ok(dataset)
}

pub fn read_csv_path(path: impl AsRef<Path>) -> Result<Dataset> {
    let file = File::open(path.as_ref())?;
    read_csv(file)
}

fn infer_column(cells: Vec<Option<String>>) -> Column {
    let parsed: Option<Vec<Option<f64>>> = cells
        .iter()
        .map(|cell| match cell {
            Some(text) => text.parse::<f64>().ok().map(Some),
            None => Some(None),
        })
        .collect();

    match parsed {
        Some(values) if values.iter().any(Option::is_some) => Column::Values(values),
        _ => Column::Labels(cells),
    }
}

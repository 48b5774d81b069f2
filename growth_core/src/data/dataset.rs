//! In-memory numeric table loaded from a delimited file.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use ndarray::{Array1, Array2};

use crate::error::{GrowthError, Result};

/// Immutable table of numeric records with named columns.
///
/// Column order is the order of the source header and is preserved by every
/// derived feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Dataset {
    /// Builds a dataset from column names and row-major records.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(GrowthError::Dataset(format!("duplicate column '{name}'")));
            }
        }

        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(GrowthError::Dataset(format!(
                    "row {index} has {} values but the header has {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }

        Ok(Self { columns, rows })
    }

    /// Loads a comma-delimited file with a header row.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = csv::Reader::from_path(path)?;
        Self::from_csv_reader(reader)
    }

    /// Loads comma-delimited data with a header row from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_csv_reader(csv::Reader::from_reader(reader))
    }

    fn from_csv_reader<R: Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let row = record
                .iter()
                .zip(columns.iter())
                .map(|(cell, column)| {
                    cell.trim().parse::<f64>().map_err(|_| {
                        GrowthError::Dataset(format!(
                            "row {index}, column '{column}': '{cell}' is not a number"
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            rows.push(row);
        }

        tracing::debug!(rows = rows.len(), columns = columns.len(), "dataset loaded");
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the column order.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| GrowthError::MissingColumn(name.to_string()))
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Array1<f64>> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[index]).collect())
    }

    /// Matrix of the named columns, in the order given.
    pub fn select(&self, names: &[String]) -> Result<Array2<f64>> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Array2::from_shape_fn(
            (self.rows.len(), indices.len()),
            |(row, col)| self.rows[row][indices[col]],
        ))
    }
}

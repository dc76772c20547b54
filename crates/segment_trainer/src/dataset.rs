//! CSV dataset loading and splitting
//!
//! Reads header-based exports (pipe-delimited by default), keeps the
//! categorical columns a segmentation needs plus the continuous target, and
//! provides deterministic shuffling, train/test splits and k-fold splits.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use lumen_segment_core::{CategoricalValue, RowSet, SegmentationConfig, Table};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::deterministic::{fold_ranges, shuffled_positions};

/// Field delimiter of the transaction export
pub const DEFAULT_DELIMITER: u8 = b'|';

/// Columns to read from a CSV file
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetSchema {
    /// Categorical columns, in table order
    pub columns: Vec<String>,
    pub target: String,
    pub delimiter: u8,
}

impl DatasetSchema {
    pub fn new(columns: Vec<String>, target: impl Into<String>) -> Self {
        Self {
            columns,
            target: target.into(),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    /// Partition features followed by split features, without duplicates
    pub fn from_config(config: &SegmentationConfig) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for name in config.partition_features.iter().chain(&config.features) {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
        Self::new(columns, config.target.clone())
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Training rows with categorical features and a continuous target
#[derive(Clone, Debug)]
pub struct Dataset {
    table: Table,
}

impl Dataset {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    /// Load dataset from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P, schema: &DatasetSchema) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let dataset = Self::from_reader(file, schema)?;
        info!(
            path = %path.display(),
            rows = dataset.len(),
            columns = schema.columns.len(),
            "loaded dataset"
        );
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R, schema: &DatasetSchema) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(schema.delimiter)
            .has_headers(true)
            .from_reader(reader);
        let headers = rdr.headers().context("Failed to read CSV header")?.clone();

        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .with_context(|| format!("Column '{}' not found in CSV header", name))
        };
        let positions = schema
            .columns
            .iter()
            .map(|name| position(name.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let target_position = position(schema.target.as_str())?;

        let mut table = Table::new(schema.columns.clone(), schema.target.clone());
        for (row_idx, result) in rdr.records().enumerate() {
            let line = row_idx + 1;
            let record = result.with_context(|| format!("Row {}: malformed CSV record", line))?;

            let values = positions
                .iter()
                .map(|&p| CategoricalValue::parse(record.get(p).unwrap_or("")))
                .collect();

            let raw_target = record.get(target_position).unwrap_or("").trim();
            if CategoricalValue::parse(raw_target).is_missing() {
                anyhow::bail!("Row {}: missing target '{}'", line, schema.target);
            }
            let target: f64 = raw_target
                .parse()
                .with_context(|| format!("Row {}: invalid target '{}'", line, raw_target))?;
            if !target.is_finite() {
                anyhow::bail!("Row {}: target must be finite, got {}", line, raw_target);
            }

            table
                .push_row(values, target)
                .with_context(|| format!("Row {}: cannot append", line))?;
        }

        if table.is_empty() {
            anyhow::bail!("Dataset is empty");
        }

        Ok(Self { table })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Deterministically shuffle the rows using seed
    pub fn shuffle(&mut self, seed: i64) {
        let order = shuffled_positions(self.table.rows(), seed);
        self.table = self.table.select(&RowSet::from_positions(order));
    }

    /// Split off the trailing `test_fraction` of rows as a test table
    ///
    /// Shuffle first for a random split.
    pub fn train_test_split(&self, test_fraction: f64) -> (Table, Table) {
        let len = self.table.len();
        let fraction = test_fraction.clamp(0.0, 1.0);
        let test_len = ((len as f64) * fraction).round() as usize;
        let cut = len - test_len.min(len);
        let train = RowSet::from_positions((0..cut).collect());
        let test = RowSet::from_positions((cut..len).collect());
        (self.table.select(&train), self.table.select(&test))
    }

    /// `(train, test)` tables of `k` contiguous folds
    pub fn k_fold(&self, k: usize) -> Vec<(Table, Table)> {
        let len = self.table.len();
        fold_ranges(len, k)
            .into_iter()
            .map(|(start, end)| {
                let train: Vec<usize> = (0..start).chain(end..len).collect();
                let test: Vec<usize> = (start..end).collect();
                (
                    self.table.select(&RowSet::from_positions(train)),
                    self.table.select(&RowSet::from_positions(test)),
                )
            })
            .collect()
    }
}

//! Categorical tables, row views and records
//!
//! A [`Table`] holds any number of named categorical columns and a single
//! continuous target. Sub-tables owned by tree nodes and segments are kept
//! as [`RowSet`]s, ordered row positions into the partition's table, so a
//! fitted tree never copies row data per node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Result, SegmentError};

/// Raw spellings that denote an absent categorical value
const MISSING_SPELLINGS: [&str; 6] = ["", "NA", "NAN", "NaN", "nan", "missing"];

/// A categorical cell: either an observed category or the missing marker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoricalValue {
    Present(String),
    Missing,
}

impl CategoricalValue {
    /// Parse a raw cell, mapping every missing spelling to [`CategoricalValue::Missing`]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if MISSING_SPELLINGS.contains(&trimmed) {
            Self::Missing
        } else {
            Self::Present(trimmed.to_string())
        }
    }

    /// Re-parse a present value so that missing spellings become `Missing`
    pub fn normalized(self) -> Self {
        match self {
            Self::Present(raw) => Self::parse(&raw),
            Self::Missing => Self::Missing,
        }
    }

    pub fn present(value: impl Into<String>) -> Self {
        Self::Present(value.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Present(v) => Some(v),
            Self::Missing => None,
        }
    }
}

impl fmt::Display for CategoricalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(v) => f.write_str(v),
            Self::Missing => f.write_str("<missing>"),
        }
    }
}

impl From<&str> for CategoricalValue {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Human-readable label of a choice set, used for edges and logs only
pub fn choice_label(choice: &[CategoricalValue]) -> String {
    choice
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One training row: categorical values in column order plus the target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<CategoricalValue>,
    pub target: f64,
}

/// Column-named table of categorical features and one continuous target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    target: String,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>, target: impl Into<String>) -> Self {
        Self {
            columns,
            target: target.into(),
            rows: Vec::new(),
        }
    }

    /// Same schema, no rows
    pub fn empty_like(&self) -> Self {
        Self::new(self.columns.clone(), self.target.clone())
    }

    pub fn push_row(&mut self, values: Vec<CategoricalValue>, target: f64) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(SegmentError::RowArity {
                expected: self.columns.len(),
                got: values.len(),
            });
        }
        self.rows.push(Row { values, target });
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn target_name(&self) -> &str {
        &self.target
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a categorical column
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SegmentError::UnknownColumn(name.to_string()))
    }

    /// Every row carries one value per column
    pub fn validate_shape(&self) -> Result<()> {
        match self.rows.iter().find(|row| row.values.len() != self.columns.len()) {
            Some(row) => Err(SegmentError::RowArity {
                expected: self.columns.len(),
                got: row.values.len(),
            }),
            None => Ok(()),
        }
    }

    pub fn value(&self, row: usize, column: usize) -> &CategoricalValue {
        &self.rows[row].values[column]
    }

    /// Materialize the rows of `rows` as a new table, preserving order
    pub fn select(&self, rows: &RowSet) -> Self {
        Self {
            columns: self.columns.clone(),
            target: self.target.clone(),
            rows: rows.iter().map(|i| self.rows[i].clone()).collect(),
        }
    }

    /// Target values of the given rows, in row order
    pub fn targets(&self, rows: &RowSet) -> Vec<f64> {
        rows.iter().map(|i| self.rows[i].target).collect()
    }

    /// Row as a prediction record (all columns plus target)
    pub fn record(&self, row: usize) -> Record {
        let data = &self.rows[row];
        let mut record = Record::new();
        for (name, value) in self.columns.iter().zip(data.values.iter()) {
            record.set(name.clone(), value.clone());
        }
        record.target = Some(data.target);
        record
    }
}

/// Ordered row positions into a table: the owned sub-table of a node or segment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowSet(Vec<usize>);

impl RowSet {
    /// Every row of `table`
    pub fn all(table: &Table) -> Self {
        Self((0..table.len()).collect())
    }

    pub fn from_positions(positions: Vec<usize>) -> Self {
        Self(positions)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn positions(&self) -> &[usize] {
        &self.0
    }

    /// Keep the rows whose value in `column` equals any value of `choice`
    pub fn filter_in(&self, table: &Table, column: usize, choice: &[CategoricalValue]) -> Self {
        Self(
            self.0
                .iter()
                .copied()
                .filter(|&row| choice.contains(table.value(row, column)))
                .collect(),
        )
    }

    /// Occurrences of `value` in `column` among these rows
    pub fn count_value(&self, table: &Table, column: usize, value: &CategoricalValue) -> usize {
        self.0
            .iter()
            .filter(|&&row| table.value(row, column) == value)
            .count()
    }

    /// Whether any row appears twice (used by structural validation)
    pub fn has_duplicates(&self) -> bool {
        let mut sorted = self.0.clone();
        sorted.sort_unstable();
        sorted.windows(2).any(|w| w[0] == w[1])
    }
}

/// A single record to classify: feature name to categorical value
///
/// Fields that are not present read as [`CategoricalValue::Missing`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<String, CategoricalValue>,
    #[serde(default)]
    pub target: Option<f64>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a raw cell
    pub fn with(mut self, feature: impl Into<String>, raw: &str) -> Self {
        self.values.insert(feature.into(), CategoricalValue::parse(raw));
        self
    }

    pub fn set(&mut self, feature: impl Into<String>, value: CategoricalValue) {
        self.values.insert(feature.into(), value.normalized());
    }

    /// Value for `feature`, `Missing` when absent
    pub fn get(&self, feature: &str) -> CategoricalValue {
        self.values
            .get(feature)
            .cloned()
            .unwrap_or(CategoricalValue::Missing)
    }

    /// A copy of this record with `feature` replaced
    pub fn with_value(&self, feature: &str, value: CategoricalValue) -> Self {
        let mut next = self.clone();
        next.set(feature, value);
        next
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CategoricalValue)> {
        self.values.iter()
    }
}

/// One `(feature, choice set)` membership constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub feature: String,
    pub choice: Vec<CategoricalValue>,
}

impl Constraint {
    pub fn new(feature: impl Into<String>, choice: Vec<CategoricalValue>) -> Self {
        Self {
            feature: feature.into(),
            choice,
        }
    }

    pub fn admits(&self, value: &CategoricalValue) -> bool {
        self.choice.contains(value)
    }
}

/// Ordered constraints accumulated along a root-to-node path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathPairs(Vec<Constraint>);

impl PathPairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_constraints(constraints: Vec<Constraint>) -> Self {
        Self(constraints)
    }

    /// A copy extended with one more constraint
    pub fn extended(&self, feature: &str, choice: &[CategoricalValue]) -> Self {
        let mut next = self.0.clone();
        next.push(Constraint::new(feature, choice.to_vec()));
        Self(next)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every constraint admits the record's value
    pub fn matches(&self, record: &Record) -> bool {
        self.0.iter().all(|c| c.admits(&record.get(&c.feature)))
    }

    /// Sequentially narrow `rows` through every constraint
    pub fn filter(&self, table: &Table, rows: &RowSet) -> Result<RowSet> {
        let mut current = rows.clone();
        for constraint in &self.0 {
            let column = table.column_index(&constraint.feature)?;
            current = current.filter_in(table, column, &constraint.choice);
        }
        Ok(current)
    }
}

impl fmt::Display for PathPairs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|c| format!("{} = [{}]", c.feature, choice_label(&c.choice)))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

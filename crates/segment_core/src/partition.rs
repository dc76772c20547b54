//! Supernode partitioning
//!
//! Splits a table into independent sub-populations by exact match on a
//! configured list of partition features. Keys keep first-seen order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::Result;
use crate::table::{CategoricalValue, Record, RowSet, Table};

/// Ordered tuple of partition feature values; empty for the single partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(Vec<CategoricalValue>);

impl PartitionKey {
    pub fn new(values: Vec<CategoricalValue>) -> Self {
        Self(values)
    }

    /// Sentinel key used when no partition features are configured
    pub fn singleton() -> Self {
        Self(Vec::new())
    }

    pub fn is_singleton(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[CategoricalValue] {
        &self.0
    }

    /// Lookup key for a record at prediction time
    pub fn from_record(record: &Record, features: &[String]) -> Self {
        Self(features.iter().map(|f| record.get(f)).collect())
    }

    /// `feature = value` pairs for reporting
    pub fn pairs<'a>(&'a self, features: &'a [String]) -> impl Iterator<Item = (&'a str, &'a CategoricalValue)> {
        features.iter().map(String::as_str).zip(self.0.iter())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// Partition `table` by the values of `features`
///
/// With no features the whole table is returned under [`PartitionKey::singleton`].
/// Otherwise one entry per distinct value combination, in order of first
/// appearance. Missing values form their own combination.
pub fn partition(table: &Table, features: &[String]) -> Result<Vec<(PartitionKey, Table)>> {
    if features.is_empty() {
        return Ok(vec![(PartitionKey::singleton(), table.clone())]);
    }

    let columns = features
        .iter()
        .map(|f| table.column_index(f))
        .collect::<Result<Vec<_>>>()?;

    let mut order: Vec<PartitionKey> = Vec::new();
    let mut members: HashMap<PartitionKey, Vec<usize>> = HashMap::new();

    for row in 0..table.len() {
        let key = PartitionKey(
            columns
                .iter()
                .map(|&c| table.value(row, c).clone())
                .collect(),
        );
        match members.get_mut(&key) {
            Some(rows) => rows.push(row),
            None => {
                order.push(key.clone());
                members.insert(key, vec![row]);
            }
        }
    }

    let partitions = order
        .into_iter()
        .filter_map(|key| {
            let rows = members.remove(&key)?;
            if rows.is_empty() {
                return None;
            }
            let sub_table = table.select(&RowSet::from_positions(rows));
            Some((key, sub_table))
        })
        .collect();

    Ok(partitions)
}

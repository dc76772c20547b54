//! Record classification against a fitted partition
//!
//! Traversal starts at the partition root and follows the child whose
//! choice set admits the record's value. When no child does, the
//! traversal either stops (no imputation) or substitutes a value: the
//! most populous child wins, then the most frequent of its admitted
//! values. Ties go to the first candidate in routing order. Every
//! substitution yields a new resolved record; the caller's record is
//! never touched.

use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::index::PartitionModel;
use crate::partition::PartitionKey;
use crate::segment::Segment;
use crate::table::{CategoricalValue, Record, Table};
use crate::tree::{SegmentTree, TreeNode};

/// Non-fatal "cannot classify" outcomes of a prediction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    /// No fitted tree exists for the record's partition key
    #[error("no fitted partition for key {0}")]
    PartitionNotFound(PartitionKey),

    /// Traversal finished but no segment admits the resolved record
    #[error("no segment of partition {0} matches the resolved record")]
    NoMatchingSegment(PartitionKey),
}

/// Feature values chosen along a traversal, in the order they were resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPairs(Vec<(String, CategoricalValue)>);

impl ResolvedPairs {
    fn push(&mut self, feature: &str, value: CategoricalValue) {
        self.0.push((feature.to_string(), value));
    }

    pub fn get(&self, feature: &str) -> Option<&CategoricalValue> {
        self.0.iter().find(|(f, _)| f == feature).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoricalValue)> {
        self.0.iter().map(|(f, v)| (f.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResolvedPairs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k} = {v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// A successful classification
#[derive(Debug, Clone)]
pub struct Prediction<'a> {
    pub segment: &'a Segment,
    /// Feature values used at each traversed split
    pub resolved_path: ResolvedPairs,
    /// Substituted values only; empty when the record matched branches directly
    pub imputed: ResolvedPairs,
    /// Input record with every substitution applied
    pub resolved_record: Record,
}

impl Prediction<'_> {
    pub fn was_imputed(&self) -> bool {
        !self.imputed.is_empty()
    }

    /// Band index of `value` within the segment's cutoffs
    pub fn band_of(&self, value: f64) -> Option<usize> {
        self.segment.cutoffs().band_of(value)
    }
}

pub(crate) fn predict_in<'a>(
    model: &'a PartitionModel,
    record: &Record,
    impute: bool,
) -> Result<Prediction<'a>, PredictError> {
    let tree = model.tree();
    let table = model.table();

    let mut node = tree.root();
    let mut resolved = record.clone();
    let mut resolved_path = ResolvedPairs::default();
    let mut imputed = ResolvedPairs::default();

    while let Some(feature) = node.split_feature.as_deref() {
        let value = resolved.get(feature);

        if let Some(child) = tree.children(node).find(|c| c.choice.contains(&value)) {
            resolved_path.push(feature, value);
            node = child;
            continue;
        }

        if !impute {
            debug!(node = node.id, feature, value = %value, "no branch admits value, halting");
            break;
        }

        let Some((child, substitute)) = impute_branch(tree, table, node, feature) else {
            break;
        };
        debug!(
            node = node.id,
            feature,
            original = %value,
            substitute = %substitute,
            "imputed categorical value"
        );
        resolved = resolved.with_value(feature, substitute.clone());
        resolved_path.push(feature, substitute.clone());
        imputed.push(feature, substitute);
        node = child;
    }

    model
        .segments()
        .iter()
        .find(|segment| segment.admits(&resolved))
        .map(|segment| Prediction {
            segment,
            resolved_path,
            imputed,
            resolved_record: resolved,
        })
        .ok_or_else(|| PredictError::NoMatchingSegment(model.key().clone()))
}

/// Most populous child of `node`, then its most frequent admitted value
fn impute_branch<'a>(
    tree: &'a SegmentTree,
    table: &Table,
    node: &'a TreeNode,
    feature: &str,
) -> Option<(&'a TreeNode, CategoricalValue)> {
    let column = table.column_index(feature).ok()?;

    let mut best_child: Option<&TreeNode> = None;
    for child in tree.children(node) {
        if best_child.map_or(true, |best| child.row_count() > best.row_count()) {
            best_child = Some(child);
        }
    }
    let child = best_child?;

    let mut best_value: Option<(&CategoricalValue, usize)> = None;
    for value in &child.choice {
        let count = child.rows.count_value(table, column, value);
        if best_value.map_or(true, |(_, best)| count > best) {
            best_value = Some((value, count));
        }
    }

    best_value.map(|(value, _)| (child, value.clone()))
}

//! Terminal segments and their cutoff vectors

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::cutoffs::{impute_cutoffs, natural_cutoffs, Cutoffs, CUTOFF_COUNT};
use crate::errors::{Result, SegmentError};
use crate::oracle::TerminalRule;
use crate::partition::PartitionKey;
use crate::table::{PathPairs, Record, RowSet, Table};
use crate::tree::SegmentTree;

/// Identifier of a segment, unique across all partitions of one fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic segment id source owned by a single fit call
#[derive(Debug, Default)]
pub struct SegmentIdCounter {
    next: u64,
}

impl SegmentIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> SegmentId {
        let id = SegmentId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.next
    }
}

/// A terminal, rule-defined subset of a partition with its price bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    id: SegmentId,
    leaf_id: u32,
    partition: PartitionKey,
    path: PathPairs,
    rows: RowSet,
    cutoffs: Cutoffs,
    is_problematic: bool,
}

impl Segment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn leaf_id(&self) -> u32 {
        self.leaf_id
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    pub fn path(&self) -> &PathPairs {
        &self.path
    }

    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    pub fn rows_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cutoffs(&self) -> &Cutoffs {
        &self.cutoffs
    }

    /// Natural quantiles collapsed below six boundaries
    pub fn is_problematic(&self) -> bool {
        self.is_problematic
    }

    /// Whether `record` satisfies every path constraint
    pub fn admits(&self, record: &Record) -> bool {
        self.path.matches(record)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, rows: {}, cutoffs: {}, problematic: {}",
            self.path,
            self.rows_count(),
            self.cutoffs.format(),
            self.is_problematic
        )
    }
}

/// Build one segment per terminal rule of a partition
///
/// Each rule's constraints are applied in order to the partition table to
/// materialize the leaf rows. With `impute` set, collapsed cutoff vectors are
/// filled up to six boundaries; a leaf with fewer than two distinct
/// boundaries then fails the whole fit with [`SegmentError::InsufficientData`].
pub fn extract_segments(
    partition: &PartitionKey,
    table: &Table,
    tree: &SegmentTree,
    rules: &[TerminalRule],
    counter: &mut SegmentIdCounter,
    impute: bool,
) -> Result<Vec<Segment>> {
    let all_rows = RowSet::all(table);
    let mut segments = Vec::with_capacity(rules.len());

    for rule in rules {
        match tree.node(rule.leaf_id) {
            Some(node) if node.is_terminal() => {}
            _ => {
                return Err(SegmentError::UnknownLeaf {
                    partition: partition.clone(),
                    leaf_id: rule.leaf_id,
                })
            }
        }

        let path = PathPairs::from_constraints(rule.constraints.clone());
        let rows = path.filter(table, &all_rows)?;
        let natural = natural_cutoffs(&table.targets(&rows));
        let natural_len = natural.len();
        let is_problematic = natural_len < CUTOFF_COUNT;

        let cutoffs = if impute && is_problematic {
            let filled = impute_cutoffs(&natural, CUTOFF_COUNT).ok_or_else(|| {
                SegmentError::InsufficientData {
                    partition: partition.clone(),
                    leaf_id: rule.leaf_id,
                    boundaries: natural_len,
                }
            })?;
            Cutoffs::imputed(filled, natural_len)
        } else {
            Cutoffs::natural(natural)
        };

        let segment = Segment {
            id: counter.next_id(),
            leaf_id: rule.leaf_id,
            partition: partition.clone(),
            path,
            rows,
            cutoffs,
            is_problematic,
        };

        if segment.is_problematic {
            warn!(
                partition = %partition,
                leaf = rule.leaf_id,
                natural = natural_len,
                "segment cutoffs collapsed: {}",
                segment
            );
        } else {
            debug!(partition = %partition, leaf = rule.leaf_id, "segment {}", segment);
        }

        segments.push(segment);
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{FlatNode, GrownTree};
    use crate::table::{CategoricalValue, Constraint};

    fn table() -> Table {
        let mut t = Table::new(vec!["family".into()], "gm");
        for gm in [0.10, 0.15, 0.15, 0.15, 0.40, 0.60, 0.90] {
            t.push_row(vec!["PF1".into()], gm).unwrap();
        }
        for gm in [0.2, 0.2, 0.2] {
            t.push_row(vec!["PF2".into()], gm).unwrap();
        }
        t
    }

    fn grown() -> GrownTree {
        GrownTree {
            nodes: vec![
                FlatNode::root(0, Some("family")),
                FlatNode::child(1, 0, vec!["PF1".into()], None),
                FlatNode::child(2, 0, vec!["PF2".into()], None),
            ],
            rules: vec![
                TerminalRule {
                    leaf_id: 1,
                    constraints: vec![Constraint::new("family", vec!["PF1".into()])],
                },
                TerminalRule {
                    leaf_id: 2,
                    constraints: vec![Constraint::new("family", vec!["PF2".into()])],
                },
            ],
        }
    }

    #[test]
    fn test_counter_is_monotonic() {
        let mut counter = SegmentIdCounter::new();
        assert_eq!(counter.next_id(), SegmentId(0));
        assert_eq!(counter.next_id(), SegmentId(1));
        assert_eq!(counter.issued(), 2);
    }

    #[test]
    fn test_imputed_segment_keeps_problematic_flag() {
        let t = table();
        let g = grown();
        let key = PartitionKey::singleton();
        let tree = SegmentTree::reconstruct(&key, &t, &g).unwrap();
        let mut counter = SegmentIdCounter::new();

        let segments = extract_segments(&key, &t, &tree, &g.rules[..1], &mut counter, true).unwrap();
        let segment = &segments[0];
        assert_eq!(segment.rows_count(), 7);
        assert!(segment.is_problematic());
        assert_eq!(segment.cutoffs().natural_len(), 5);
        assert_eq!(segment.cutoffs().len(), CUTOFF_COUNT);
        assert!(segment.cutoffs().is_monotonic());
    }

    #[test]
    fn test_without_imputation_keeps_natural_cutoffs() {
        let t = table();
        let g = grown();
        let key = PartitionKey::singleton();
        let tree = SegmentTree::reconstruct(&key, &t, &g).unwrap();
        let mut counter = SegmentIdCounter::new();

        let segments = extract_segments(&key, &t, &tree, &g.rules, &mut counter, false).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].cutoffs().len(), 5);
        assert_eq!(segments[1].cutoffs().values(), &[0.2]);
        assert_eq!(segments[1].id(), SegmentId(1));
    }

    #[test]
    fn test_constant_leaf_is_insufficient() {
        let t = table();
        let g = grown();
        let key = PartitionKey::new(vec![CategoricalValue::present("EU")]);
        let tree = SegmentTree::reconstruct(&key, &t, &g).unwrap();
        let mut counter = SegmentIdCounter::new();

        let err = extract_segments(&key, &t, &tree, &g.rules, &mut counter, true).unwrap_err();
        match err {
            SegmentError::InsufficientData {
                partition,
                leaf_id,
                boundaries,
            } => {
                assert_eq!(partition, key);
                assert_eq!(leaf_id, 2);
                assert_eq!(boundaries, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rule_for_internal_node_is_rejected() {
        let t = table();
        let g = grown();
        let key = PartitionKey::singleton();
        let tree = SegmentTree::reconstruct(&key, &t, &g).unwrap();
        let rule = TerminalRule {
            leaf_id: 0,
            constraints: Vec::new(),
        };
        let err = extract_segments(&key, &t, &tree, &[rule], &mut SegmentIdCounter::new(), true)
            .unwrap_err();
        assert!(matches!(err, SegmentError::UnknownLeaf { leaf_id: 0, .. }));
    }
}

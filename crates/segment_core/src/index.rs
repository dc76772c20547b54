//! Fitted segmentation index
//!
//! Maps every partition key to its reconstructed tree and segments. A
//! fitted index is immutable; refitting builds a new one, and
//! [`SharedIndex`] swaps it in for concurrent readers.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::SegmentationConfig;
use crate::errors::{Result, SegmentError};
use crate::oracle::TreeGrowthOracle;
use crate::partition::{partition, PartitionKey};
use crate::predict::{predict_in, PredictError, Prediction};
use crate::segment::{extract_segments, Segment, SegmentId, SegmentIdCounter};
use crate::table::{Record, Table};
use crate::tree::SegmentTree;

/// Tree, segments and training rows of one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionModel {
    key: PartitionKey,
    table: Table,
    tree: SegmentTree,
    segments: Vec<Segment>,
}

impl PartitionModel {
    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn tree(&self) -> &SegmentTree {
        &self.tree
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn rows_count(&self) -> usize {
        self.table.len()
    }
}

#[derive(Deserialize)]
struct StoredIndex {
    config: SegmentationConfig,
    partitions: Vec<PartitionModel>,
}

impl From<StoredIndex> for SegmentIndex {
    fn from(stored: StoredIndex) -> Self {
        Self::from_parts(stored.config, stored.partitions)
    }
}

/// Partition key to (tree, segments) for a whole training table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredIndex")]
pub struct SegmentIndex {
    config: SegmentationConfig,
    partitions: Vec<PartitionModel>,
    #[serde(skip)]
    lookup: HashMap<PartitionKey, usize>,
}

impl PartialEq for SegmentIndex {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config && self.partitions == other.partitions
    }
}

impl SegmentIndex {
    /// Fit an index: partition, grow, reconstruct and extract per partition
    pub fn fit<O>(table: &Table, config: &SegmentationConfig, oracle: &O) -> Result<Self>
    where
        O: TreeGrowthOracle + ?Sized,
    {
        config.validate()?;
        config.check_table(table)?;

        let mut counter = SegmentIdCounter::new();
        let mut partitions = Vec::new();

        for (key, sub_table) in partition(table, &config.partition_features)? {
            let grown = oracle
                .grow(&sub_table, &config.features, &config.target, &config.oracle)
                .map_err(|reason| SegmentError::Oracle {
                    partition: key.clone(),
                    reason,
                })?;

            let tree = SegmentTree::reconstruct(&key, &sub_table, &grown)?;
            let segments = extract_segments(
                &key,
                &sub_table,
                &tree,
                &grown.rules,
                &mut counter,
                config.impute_cutoffs,
            )?;

            info!(
                partition = %key,
                rows = sub_table.len(),
                nodes = tree.len(),
                segments = segments.len(),
                problematic = segments.iter().filter(|s| s.is_problematic()).count(),
                "finished partition tree"
            );

            partitions.push(PartitionModel {
                key,
                table: sub_table,
                tree,
                segments,
            });
        }

        info!(
            partitions = partitions.len(),
            segments = counter.issued(),
            "segmentation index fitted"
        );

        Ok(Self::from_parts(config.clone(), partitions))
    }

    fn from_parts(config: SegmentationConfig, partitions: Vec<PartitionModel>) -> Self {
        let lookup = partitions
            .iter()
            .enumerate()
            .map(|(i, p)| (p.key.clone(), i))
            .collect();
        Self {
            config,
            partitions,
            lookup,
        }
    }

    /// Classify one record
    pub fn predict(&self, record: &Record, impute: bool) -> std::result::Result<Prediction<'_>, PredictError> {
        let key = PartitionKey::from_record(record, &self.config.partition_features);
        let model = self
            .partition(&key)
            .ok_or(PredictError::PartitionNotFound(key))?;
        predict_in(model, record, impute)
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn partition(&self, key: &PartitionKey) -> Option<&PartitionModel> {
        self.lookup.get(key).map(|&i| &self.partitions[i])
    }

    /// Partitions in first-seen order
    pub fn partitions(&self) -> &[PartitionModel] {
        &self.partitions
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.partitions.iter().flat_map(|p| p.segments.iter())
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments().find(|s| s.id() == id)
    }

    pub fn segment_count(&self) -> usize {
        self.partitions.iter().map(|p| p.segments.len()).sum()
    }

    pub fn problematic_count(&self) -> usize {
        self.segments().filter(|s| s.is_problematic()).count()
    }

    /// Training rows across all partitions
    pub fn rows_count(&self) -> usize {
        self.partitions.iter().map(PartitionModel::rows_count).sum()
    }

    /// Structural checks for an index restored from storage
    pub fn validate(&self) -> Result<()> {
        if self.lookup.len() != self.partitions.len() {
            return Err(SegmentError::ValidationFailed("duplicate partition keys".into()));
        }

        let mut ids = std::collections::HashSet::new();
        for model in &self.partitions {
            model.table.validate_shape().map_err(|err| {
                SegmentError::ValidationFailed(format!("partition {}: {}", model.key, err))
            })?;
            model.tree.validate(&model.table).map_err(|reason| {
                SegmentError::ValidationFailed(format!("partition {}: {}", model.key, reason))
            })?;

            for segment in &model.segments {
                if !ids.insert(segment.id()) {
                    return Err(SegmentError::ValidationFailed(format!(
                        "segment id {} used twice",
                        segment.id()
                    )));
                }
                if !segment.cutoffs().is_monotonic() {
                    return Err(SegmentError::ValidationFailed(format!(
                        "segment {} cutoffs are not monotonic",
                        segment.id()
                    )));
                }
                if model.tree.node(segment.leaf_id()).map_or(true, |n| !n.is_terminal()) {
                    return Err(SegmentError::ValidationFailed(format!(
                        "segment {} points at non-leaf node {}",
                        segment.id(),
                        segment.leaf_id()
                    )));
                }
                if segment.rows().iter().any(|row| row >= model.table.len()) {
                    return Err(SegmentError::ValidationFailed(format!(
                        "segment {} owns rows outside its partition",
                        segment.id()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Shared, swappable handle to the index visible to predictors
///
/// Readers take an [`Arc`] snapshot and predict without holding the lock;
/// a refit publishes a whole new index through [`SharedIndex::swap`].
#[derive(Debug, Clone)]
pub struct SharedIndex {
    current: Arc<RwLock<Arc<SegmentIndex>>>,
}

impl SharedIndex {
    pub fn new(index: SegmentIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    /// The index currently visible to predictors
    pub fn snapshot(&self) -> Arc<SegmentIndex> {
        Arc::clone(&self.current.read())
    }

    /// Install `index` and return the one it replaces
    pub fn swap(&self, index: SegmentIndex) -> Arc<SegmentIndex> {
        let mut guard = self.current.write();
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

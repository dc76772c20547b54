//! Segmentation index for margin-based price bands
//!
//! Partitions transaction records into independent supernodes, rebuilds a
//! categorical decision tree per supernode from the flat output of an
//! external tree-growth oracle, derives terminal segments with quantile
//! cutoffs over the continuous target, and classifies new records with
//! deterministic imputation of unmatched categorical values.
//!
//! Modules:
//! - `table`: categorical tables, row sets, records and path constraints
//! - `partition`: supernode partitioning
//! - `oracle`: interface to the external tree-growth procedure
//! - `tree`: flat node list to hierarchical tree
//! - `cutoffs`: quantile boundaries and cutoff imputation
//! - `segment`: terminal segments
//! - `predict`: record classification
//! - `index`: fitted index and swap handle
//! - `compare`: cutoff distances between segments
//! - `artifact`: canonical JSON persistence
//! - `render`: Graphviz export
//! - `evaluation`: batch evaluation on held-out rows
//! - `config`: segmentation configuration

pub mod artifact;
pub mod compare;
pub mod config;
pub mod cutoffs;
pub mod errors;
pub mod evaluation;
pub mod index;
pub mod oracle;
pub mod partition;
pub mod predict;
pub mod render;
pub mod segment;
pub mod table;
pub mod tree;

pub use artifact::{canonical_json_string, IndexArtifact};
pub use compare::{distance, pairwise_distances, CutoffDistance};
pub use config::SegmentationConfig;
pub use cutoffs::{impute_cutoffs, natural_cutoffs, Cutoffs, CUTOFF_COUNT};
pub use errors::{Result, SegmentError};
pub use evaluation::{evaluate, EvaluationReport, SegmentResult};
pub use index::{PartitionModel, SegmentIndex, SharedIndex};
pub use oracle::{FixedOracle, FlatNode, GrownTree, OracleParams, TerminalRule, TreeGrowthOracle};
pub use partition::{partition, PartitionKey};
pub use predict::{PredictError, Prediction, ResolvedPairs};
pub use render::{to_dot, DotStyle};
pub use segment::{Segment, SegmentId, SegmentIdCounter};
pub use table::{CategoricalValue, Constraint, PathPairs, Record, RowSet, Table};
pub use tree::{SegmentTree, TreeNode};

/// Crate version string for artifacts and reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Lumen segment trainer - offline fitting and evaluation of segmentation indexes
//!
//! Loads transaction exports, derives the categorical features, grows trees
//! with an oracle, and evaluates fitted indexes on held-out rows.

pub mod baseline;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod features;
pub mod trainer;

use lumen_segment_core::{SegmentIndex, SegmentationConfig, TreeGrowthOracle};
use std::path::Path;

pub use baseline::EntropyOracle;
pub use dataset::{Dataset, DatasetSchema, DEFAULT_DELIMITER};
pub use errors::TrainerError;
pub use features::{derive_record, derive_table, RawPayload, DERIVED_FEATURES};
pub use trainer::{EvaluationParams, SegmentTrainer};

/// Fit an index directly from a CSV file using the provided configuration.
pub fn train_index_from_csv<O>(path: &Path, config: SegmentationConfig, oracle: &O) -> Result<SegmentIndex, TrainerError>
where
    O: TreeGrowthOracle + ?Sized,
{
    let schema = DatasetSchema::from_config(&config);
    let dataset = Dataset::from_csv(path, &schema).map_err(|err| TrainerError::Dataset(format!("{err:#}")))?;
    SegmentTrainer::new(config).fit(dataset.table(), oracle)
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

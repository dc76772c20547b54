//! Error types for the segmentation core

use thiserror::Error;

use crate::partition::PartitionKey;

/// Errors raised while fitting, loading or validating a segmentation index
#[derive(Error, Debug)]
pub enum SegmentError {
    /// A column name that the table does not carry
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// A row whose arity does not match the table schema
    #[error("Row has {got} categorical values, table expects {expected}")]
    RowArity { expected: usize, got: usize },

    /// The oracle's flat node list violates its contract
    #[error("Malformed tree for partition {partition}: {reason}")]
    MalformedTree {
        partition: PartitionKey,
        reason: String,
    },

    /// A terminal rule refers to a leaf the reconstructed tree does not have
    #[error("Rule for partition {partition} references unknown leaf {leaf_id}")]
    UnknownLeaf { partition: PartitionKey, leaf_id: u32 },

    /// Too few distinct quantile boundaries to impute a full cutoff vector
    #[error(
        "Insufficient data in partition {partition}, leaf {leaf_id}: {boundaries} distinct cutoff(s), at least 2 required"
    )]
    InsufficientData {
        partition: PartitionKey,
        leaf_id: u32,
        boundaries: usize,
    },

    /// The external tree-growth oracle failed
    #[error("Tree-growth oracle failed for partition {partition}: {reason}")]
    Oracle {
        partition: PartitionKey,
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A persisted index failed verification
    #[error("Index validation failed: {0}")]
    ValidationFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for segmentation core operations
pub type Result<T> = std::result::Result<T, SegmentError>;

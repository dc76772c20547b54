use lumen_segment_core::SegmentError;
use thiserror::Error;

/// Errors returned by the segmentation trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training error: {0}")]
    Training(String),

    /// A raw record failed a precondition and cannot be scored
    #[error("record rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Segment(#[from] SegmentError),
}

use thiserror::Error;

use crate::PendingJob;

/// Failure inside the external image codec.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode image: {0}")]
    Encode(String),
    #[error("Failed to read EXIF data: {0}")]
    Exif(String),
}

/// Why a single job's processing run failed. The run has already been
/// rolled back by the time this is returned.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Processing task did not finish: {0}")]
    Aborted(#[from] tokio::task::JoinError),
    #[error("Processing panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Stored metadata is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SubmitError {
    /// The coordinator is gone; the rejected job is handed back.
    #[error("Submission queue is closed")]
    Closed(PendingJob),
}

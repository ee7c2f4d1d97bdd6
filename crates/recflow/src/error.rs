//! Error types shared by the job store, the ingestion service and the entity pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A submission is missing a required field. Dropped at ingestion, never queued.
    #[error("validation error: {0}")]
    Validation(String),

    /// The pending index could not be written to stable storage.
    #[error("failed to persist pending jobs to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No usable stream, or ffprobe failed / timed out.
    #[error("probe error: {0}")]
    Probe(String),

    #[error("transcode error: {0}")]
    Transcode(String),

    /// Moving the finished output into place failed. The temporary output is kept.
    #[error("finalize error: {0}")]
    Finalize(String),

    #[error("cleanup error: {0}")]
    Cleanup(String),

    #[error("pending job count {count} exceeds ceiling of {ceiling}")]
    TooManyPending { count: usize, ceiling: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }

    pub fn finalize(msg: impl Into<String>) -> Self {
        Self::Finalize(msg.into())
    }
}

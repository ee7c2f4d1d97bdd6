use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// Status value the recorder reports for a clean recording
pub const STATUS_OK: &str = "OK";

/// Recording details as submitted by the PVR backend.
///
/// This is both the socket payload and the value stored in the pending index,
/// so the field names are part of the wire and on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    pub path: String,
    pub channel: String,
    pub title: String,
    pub status: String,
    pub description: String,
}

impl Details {
    /// Reject submissions that can never be processed
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::validation("path must not be empty"));
        }
        if !Path::new(&self.path).is_absolute() {
            return Err(Error::validation(format!("path must be absolute: {}", self.path)));
        }
        Ok(())
    }
}

/// Media type detected by probing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    H264Video,
    Audio,
    Unknown,
}

impl MediaKind {
    pub fn is_video(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::H264Video)
    }
}

/// Informational numbers gathered while processing a job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub duration: Duration,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub command_output: String,
}

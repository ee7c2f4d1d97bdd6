pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod ffmpeg;
pub mod ffprobe;
pub mod files;
pub mod ingest;
pub mod media;
pub mod notify;
pub mod renamer;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use entity::{Entity, Stage};
pub use error::{Error, Result};
pub use ffmpeg::{FfmpegTools, MediaTools};
pub use ffprobe::{FFProbeData, FFProbeFormat, FFProbeStream};
pub use ingest::IngestServer;
pub use media::Details;
pub use notify::{NotificationHandler, Notifier};
pub use renamer::Renamer;
pub use store::{Job, JobId, JobQueue, JobStore};

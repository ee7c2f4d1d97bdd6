//! Test doubles for the media tools and the notifier.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::ffmpeg::{MediaTools, TranscodeOutput};
use crate::ffprobe::{FFProbeData, FFProbeStream};
use crate::notify::Notifier;

/// Build probe output from `(codec_type, codec_name)` pairs
pub fn probe_data(streams: &[(&str, &str)]) -> FFProbeData {
    FFProbeData {
        streams: streams
            .iter()
            .enumerate()
            .map(|(i, (kind, codec))| FFProbeStream {
                index: i as i32,
                codec_type: Some(kind.to_string()),
                codec_name: Some(codec.to_string()),
                ..Default::default()
            })
            .collect(),
        format: None,
    }
}

/// What the fake ffprobe reports
#[derive(Debug, Clone)]
pub enum ProbeScript {
    Streams(Vec<(&'static str, &'static str)>),
    /// Per file name; unknown files have no streams
    ByFile(Vec<(&'static str, Vec<(&'static str, &'static str)>)>),
}

/// Scripted stand-in for ffprobe/ffmpeg
pub struct FakeTools {
    probe: ProbeScript,
    fail_transcode_for: Option<String>,
    probes: Mutex<usize>,
    transcodes: Mutex<Vec<(PathBuf, PathBuf, Vec<String>)>>,
}

impl FakeTools {
    /// Bytes every successful fake transcode writes
    pub const OUTPUT: &'static [u8] = b"transcoded";

    pub fn new(probe: ProbeScript) -> Self {
        Self {
            probe,
            fail_transcode_for: None,
            probes: Mutex::new(0),
            transcodes: Mutex::new(Vec::new()),
        }
    }

    /// Every transcode exits non-zero
    pub fn failing_transcode(mut self) -> Self {
        self.fail_transcode_for = Some(String::new());
        self
    }

    /// Transcodes of files whose name contains `needle` exit non-zero
    pub fn failing_transcode_for(mut self, needle: &str) -> Self {
        self.fail_transcode_for = Some(needle.to_string());
        self
    }

    pub fn probe_count(&self) -> usize {
        *self.probes.lock().unwrap()
    }

    pub fn transcode_calls(&self) -> Vec<(PathBuf, PathBuf, Vec<String>)> {
        self.transcodes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTools for FakeTools {
    async fn probe(&self, path: &Path, _timeout: Duration) -> Result<FFProbeData> {
        *self.probes.lock().unwrap() += 1;
        if !path.exists() {
            return Err(Error::probe(format!("file does not exist: {}", path.display())));
        }

        let streams = match &self.probe {
            ProbeScript::Streams(streams) => streams.clone(),
            ProbeScript::ByFile(files) => {
                let name = path.file_name().unwrap().to_string_lossy().to_string();
                files
                    .iter()
                    .find(|(file, _)| *file == name)
                    .map(|(_, streams)| streams.clone())
                    .unwrap_or_default()
            }
        };
        Ok(probe_data(&streams))
    }

    async fn transcode(&self, input: &Path, output: &Path, codec_args: &[String]) -> Result<TranscodeOutput> {
        self.transcodes
            .lock()
            .unwrap()
            .push((input.to_path_buf(), output.to_path_buf(), codec_args.to_vec()));

        let fails = self
            .fail_transcode_for
            .as_deref()
            .map(|needle| input.to_string_lossy().contains(needle))
            .unwrap_or(false);

        if fails {
            // Leave a partial file behind like a crashed ffmpeg would
            std::fs::write(output, b"partial").unwrap();
            return Ok(TranscodeOutput {
                success: false,
                exit_code: Some(1),
                output: "boom".to_string(),
            });
        }

        std::fs::write(output, Self::OUTPUT).unwrap();
        Ok(TranscodeOutput {
            success: true,
            exit_code: Some(0),
            output: "done".to_string(),
        })
    }
}

/// Notifier that remembers every entity it was handed
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Entity>>,
}

impl RecordingNotifier {
    pub fn seen(&self) -> Vec<Entity> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, entity: &Entity) -> Result<()> {
        self.seen.lock().unwrap().push(entity.clone());
        Ok(())
    }
}

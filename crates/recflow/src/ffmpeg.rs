//! External media tooling: the ffprobe/ffmpeg subprocess boundary.

use std::path::{Path, PathBuf};
use std::time::Duration;
use async_trait::async_trait;
use tokio::process::Command;
use crate::config::TranscodeSettings;
use crate::error::{Error, Result};
use crate::ffprobe::{self, FFProbeData};

/// Result of running an ffmpeg job
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
}

/// Probing and transcoding as seen by the entity pipeline
#[async_trait]
pub trait MediaTools: Send + Sync {
    async fn probe(&self, path: &Path, timeout: Duration) -> Result<FFProbeData>;

    /// Run a transcode. `Err` means the process could not be launched at all.
    async fn transcode(&self, input: &Path, output: &Path, codec_args: &[String]) -> Result<TranscodeOutput>;
}

/// Subprocess-backed tools using the configured ffmpeg/ffprobe binaries
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl FfmpegTools {
    pub fn new(settings: &TranscodeSettings) -> Self {
        Self {
            ffmpeg_bin: settings.ffmpeg_bin.clone(),
            ffprobe_bin: settings.ffprobe_bin.clone(),
        }
    }
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe(&self, path: &Path, timeout: Duration) -> Result<FFProbeData> {
        ffprobe::probe_file(&self.ffprobe_bin, path, timeout).await
    }

    async fn transcode(&self, input: &Path, output: &Path, codec_args: &[String]) -> Result<TranscodeOutput> {
        use log::debug;

        let args = build_transcode_args(input, output, codec_args);
        debug!("Executing ffmpeg: {} {}", self.ffmpeg_bin.display(), args.join(" "));

        // No timeout here: a transcode runs as long as it needs
        let result = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                Error::transcode(format!(
                    "failed to spawn {} for {}: {}",
                    self.ffmpeg_bin.display(),
                    input.display(),
                    e
                ))
            })?;

        let mut combined = String::from_utf8_lossy(&result.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&result.stderr));

        debug!("ffmpeg exit code: {:?}, output length: {}", result.status.code(), combined.len());

        Ok(TranscodeOutput {
            success: result.status.success(),
            exit_code: result.status.code(),
            output: combined,
        })
    }
}

/// `-i <input> <codec args...> -y <output>`
pub fn build_transcode_args(input: &Path, output: &Path, codec_args: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(codec_args.len() + 4);

    args.push("-i".to_string());
    args.push(input.to_string_lossy().to_string());
    args.extend(codec_args.iter().cloned());

    // Overwrite whatever a previous crashed attempt left behind
    args.push("-y".to_string());
    args.push(output.to_string_lossy().to_string());

    args
}

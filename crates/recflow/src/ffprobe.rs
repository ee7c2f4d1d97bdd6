use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use tokio::process::Command;
use crate::error::{Error, Result};

/// Complete ffprobe output structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: Option<FFProbeFormat>,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    pub format_name: String,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    pub tags: Option<HashMap<String, String>>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeStream {
    pub index: i32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub bit_rate: Option<String>,
}

impl FFProbeData {
    pub fn first_video_stream(&self) -> Option<&FFProbeStream> {
        self.first_stream_of("video")
    }

    pub fn first_audio_stream(&self) -> Option<&FFProbeStream> {
        self.first_stream_of("audio")
    }

    fn first_stream_of(&self, codec_type: &str) -> Option<&FFProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(codec_type))
    }
}

impl FFProbeStream {
    pub fn codec(&self) -> &str {
        self.codec_name.as_deref().unwrap_or("unknown")
    }
}

/// Run ffprobe against a file and parse the JSON output.
///
/// The child is killed if it does not finish within `timeout`.
pub async fn probe_file(ffprobe_bin: &Path, file_path: &Path, timeout: Duration) -> Result<FFProbeData> {
    use log::debug;

    // Verify file exists before trying to probe
    if !file_path.exists() {
        return Err(Error::probe(format!("file does not exist: {}", file_path.display())));
    }

    debug!("Executing ffprobe for: {}", file_path.display());

    let mut cmd = Command::new(ffprobe_bin);
    cmd.arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_streams")
        .arg("-show_format")
        .arg(file_path)
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(|e| {
            Error::probe(format!(
                "failed to execute {} for {}: {}",
                ffprobe_bin.display(),
                file_path.display(),
                e
            ))
        })?,
        Err(_) => {
            return Err(Error::probe(format!(
                "ffprobe timed out after {:?} for {}",
                timeout,
                file_path.display()
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        return Err(Error::probe(format!(
            "ffprobe failed (exit code {}) for {}: {}",
            exit_code,
            file_path.display(),
            stderr.trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

/// Parse raw ffprobe JSON
pub fn parse_probe_output(stdout: &[u8]) -> Result<FFProbeData> {
    serde_json::from_slice(stdout).map_err(|e| Error::probe(format!("unable to parse ffprobe output: {}", e)))
}

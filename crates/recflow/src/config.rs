use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/recflow/config.toml";

/// Configuration for the recording pipeline daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Unix socket the recorder submits finished recordings to
    pub socket_path: PathBuf,
    /// JSON file holding the pending job index
    pub state_path: PathBuf,
    pub transcoding: TranscodeSettings,
    pub rename: RenameConfig,
    pub notifications: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/recflow/recflow.sock"),
            state_path: PathBuf::from("/var/lib/recflow/state.json"),
            transcoding: TranscodeSettings::default(),
            rename: RenameConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Per-job transcode policy. Captured once per job by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    /// Upper bound on a single ffprobe run
    pub probe_timeout_secs: u64,
    /// Codec arguments for video sources, whitespace separated
    pub video_args: String,
    /// Codec arguments for audio-only sources, whitespace separated
    pub audio_args: String,
    /// Only transcode standard-definition (non-h264) video
    pub only_sd: bool,
    /// Leave the path alone apart from the target extension
    pub skip_rename: bool,
    /// Keep the original recording after a successful transcode
    pub keep_originals: bool,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            probe_timeout_secs: 3,
            video_args: "-c:v libx264 -preset veryfast -crf 22 -c:a aac -b:a 160k".to_string(),
            audio_args: "-vn -c:a libmp3lame -q:a 2".to_string(),
            only_sd: false,
            skip_rename: false,
            keep_originals: false,
        }
    }
}

impl TranscodeSettings {
    pub fn video_args(&self) -> Vec<String> {
        split_args(&self.video_args)
    }

    pub fn audio_args(&self) -> Vec<String> {
        split_args(&self.audio_args)
    }
}

fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// Switches and user rules for the path renamer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameConfig {
    pub fix_timestamps: bool,
    pub remove_new: bool,
    pub fix_spacing: bool,
    pub rules: Vec<RenameRule>,
}

/// Replace `old` (case-insensitive regex) with `new` in the last two path components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRule {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub pushover: Option<PushoverConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushoverConfig {
    pub app_token: String,
    pub endpoint: String,
    pub recipients: Vec<Recipient>,
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            app_token: String::new(),
            endpoint: "https://api.pushover.net/1/messages.json".to_string(),
            recipients: Vec::new(),
        }
    }
}

/// A notification recipient and the titles they care about
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipient {
    pub name: String,
    pub key: String,
    /// Receives anything no other recipient matched
    pub default: bool,
    /// Regexes matched against the lower-cased programme title
    pub notify: Vec<String>,
}

impl Config {
    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // JSON if the extension says so, TOML otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("json") {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                } else {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Make sure every user-supplied regex compiles
    pub fn validate(&self) -> Result<()> {
        use log::debug;

        let mut count = 0;
        if let Some(pushover) = &self.notifications.pushover {
            for recipient in &pushover.recipients {
                for pattern in &recipient.notify {
                    Regex::new(pattern).with_context(|| {
                        format!("Notification regex '{}' for '{}' did not compile", pattern, recipient.name)
                    })?;
                    count += 1;
                }
            }
        }

        for rule in &self.rename.rules {
            Regex::new(&format!("(?i){}", rule.old))
                .with_context(|| format!("Rename rule regex '{}' did not compile", rule.old))?;
            count += 1;
        }

        debug!("config: regex validation ok, count {}", count);
        Ok(())
    }
}

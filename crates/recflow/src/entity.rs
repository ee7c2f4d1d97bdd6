//! Per-job processing: probe, classify, transcode or skip, move into place, clean up.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use log::{debug, error, info, warn};
use uuid::Uuid;
use crate::config::TranscodeSettings;
use crate::error::{Error, Result};
use crate::ffmpeg::MediaTools;
use crate::ffprobe::FFProbeData;
use crate::files;
use crate::media::{Details, MediaKind, Stats, STATUS_OK};
use crate::renamer::Renamer;

/// Codec that needs no audio transcode
pub const AUDIO_TARGET_CODEC: &str = "mp3";

/// Extension used for audio-only output
pub const AUDIO_EXTENSION: &str = "mp3";

/// Container used for video output when the source has no extension
const DEFAULT_VIDEO_EXTENSION: &str = "mkv";

/// Where a job is in its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Probed,
    SkippedTranscode,
    Transcoding,
    TranscodeFailed,
    TranscodeSucceeded,
    Finalized,
    Success,
    Failure,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Success | Stage::Failure)
    }
}

/// Media kind and transcode decision derived from a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: MediaKind,
    pub skip_transcode: bool,
}

/// Decide what a probed file is and whether it needs transcoding.
///
/// The first video stream wins; audio is only looked at when there is no video.
pub fn classify(data: &FFProbeData, only_sd: bool) -> Result<Classification> {
    if let Some(video) = data.first_video_stream() {
        return Ok(match video.codec() {
            "h264" => Classification {
                kind: MediaKind::H264Video,
                skip_transcode: only_sd,
            },
            _ => Classification {
                kind: MediaKind::Video,
                skip_transcode: false,
            },
        });
    }

    if let Some(audio) = data.first_audio_stream() {
        return Ok(Classification {
            kind: MediaKind::Audio,
            skip_transcode: audio.codec() == AUDIO_TARGET_CODEC,
        });
    }

    Err(Error::probe("found no audio or video streams in file"))
}

/// A recording moving through the pipeline.
///
/// Holds the transcode settings and renamer captured when the job was picked up,
/// so a configuration reload never changes a job already in flight.
#[derive(Debug, Clone)]
pub struct Entity {
    pub details: Details,
    pub dest_path: PathBuf,
    pub kind: MediaKind,
    pub stats: Stats,
    pub skip_transcode: bool,
    pub transcode_success: bool,
    pub stage: Stage,
    /// Text of the error that ended the job, if any
    pub error: Option<String>,

    settings: TranscodeSettings,
    renamer: Renamer,
    tmp_path: Option<PathBuf>,
}

impl Entity {
    pub fn new(details: Details, settings: TranscodeSettings, renamer: Renamer) -> Self {
        let dest_path = PathBuf::from(&details.path);
        Self {
            details,
            dest_path,
            kind: MediaKind::Unknown,
            stats: Stats::default(),
            skip_transcode: false,
            transcode_success: false,
            stage: Stage::Created,
            error: None,
            settings,
            renamer,
            tmp_path: None,
        }
    }

    pub fn source_path(&self) -> &Path {
        Path::new(&self.details.path)
    }

    pub fn is_transcodable(&self) -> bool {
        !self.skip_transcode
    }

    /// Overall outcome: a clean recording that was either transcoded or didn't need it.
    /// A job that ended in `Failure` is never ok.
    pub fn ok(&self) -> bool {
        self.stage != Stage::Failure
            && self.details.status == STATUS_OK
            && (self.skip_transcode || self.transcode_success)
    }

    /// Force the job into `Failure`, keeping the first recorded error
    pub fn fail(&mut self, err: &Error) {
        if self.error.is_none() {
            self.error = Some(err.to_string());
        }
        self.set_stage(Stage::Failure);
    }

    /// Temporary output path of the transcode, once one has been chosen
    pub fn tmp_path(&self) -> Option<&Path> {
        self.tmp_path.as_deref()
    }

    /// Drive the job to a terminal stage. The error is also recorded on the entity.
    pub async fn process(&mut self, tools: &dyn MediaTools) -> Result<()> {
        let result = self.run(tools).await;

        match &result {
            Ok(()) => self.set_stage(Stage::Success),
            Err(e) => self.fail(e),
        }
        result
    }

    async fn run(&mut self, tools: &dyn MediaTools) -> Result<()> {
        self.details.validate()?;

        info!(
            "media: new entity path={} channel={} title={} status={}",
            self.details.path, self.details.channel, self.details.title, self.details.status
        );

        let source = self.source_path().to_path_buf();
        self.stats.input_bytes = files::file_size(&source);

        // Step 1: probe and classify
        let timeout = Duration::from_secs(self.settings.probe_timeout_secs);
        let data = tools.probe(&source, timeout).await?;
        let classification = classify(&data, self.settings.only_sd)?;

        self.kind = classification.kind;
        self.skip_transcode = classification.skip_transcode;
        if self.kind == MediaKind::Audio {
            self.dest_path = files::with_extension(&source, AUDIO_EXTENSION);
        }
        self.set_stage(Stage::Probed);

        info!(
            "media: detected {:?} in {} (skip transcode: {})",
            self.kind,
            self.basename(),
            self.skip_transcode
        );

        // Step 2: transcode unless the source is already acceptable
        let staged = if self.skip_transcode {
            info!("media: skipping transcode for {}", self.basename());
            self.set_stage(Stage::SkippedTranscode);
            self.stats.output_bytes = self.stats.input_bytes;
            source.clone()
        } else {
            self.transcode(tools, &source).await?
        };

        // Step 3: move into place
        self.finalize(&staged)?;
        if !self.skip_transcode {
            self.transcode_success = true;
        }

        // Step 4: best effort cleanup
        self.cleanup();

        info!(
            "media: processing complete path={} duration={:?} start_size={} end_size={}",
            self.dest_path.display(),
            self.stats.duration,
            self.stats.input_bytes,
            self.stats.output_bytes
        );
        Ok(())
    }

    /// Run the transcode into a temp file next to the source, returning the temp path
    async fn transcode(&mut self, tools: &dyn MediaTools, source: &Path) -> Result<PathBuf> {
        let tmp = self.temp_output_path(source);
        self.tmp_path = Some(tmp.clone());
        debug!("media: temporary path for encoding media: {}", tmp.display());

        let codec_args = if self.kind.is_video() {
            self.settings.video_args()
        } else {
            self.settings.audio_args()
        };

        info!("media: transcoding {} -> {} with {:?}", source.display(), tmp.display(), codec_args);
        self.set_stage(Stage::Transcoding);

        let start = Instant::now();
        let result = tools.transcode(source, &tmp, &codec_args).await;
        self.stats.duration = start.elapsed();
        self.stats.output_bytes = files::file_size(&tmp);

        let failure = match result {
            Ok(output) => {
                self.stats.command_output = output.output;
                if output.success {
                    None
                } else {
                    Some(Error::transcode(format!(
                        "ffmpeg exited with code {}",
                        output.exit_code.map_or("none".to_string(), |c| c.to_string())
                    )))
                }
            }
            Err(e) => Some(e),
        };

        if let Some(err) = failure {
            self.set_stage(Stage::TranscodeFailed);
            self.abort();
            return Err(err);
        }

        self.set_stage(Stage::TranscodeSucceeded);
        Ok(tmp)
    }

    /// Compute the final path and move `staged` there. On failure the staged file is left alone.
    fn finalize(&mut self, staged: &Path) -> Result<()> {
        if !self.settings.skip_rename {
            let renamed = PathBuf::from(self.renamer.rename(&self.dest_path.to_string_lossy()));
            debug!("media: rename results old_path={} new_path={}", self.details.path, renamed.display());
            self.dest_path = renamed;
        } else {
            debug!("media: skip_rename is set, not performing full renaming");
        }

        if staged != self.dest_path {
            info!("media: moving {} to {}", staged.display(), self.dest_path.display());
            files::move_into_place(staged, &self.dest_path)
                .map_err(|e| Error::finalize(format!("{:#}", e)))?;
        }

        self.set_stage(Stage::Finalized);
        Ok(())
    }

    /// Remove the original (unless kept) and its directory if that leaves it empty
    fn cleanup(&self) {
        let source = self.source_path();
        if source == self.dest_path {
            return;
        }

        if !self.settings.keep_originals && source.exists() {
            info!("media: removing original file {}", source.display());
            if let Err(e) = std::fs::remove_file(source) {
                let err = Error::Cleanup(format!("removing {}: {}", source.display(), e));
                error!("media: error cleaning up unneeded files: {}", err);
                return;
            }
        }

        if let Some(dir) = source.parent() {
            if self.dest_path.starts_with(dir) {
                return;
            }
            match files::remove_dir_if_empty(dir) {
                Ok(true) => info!("media: directory {} empty, cleaned up", dir.display()),
                Ok(false) => {}
                Err(e) => error!("media: error cleaning up unneeded files: {}", Error::Cleanup(format!("{:#}", e))),
            }
        }
    }

    /// Discard the temp output after a failed transcode
    fn abort(&self) {
        if let Some(tmp) = &self.tmp_path {
            if tmp.exists() {
                if let Err(e) = std::fs::remove_file(tmp) {
                    warn!("media: failed to delete temp file {}: {}", tmp.display(), e);
                } else {
                    debug!("media: deleted temp file {}", tmp.display());
                }
            }
        }
    }

    /// Unique file in the source directory so the final move is a same-filesystem rename
    fn temp_output_path(&self, source: &Path) -> PathBuf {
        let ext = if self.kind.is_video() {
            source
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| !e.is_empty())
                .unwrap_or(DEFAULT_VIDEO_EXTENSION)
        } else {
            AUDIO_EXTENSION
        };
        let dir = source.parent().unwrap_or_else(|| Path::new("/"));
        dir.join(format!("{}.{}", Uuid::new_v4(), ext))
    }

    fn basename(&self) -> String {
        self.source_path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn set_stage(&mut self, stage: Stage) {
        debug!("media: {} {:?} -> {:?}", self.basename(), self.stage, stage);
        self.stage = stage;
    }
}

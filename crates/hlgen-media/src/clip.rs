//! Highlight clip extraction.
//!
//! Each highlight is cut from the source with a single FFmpeg invocation.
//! The default is a stream copy, which keeps the original audio and video
//! encoding; cut points then snap to the nearest preceding keyframe. Setting
//! [`ClipEncoding::Reencode`] trades speed for frame-accurate boundaries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hlgen_models::{ClipRange, EncodingConfig};
use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::get_duration;

/// How clip streams are written.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ClipEncoding {
    /// Copy audio/video packets unchanged.
    #[default]
    StreamCopy,
    /// Re-encode with the given settings.
    Reencode(EncodingConfig),
}

/// A clip written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedClip {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Probed duration; `None` if FFprobe is unavailable or failed
    pub duration_secs: Option<f64>,
}

/// Cuts a time range out of a source video.
#[async_trait]
pub trait ClipExtractor: Send + Sync {
    /// Write `range` of `source` to `output`, replacing any existing file.
    async fn extract(&self, source: &Path, range: &ClipRange, output: &Path) -> MediaResult<ExtractedClip>;
}

/// Build the FFmpeg command for one clip.
pub fn build_clip_command(source: &Path, range: &ClipRange, output: &Path, encoding: &ClipEncoding) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(source, output)
        .seek(range.start_secs)
        .duration(range.duration_secs());

    let cmd = match encoding {
        ClipEncoding::StreamCopy => cmd.codec_copy(),
        ClipEncoding::Reencode(config) => cmd
            .video_codec(&config.codec)
            .preset(&config.preset)
            .crf(config.crf)
            .audio_codec(&config.audio_codec)
            .audio_bitrate(&config.audio_bitrate)
            .output_args(["-movflags", "+faststart"]),
    };

    // Deterministic output for repeated runs
    cmd.output_args([
        "-avoid_negative_ts",
        "make_zero",
        "-map_metadata",
        "-1",
        "-fflags",
        "+bitexact",
    ])
}

/// [`ClipExtractor`] backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegClipExtractor {
    encoding: ClipEncoding,
    runner: FfmpegRunner,
}

impl FfmpegClipExtractor {
    pub fn new(encoding: ClipEncoding) -> Self {
        Self {
            encoding,
            runner: FfmpegRunner::new(),
        }
    }

    /// Kill FFmpeg runs that exceed `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    pub fn encoding(&self) -> &ClipEncoding {
        &self.encoding
    }
}

#[async_trait]
impl ClipExtractor for FfmpegClipExtractor {
    async fn extract(&self, source: &Path, range: &ClipRange, output: &Path) -> MediaResult<ExtractedClip> {
        if !source.exists() {
            return Err(MediaError::FileNotFound(source.to_path_buf()));
        }

        info!(
            "Extracting clip: {} -> {} ({} - {})",
            source.display(),
            output.display(),
            range.start_arg(),
            range.end_arg()
        );

        let cmd = build_clip_command(source, range, output, &self.encoding);
        self.runner.run(&cmd).await?;

        let size_bytes = match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => {
                return Err(MediaError::InvalidVideo(format!(
                    "FFmpeg produced no output for {} - {}",
                    range.start_arg(),
                    range.end_arg()
                )))
            }
        };

        let duration_secs = match get_duration(output).await {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Could not probe clip {}: {}", output.display(), e);
                None
            }
        };

        info!("Clip extracted: {} ({} bytes)", output.display(), size_bytes);

        Ok(ExtractedClip {
            path: output.to_path_buf(),
            size_bytes,
            duration_secs,
        })
    }
}

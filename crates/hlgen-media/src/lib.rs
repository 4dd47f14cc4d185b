//! FFmpeg CLI wrapper for highlight clip extraction.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A runner with stderr capture and timeouts
//! - The `ClipExtractor` seam used by the pipeline
//! - FFprobe metadata

pub mod clip;
pub mod command;
pub mod error;
pub mod probe;

pub use clip::{build_clip_command, ClipEncoding, ClipExtractor, ExtractedClip, FfmpegClipExtractor};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_video, VideoInfo};

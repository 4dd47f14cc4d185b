//! Timestamp parsing for highlight clip boundaries.
//!
//! The analysis model reports times as `MM:SS`. `HH:MM:SS` and a fractional
//! seconds component (`MM:SS.mmm`) are accepted as well; anything else is a
//! parse error.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum reasonable video duration (24 hours in seconds).
pub const MAX_VIDEO_DURATION_SECS: f64 = 86400.0;

/// Timestamp parsing/validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Invalid timestamp format '{0}'. Use MM:SS or HH:MM:SS")]
    InvalidFormat(String),

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("{0} value out of range: {1}")]
    OutOfRange(&'static str, String),

    #[error("Start time ({start}) must be before end time ({end})")]
    StartNotBeforeEnd { start: String, end: String },

    #[error("Timestamps exceed maximum allowed duration ({} hours)", .0 / 3600.0)]
    ExceedsMaxDuration(f64),
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use hlgen_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let total = match parts.as_slice() {
        [minutes, seconds] => {
            let minutes = parse_whole("minutes", minutes)?;
            let seconds = parse_seconds(seconds)?;
            minutes * 60.0 + seconds
        }
        [hours, minutes, seconds] => {
            let hours = parse_whole("hours", hours)?;
            let minutes = parse_whole("minutes", minutes)?;
            if minutes >= 60.0 {
                return Err(TimestampError::OutOfRange("minutes", parts[1].to_string()));
            }
            let seconds = parse_seconds(seconds)?;
            hours * 3600.0 + minutes * 60.0 + seconds
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if total > MAX_VIDEO_DURATION_SECS {
        return Err(TimestampError::ExceedsMaxDuration(MAX_VIDEO_DURATION_SECS));
    }

    Ok(total)
}

fn parse_whole(component: &'static str, value: &str) -> Result<f64, TimestampError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimestampError::InvalidValue(component, value.to_string()));
    }
    value
        .parse::<u32>()
        .map(f64::from)
        .map_err(|_| TimestampError::InvalidValue(component, value.to_string()))
}

fn parse_seconds(value: &str) -> Result<f64, TimestampError> {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value, None),
    };

    let mut seconds = parse_whole("seconds", whole)?;
    if let Some(fraction) = fraction {
        if fraction.is_empty() || fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimestampError::InvalidValue("seconds", value.to_string()));
        }
        let millis: f64 = fraction
            .parse::<u32>()
            .map(f64::from)
            .map_err(|_| TimestampError::InvalidValue("seconds", value.to_string()))?;
        seconds += millis / 10f64.powi(fraction.len() as i32);
    }

    if seconds >= 60.0 {
        return Err(TimestampError::OutOfRange("seconds", value.to_string()));
    }
    Ok(seconds)
}

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm string.
pub fn format_seconds(total_secs: f64) -> String {
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

/// A validated `[start, end)` range within the source video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRange {
    /// Start time in seconds
    pub start_secs: f64,
    /// End time in seconds
    pub end_secs: f64,
}

impl ClipRange {
    /// Parse a start/end pair. Start must be strictly before end.
    pub fn parse(start: &str, end: &str) -> Result<Self, TimestampError> {
        let start_secs = parse_timestamp(start)?;
        let end_secs = parse_timestamp(end)?;

        if start_secs >= end_secs {
            return Err(TimestampError::StartNotBeforeEnd {
                start: start.trim().to_string(),
                end: end.trim().to_string(),
            });
        }

        Ok(Self {
            start_secs,
            end_secs,
        })
    }

    /// Clip length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Start as an FFmpeg time argument.
    pub fn start_arg(&self) -> String {
        format_seconds(self.start_secs)
    }

    /// End as an FFmpeg time argument.
    pub fn end_arg(&self) -> String {
        format_seconds(self.end_secs)
    }
}

//! Per-clip outcomes and the report held for a session.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::highlight::HighlightDescriptor;

/// The uploaded source video after it reached the bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceVideo {
    /// Original (sanitized) file name
    pub file_name: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Object key within the bucket
    pub object_key: String,
    /// `gs://bucket/key` reference handed to the model
    pub gcs_uri: String,
    /// Public HTTPS URL of the object
    pub public_url: String,
}

/// Result of cutting one highlight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClipOutcome {
    Ready {
        file_name: String,
        size_bytes: u64,
        /// Probed duration of the produced file
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
        /// Public URL when the clip was also uploaded
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_url: Option<String>,
        /// Clip upload failure; the local file is still usable
        #[serde(skip_serializing_if = "Option::is_none")]
        upload_error: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl ClipOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ClipOutcome::Ready { .. })
    }

    /// Local file name of a ready clip.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            ClipOutcome::Ready { file_name, .. } => Some(file_name),
            ClipOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ClipOutcome::Ready { .. } => None,
            ClipOutcome::Failed { error } => Some(error),
        }
    }
}

/// A descriptor together with what happened to its clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HighlightEntry {
    #[serde(flatten)]
    pub descriptor: HighlightDescriptor,
    /// `end - start` in seconds, absent when the timestamps don't parse
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub clip: ClipOutcome,
}

impl HighlightEntry {
    pub fn new(descriptor: HighlightDescriptor, clip: ClipOutcome) -> Self {
        let duration_secs = descriptor.duration_secs();
        Self {
            descriptor,
            duration_secs,
            clip,
        }
    }
}

/// Everything one analysis run produced for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HighlightReport {
    pub session_id: String,
    pub video: SourceVideo,
    pub highlights: Vec<HighlightEntry>,
    pub clips_ready: usize,
    pub clips_failed: usize,
    pub created_at: DateTime<Utc>,
}

impl HighlightReport {
    /// Build a report, deriving the clip counts from the entries.
    pub fn new(session_id: impl Into<String>, video: SourceVideo, highlights: Vec<HighlightEntry>) -> Self {
        let clips_ready = highlights.iter().filter(|h| h.clip.is_ready()).count();
        let clips_failed = highlights.len() - clips_ready;
        Self {
            session_id: session_id.into(),
            video,
            highlights,
            clips_ready,
            clips_failed,
            created_at: Utc::now(),
        }
    }

    /// Entries whose clip was produced.
    pub fn ready(&self) -> impl Iterator<Item = &HighlightEntry> {
        self.highlights.iter().filter(|h| h.clip.is_ready())
    }

    /// Whether `file_name` is one of this report's ready clips.
    pub fn has_clip(&self, file_name: &str) -> bool {
        self.ready().any(|h| h.clip.file_name() == Some(file_name))
    }
}

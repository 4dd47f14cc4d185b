//! Highlight descriptors returned by the analysis model.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::timestamp::{ClipRange, TimestampError};

/// Errors in the descriptor list as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HighlightError {
    #[error("No highlights found in the analysis response")]
    NoHighlights,

    #[error("Duplicate highlight_number {0}")]
    DuplicateNumber(u32),

    #[error("Invalid highlight descriptor: {0}")]
    Invalid(String),
}

/// A single highlight segment suggested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct HighlightDescriptor {
    /// Ordinal position (1-based, unique within a response)
    #[validate(range(min = 1))]
    pub highlight_number: u32,

    /// Clip start (MM:SS)
    pub start_time: String,

    /// Clip end (MM:SS)
    pub end_time: String,

    /// Why this segment was chosen
    #[validate(custom(function = "non_blank"))]
    pub reason: String,

    /// Short title
    #[validate(custom(function = "non_blank"))]
    pub brief_description: String,
}

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

impl HighlightDescriptor {
    /// Create a new descriptor.
    pub fn new(
        highlight_number: u32,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
        reason: impl Into<String>,
        brief_description: impl Into<String>,
    ) -> Self {
        Self {
            highlight_number,
            start_time: start_time.into(),
            end_time: end_time.into(),
            reason: reason.into(),
            brief_description: brief_description.into(),
        }
    }

    /// Parse the start/end strings into a clip range.
    pub fn clip_range(&self) -> Result<ClipRange, TimestampError> {
        ClipRange::parse(&self.start_time, &self.end_time)
    }

    /// Duration in seconds, if the timestamps parse.
    pub fn duration_secs(&self) -> Option<f64> {
        self.clip_range().ok().map(|r| r.duration_secs())
    }

    /// Output file name for this highlight's clip.
    pub fn clip_file_name(&self) -> String {
        format!("highlight_{}.mp4", self.highlight_number)
    }

    /// Display title, e.g. `#1 - Opening goal`.
    pub fn title(&self) -> String {
        format!("#{} - {}", self.highlight_number, self.brief_description.trim())
    }
}

/// The model's JSON payload: `{"highlights": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct HighlightsResponse {
    #[validate(nested)]
    pub highlights: Vec<HighlightDescriptor>,
}

impl HighlightsResponse {
    /// Check list-level invariants: non-empty, valid fields, unique numbers.
    ///
    /// Timestamps are not checked here; a bad timestamp fails only its own
    /// clip at extraction time.
    pub fn check(&self) -> Result<(), HighlightError> {
        if self.highlights.is_empty() {
            return Err(HighlightError::NoHighlights);
        }

        for highlight in &self.highlights {
            highlight.validate().map_err(|e| {
                HighlightError::Invalid(format!("highlight {}: {}", highlight.highlight_number, e))
            })?;
        }

        let mut seen = HashSet::new();
        for highlight in &self.highlights {
            if !seen.insert(highlight.highlight_number) {
                return Err(HighlightError::DuplicateNumber(highlight.highlight_number));
            }
        }

        Ok(())
    }
}

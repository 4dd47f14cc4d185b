//! Shared data models for the video highlights generator.
//!
//! This crate provides Serde-serializable types for:
//! - Highlight descriptors returned by the analysis model
//! - Timestamp parsing into clip ranges
//! - Upload validation policy
//! - Per-clip outcomes and the session report

pub mod encoding;
pub mod highlight;
pub mod report;
pub mod session;
pub mod timestamp;
pub mod upload;

// Re-export common types
pub use encoding::EncodingConfig;
pub use highlight::{HighlightDescriptor, HighlightError, HighlightsResponse};
pub use report::{ClipOutcome, HighlightEntry, HighlightReport, SourceVideo};
pub use session::SessionId;
pub use timestamp::{ClipRange, TimestampError};
pub use upload::{sanitize_file_name, UploadPolicy, UploadRejection};

//! Google Cloud plumbing for the highlights pipeline.
//!
//! This crate provides:
//! - An OAuth token cache over Application Default Credentials
//! - The Cloud Storage bridge (`ObjectStore`)
//! - The Vertex AI Gemini analysis client (`HighlightAnalyzer`)
//! - The instruction template sent with every analysis request

pub mod auth;
pub mod error;
pub mod metrics;
pub mod prompt;
pub mod storage;
pub mod vertex;

pub use auth::{AccessTokenSource, StaticToken, TokenCache, CLOUD_PLATFORM_SCOPE};
pub use error::{AnalysisError, AnalysisResult, AuthError, StorageError, StorageResult};
pub use prompt::{load_prompt, DEFAULT_PROMPT};
pub use storage::{clip_object_key, upload_object_key, GcsClient, GcsConfig, ObjectStore, StoredObject};
pub use vertex::{parse_highlights_text, HighlightAnalyzer, VertexConfig, VertexGeminiClient, VideoReference};

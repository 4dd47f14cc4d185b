//! Cloud error types.

use hlgen_models::HighlightError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Failure to obtain an OAuth access token.
#[derive(Debug, Clone, Error)]
#[error("Authentication failed: {0}")]
pub struct AuthError(pub String);

impl AuthError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors that can occur while moving files to Cloud Storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Upload failed ({status}): {message}")]
    UploadFailed { status: u16, message: String },

    #[error("Bucket unavailable ({status}): {message}")]
    BucketUnavailable { status: u16, message: String },

    #[error("Invalid response from storage: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn upload_failed(status: u16, msg: impl Into<String>) -> Self {
        Self::UploadFailed {
            status,
            message: msg.into(),
        }
    }

    /// HTTP status reported by the storage API, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            StorageError::UploadFailed { status, .. } | StorageError::BucketUnavailable { status, .. } => Some(*status),
            StorageError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Errors that can occur while asking the model for highlights.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to configure analysis client: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Model request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Model returned no content: {0}")]
    EmptyResponse(String),

    #[error("Model response is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Model response has no \"highlights\" array")]
    MissingHighlights,

    #[error("Malformed highlight in model response: {0}")]
    MalformedDescriptor(String),

    #[error(transparent)]
    Highlights(#[from] HighlightError),
}

impl AnalysisError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn request_failed(status: u16, msg: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: msg.into(),
        }
    }

    /// True when the model answered but the answer could not be used.
    ///
    /// These are recoverable from the user's point of view: the same video
    /// can simply be analyzed again.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::EmptyResponse(_)
                | AnalysisError::MalformedJson(_)
                | AnalysisError::MissingHighlights
                | AnalysisError::MalformedDescriptor(_)
                | AnalysisError::Highlights(_)
        )
    }

    /// HTTP status reported by the model API, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AnalysisError::RequestFailed { status, .. } => Some(*status),
            AnalysisError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

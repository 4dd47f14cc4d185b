//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hlgen_cloud::{AnalysisError, StorageError};
use hlgen_models::UploadRejection;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Upload(#[from] UploadRejection),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upload(rejection) => match rejection {
                UploadRejection::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                UploadRejection::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                UploadRejection::MissingFile | UploadRejection::Empty => StatusCode::BAD_REQUEST,
            },
            ApiError::Storage(_) => StatusCode::BAD_GATEWAY,
            ApiError::Analysis(e) if e.is_parse_error() => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Analysis(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "session_busy",
            ApiError::Upload(UploadRejection::TooLarge { .. }) => "upload_too_large",
            ApiError::Upload(UploadRejection::UnsupportedFormat(_)) => "unsupported_format",
            ApiError::Upload(_) => "missing_file",
            ApiError::Storage(_) => "storage_error",
            ApiError::Analysis(e) if e.is_parse_error() => "analysis_parse_error",
            ApiError::Analysis(_) => "analysis_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self, hide_internal: bool) -> String {
        match self {
            ApiError::Internal(_) if hide_internal => "An internal error occurred".to_string(),
            ApiError::Upload(rejection) => rejection.to_string(),
            ApiError::Analysis(e) if e.is_parse_error() => {
                format!("Could not read the highlights returned by the model, please try again. ({})", e)
            }
            _ => self.to_string(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Attached to error responses whose detail must not leave a production
/// deployment. `redact_internal_errors` swaps the body for this one.
#[derive(Debug, Clone)]
pub struct RedactedError {
    pub detail: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let detail = self.user_message(false);
        let redacted = self.user_message(true);

        let mut response = (
            status,
            Json(ErrorResponse {
                code: Some(code.to_string()),
                detail: detail.clone(),
            }),
        )
            .into_response();
        if redacted != detail {
            response.extensions_mut().insert(RedactedError { detail: redacted, code });
        }
        response
    }
}

//! Upload ingress: stream a multipart video field to the session directory.
//!
//! Format and size are checked here, before anything talks to the cloud.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use hlgen_models::{sanitize_file_name, UploadPolicy, UploadRejection};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Name of the multipart field carrying the video.
pub const VIDEO_FIELD: &str = "video";

/// A video written to local disk.
#[derive(Debug, Clone)]
pub struct UploadedVideo {
    /// Sanitized original file name
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

fn multipart_error(err: MultipartError, policy: &UploadPolicy) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        reject(UploadRejection::TooLarge {
            max_bytes: policy.max_bytes,
        })
    } else {
        ApiError::bad_request(format!("Invalid multipart request: {}", err.body_text()))
    }
}

fn reject(rejection: UploadRejection) -> ApiError {
    metrics::record_upload_rejected(match &rejection {
        UploadRejection::TooLarge { .. } => "too_large",
        UploadRejection::UnsupportedFormat(_) => "unsupported_format",
        UploadRejection::MissingFile => "missing_file",
        UploadRejection::Empty => "empty",
    });
    ApiError::Upload(rejection)
}

/// Read the `video` field of a multipart request into the file produced by
/// `dest` (given the sanitized file name).
pub async fn receive_video<F>(multipart: &mut Multipart, policy: &UploadPolicy, dest: F) -> ApiResult<UploadedVideo>
where
    F: FnOnce(&str) -> PathBuf,
{
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(reject(UploadRejection::MissingFile)),
            Err(e) => return Err(multipart_error(e, policy)),
        };

        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            return Err(reject(UploadRejection::MissingFile));
        }
        policy
            .check_format(&original, field.content_type())
            .map_err(reject)?;

        let file_name = sanitize_file_name(&original);
        let path = dest(&file_name);

        let size_bytes = match write_field(field, &path, policy).await {
            Ok(size) => size,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove rejected upload {}: {}", path.display(), rm);
                    }
                }
                return Err(e);
            }
        };

        debug!(file_name = %file_name, size_bytes, "Upload received");
        return Ok(UploadedVideo {
            file_name,
            path,
            size_bytes,
        });
    }
}

async fn write_field(mut field: Field<'_>, path: &Path, policy: &UploadPolicy) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create upload file: {}", e)))?;

    let mut size: u64 = 0;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e, policy)),
        };

        size += chunk.len() as u64;
        policy.check_size(size).map_err(reject)?;

        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to write upload: {}", e)))?;
    }

    file.flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to write upload: {}", e)))?;

    if size == 0 {
        return Err(reject(UploadRejection::Empty));
    }
    Ok(size)
}

//! Upload validation policy.

use thiserror::Error;

/// Default upload cap in megabytes.
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 200;

/// The only accepted container.
pub const VIDEO_EXTENSION: &str = "mp4";

/// MIME type of accepted uploads.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Why an upload was refused. Raised before any cloud call is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadRejection {
    #[error("No video file was provided")]
    MissingFile,

    #[error("The uploaded file is empty")]
    Empty,

    #[error("Unsupported format: {0}. Please upload an MP4 video")]
    UnsupportedFormat(String),

    #[error("File too large. Maximum file size is {}MB", .max_bytes / (1024 * 1024))]
    TooLarge { max_bytes: u64 },
}

/// Size and format limits for uploaded videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_megabytes(DEFAULT_MAX_UPLOAD_MB)
    }
}

impl UploadPolicy {
    pub fn from_megabytes(mb: u64) -> Self {
        Self {
            max_bytes: mb * 1024 * 1024,
        }
    }

    /// Check the file name and declared content type of an upload.
    ///
    /// Browsers sometimes send `application/octet-stream` for video files, so
    /// that type is accepted when the extension is right.
    pub fn check_format(&self, file_name: &str, content_type: Option<&str>) -> Result<(), UploadRejection> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        if extension != VIDEO_EXTENSION {
            return Err(UploadRejection::UnsupportedFormat(if extension.is_empty() {
                file_name.to_string()
            } else {
                format!(".{}", extension)
            }));
        }

        match content_type.map(|c| c.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()) {
            None => Ok(()),
            Some(ct) if ct.is_empty() || ct == VIDEO_CONTENT_TYPE || ct == "application/octet-stream" => Ok(()),
            Some(ct) => Err(UploadRejection::UnsupportedFormat(ct)),
        }
    }

    /// Check a byte count against the cap.
    pub fn check_size(&self, size_bytes: u64) -> Result<(), UploadRejection> {
        if size_bytes > self.max_bytes {
            return Err(UploadRejection::TooLarge {
                max_bytes: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// Sanitize an uploaded file name for use in object keys.
///
/// Keeps ASCII alphanumerics, `-` and `_`, joins words with `_`, lowercases
/// and limits the stem to 50 characters. The extension is preserved.
pub fn sanitize_file_name(name: &str) -> String {
    // Browsers on Windows may send a full path
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext.to_ascii_lowercase())),
        _ => (name, None),
    };

    let stem: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
        .chars()
        .take(50)
        .collect();
    let stem = if stem.is_empty() { "video".to_string() } else { stem };

    match extension {
        Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => format!("{}.{}", stem, ext),
        _ => stem,
    }
}

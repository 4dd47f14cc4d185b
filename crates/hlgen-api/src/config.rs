//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use hlgen_models::upload::DEFAULT_MAX_UPLOAD_MB;
use hlgen_models::UploadPolicy;
use thiserror::Error;

/// Slack on top of the upload cap for multipart framing.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// GCP project (Vertex AI)
    pub gcp_project: String,
    /// Cloud Storage bucket
    pub bucket_name: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Upload cap in megabytes
    pub max_upload_mb: u64,
    /// Root directory for session working directories
    pub work_dir: PathBuf,
    /// Idle session lifetime
    pub session_ttl: Duration,
    /// Vertex AI region
    pub vertex_location: String,
    /// Gemini model id
    pub gemini_model: String,
    /// Model request timeout
    pub analysis_timeout: Duration,
    /// Instruction template override
    pub prompt_file: Option<PathBuf>,
    /// Upload objects with the publicRead ACL
    pub gcs_public_read: bool,
    /// Upload extracted clips to the bucket
    pub upload_clips: bool,
    /// Re-encode clips instead of stream copy
    pub clip_reencode: bool,
    /// Per-clip ffmpeg timeout in seconds
    pub ffmpeg_timeout_secs: u64,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Environment (development/production)
    pub environment: String,
    /// Expose /metrics
    pub metrics_enabled: bool,
}

impl AppConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        fn parsed<T: std::str::FromStr>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
            match value {
                None => Ok(default),
                Some(v) => v.parse().map_err(|_| ConfigError::Invalid { var, value: v }),
            }
        }

        fn flag(var: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
            match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
                None => Ok(default),
                Some("true" | "1" | "yes" | "on") => Ok(true),
                Some("false" | "0" | "no" | "off") => Ok(false),
                Some(_) => Err(ConfigError::Invalid {
                    var,
                    value: value.unwrap_or_default(),
                }),
            }
        }

        let max_upload_mb = parsed("MAX_UPLOAD_MB", get("MAX_UPLOAD_MB"), DEFAULT_MAX_UPLOAD_MB)?;
        if max_upload_mb == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_UPLOAD_MB",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            gcp_project: required("GCP_PROJECT")?,
            bucket_name: required("GCP_BUCKET_NAME")?,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("PORT", get("PORT"), 8080)?,
            max_upload_mb,
            work_dir: get("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("hlgen")),
            session_ttl: Duration::from_secs(parsed("SESSION_TTL_SECS", get("SESSION_TTL_SECS"), 3600)?),
            vertex_location: get("VERTEX_LOCATION").unwrap_or_else(|| "us-central1".to_string()),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            analysis_timeout: Duration::from_secs(parsed("ANALYSIS_TIMEOUT_SECS", get("ANALYSIS_TIMEOUT_SECS"), 600)?),
            prompt_file: get("PROMPT_FILE").map(PathBuf::from),
            gcs_public_read: flag("GCS_PUBLIC_READ", get("GCS_PUBLIC_READ"), false)?,
            upload_clips: flag("UPLOAD_CLIPS", get("UPLOAD_CLIPS"), true)?,
            clip_reencode: flag("CLIP_REENCODE", get("CLIP_REENCODE"), false)?,
            ffmpeg_timeout_secs: parsed("FFMPEG_TIMEOUT_SECS", get("FFMPEG_TIMEOUT_SECS"), 600)?,
            cors_origins: get("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_else(|| vec!["*".to_string()]),
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            metrics_enabled: flag("METRICS_ENABLED", get("METRICS_ENABLED"), true)?,
        })
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::from_megabytes(self.max_upload_mb)
    }

    /// Request body limit for upload routes.
    pub fn max_body_bytes(&self) -> usize {
        self.upload_policy().max_bytes as usize + MULTIPART_OVERHEAD_BYTES
    }
}

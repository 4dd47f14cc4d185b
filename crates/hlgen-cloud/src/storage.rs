//! Cloud Storage bridge.
//!
//! Uploads go through the JSON API's simple media upload, streaming the file
//! body from disk. Every stored object is addressed three ways: its key, the
//! `gs://` URI the model reads from, and a public HTTPS URL.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::auth::AccessTokenSource;
use crate::error::{StorageError, StorageResult};
use crate::metrics::record_request;

/// Default JSON API endpoint.
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// A file that now lives in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object key within the bucket
    pub key: String,
    /// `gs://bucket/key`
    pub uri: String,
    /// `https://storage.googleapis.com/bucket/key`
    pub url: String,
    /// Size reported by the storage API
    pub size_bytes: u64,
}

/// Durable object storage for uploads and clips.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file to `key`.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<StoredObject>;

    /// Check that the bucket is reachable with the current credentials.
    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// First eight alphanumeric characters of a session id.
fn session_prefix(session_id: &str) -> String {
    session_id.chars().filter(|c| c.is_ascii_alphanumeric()).take(8).collect()
}

/// Object key for an uploaded source video:
/// `uploads/{YYYYmmdd_HHMMSS}_{session prefix}_{name}`.
pub fn upload_object_key(session_id: &str, file_name: &str, at: DateTime<Utc>) -> String {
    format!("uploads/{}_{}_{}", at.format("%Y%m%d_%H%M%S"), session_prefix(session_id), file_name)
}

/// Object key for an extracted clip:
/// `highlights/{YYYYmmdd_HHMMSS}_{session prefix}_{file}`.
pub fn clip_object_key(session_id: &str, file_name: &str, at: DateTime<Utc>) -> String {
    format!("highlights/{}_{}_{}", at.format("%Y%m%d_%H%M%S"), session_prefix(session_id), file_name)
}

/// Cloud Storage client configuration.
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// Bucket name
    pub bucket: String,
    /// Apply the `publicRead` predefined ACL to uploaded objects
    pub public_read: bool,
    /// JSON API endpoint
    pub endpoint: String,
    /// Base for public object URLs
    pub public_base_url: String,
    /// Request timeout (uploads of large files need a generous one)
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl GcsConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            public_read: false,
            endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            public_base_url: DEFAULT_STORAGE_ENDPOINT.to_string(),
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_public_read(mut self, public_read: bool) -> Self {
        self.public_read = public_read;
        self
    }

    /// Point at an emulator or mock server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

/// Object resource returned by the JSON API.
#[derive(Debug, Deserialize)]
struct GcsObject {
    name: String,
    bucket: String,
    #[serde(default)]
    size: Option<String>,
}

/// Cloud Storage JSON API client.
#[derive(Clone)]
pub struct GcsClient {
    http: Client,
    config: GcsConfig,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GcsClient {
    pub fn new(config: GcsConfig, tokens: Arc<dyn AccessTokenSource>) -> StorageResult<Self> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::config_error("Bucket name cannot be empty"));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("hlgen-cloud/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config, tokens })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// `gs://bucket/key`
    pub fn gs_uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.config.bucket, key)
    }

    /// Public HTTPS URL of an object.
    pub fn public_url(&self, key: &str) -> String {
        let encoded: Vec<String> = key.split('/').map(|s| urlencoding::encode(s).into_owned()).collect();
        format!("{}/{}/{}", self.config.public_base_url, self.config.bucket, encoded.join("/"))
    }

    fn upload_url(&self, key: &str) -> String {
        let mut url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.config.endpoint,
            urlencoding::encode(&self.config.bucket),
            urlencoding::encode(key)
        );
        if self.config.public_read {
            url.push_str("&predefinedAcl=publicRead");
        }
        url
    }

    async fn send_upload(&self, url: &str, path: &Path, size: u64, content_type: &str, token: &str) -> StorageResult<reqwest::Response> {
        let file = tokio::fs::File::open(path).await?;
        Ok(self
            .http
            .post(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::from(file))
            .send()
            .await?)
    }

    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<StoredObject> {
        let size = tokio::fs::metadata(path).await?.len();
        let url = self.upload_url(key);

        let token = self.tokens.access_token().await?;
        let mut response = self.send_upload(&url, path, size, content_type, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Storage rejected access token, refreshing and resending once");
            self.tokens.invalidate().await;
            let token = self.tokens.access_token().await?;
            response = self.send_upload(&url, path, size, content_type, &token).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::upload_failed(status.as_u16(), body));
        }

        let object: GcsObject = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
        debug!(bucket = %object.bucket, name = %object.name, "Object stored");

        Ok(StoredObject {
            uri: self.gs_uri(&object.name),
            url: self.public_url(&object.name),
            size_bytes: object.size.and_then(|s| s.parse().ok()).unwrap_or(size),
            key: object.name,
        })
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<StoredObject> {
        let span = info_span!("gcs_upload", bucket = %self.config.bucket, key = %key);
        let start = Instant::now();

        let result = self.upload(path, key, content_type).instrument(span).await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request("storage", "upload", status, start.elapsed().as_secs_f64());

        if let Ok(object) = &result {
            info!("Uploaded {} to {} ({} bytes)", path.display(), object.uri, object.size_bytes);
        }
        result
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        let url = format!(
            "{}/storage/v1/b/{}?fields=name",
            self.config.endpoint,
            urlencoding::encode(&self.config.bucket)
        );
        let token = self.tokens.access_token().await?;
        let start = Instant::now();
        let response = self.http.get(&url).bearer_auth(&token).send().await?;
        let status = response.status();
        record_request("storage", "bucket_get", status.as_u16(), start.elapsed().as_secs_f64());

        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::BucketUnavailable {
                status: status.as_u16(),
                message: body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use chrono::TimeZone;

    fn client(config: GcsConfig) -> GcsClient {
        GcsClient::new(config, Arc::new(StaticToken("token".to_string()))).unwrap()
    }

    #[test]
    fn test_object_keys() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            upload_object_key("5f1c2d3e-aaaa-bbbb-cccc-000000000000", "match.mp4", at),
            "uploads/20240309_140507_5f1c2d3e_match.mp4"
        );
        assert_eq!(
            clip_object_key("5f1c2d3e-aaaa-bbbb-cccc-000000000000", "highlight_1.mp4", at),
            "highlights/20240309_140507_5f1c2d3e_highlight_1.mp4"
        );
    }

    #[test]
    fn test_uris() {
        let c = client(GcsConfig::new("my-bucket"));
        assert_eq!(c.bucket(), "my-bucket");
        assert_eq!(c.gs_uri("uploads/a.mp4"), "gs://my-bucket/uploads/a.mp4");
        assert_eq!(
            c.public_url("uploads/a b.mp4"),
            "https://storage.googleapis.com/my-bucket/uploads/a%20b.mp4"
        );
    }

    #[test]
    fn test_upload_url() {
        let c = client(GcsConfig::new("b").with_endpoint("http://localhost:9000/"));
        assert_eq!(
            c.upload_url("uploads/x.mp4"),
            "http://localhost:9000/upload/storage/v1/b/b/o?uploadType=media&name=uploads%2Fx.mp4"
        );

        let c = client(GcsConfig::new("b").with_public_read(true));
        assert!(c.upload_url("k").ends_with("&predefinedAcl=publicRead"));
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let result = GcsClient::new(GcsConfig::new(" "), Arc::new(StaticToken("t".to_string())));
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}

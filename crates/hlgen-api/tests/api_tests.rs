//! Router tests with stubbed cloud services and clip extraction.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use hlgen_api::{create_router, AppConfig, AppState, Pipeline};
use hlgen_cloud::{
    parse_highlights_text, AnalysisResult, HighlightAnalyzer, ObjectStore, StorageError, StorageResult, StoredObject,
    VideoReference,
};
use hlgen_media::{ClipExtractor, ExtractedClip, MediaResult};
use hlgen_models::{ClipRange, HighlightsResponse, SessionId};
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "hlgen-test-boundary";

#[derive(Default)]
struct StubStore {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ObjectStore for StubStore {
    async fn put_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<StoredObject> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StorageError::upload_failed(403, "bucket access denied"));
        }
        let size_bytes = tokio::fs::metadata(path).await?.len();
        Ok(StoredObject {
            key: key.to_string(),
            uri: format!("gs://test-bucket/{}", key),
            url: format!("https://storage.googleapis.com/test-bucket/{}", key),
            size_bytes,
        })
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        if self.fail {
            Err(StorageError::BucketUnavailable {
                status: 403,
                message: "denied".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Answers every request with a fixed model response text.
struct StubAnalyzer {
    calls: AtomicUsize,
    response: String,
}

impl StubAnalyzer {
    fn new(response: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response: response.to_string(),
        }
    }
}

#[async_trait]
impl HighlightAnalyzer for StubAnalyzer {
    async fn analyze(&self, video: &VideoReference) -> AnalysisResult<HighlightsResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(video.uri.starts_with("gs://test-bucket/uploads/"));
        parse_highlights_text(&self.response)
    }
}

#[derive(Default)]
struct StubExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl ClipExtractor for StubExtractor {
    async fn extract(&self, _source: &Path, range: &ClipRange, output: &Path) -> MediaResult<ExtractedClip> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(output, b"clip-bytes").await?;
        Ok(ExtractedClip {
            path: output.to_path_buf(),
            size_bytes: 10,
            duration_secs: Some(range.duration_secs()),
        })
    }
}

const THREE_HIGHLIGHTS: &str = r#"{"highlights": [
    {"highlight_number": 1, "start_time": "00:02", "end_time": "00:10", "reason": "Opening goal", "brief_description": "Early strike"},
    {"highlight_number": 2, "start_time": "01:75", "end_time": "02:10", "reason": "Bad timestamp", "brief_description": "Broken"},
    {"highlight_number": 3, "start_time": "03:00", "end_time": "03:30", "reason": "Late winner", "brief_description": "Winner"}
]}"#;

struct TestApp {
    router: Router,
    state: AppState,
    store: Arc<StubStore>,
    analyzer: Arc<StubAnalyzer>,
    extractor: Arc<StubExtractor>,
    _work_dir: tempfile::TempDir,
}

fn config(work_dir: &Path, max_upload_mb: &str) -> AppConfig {
    let work_dir = work_dir.display().to_string();
    let max_upload_mb = max_upload_mb.to_string();
    AppConfig::from_lookup(|key| match key {
        "GCP_PROJECT" => Some("test-project".to_string()),
        "GCP_BUCKET_NAME" => Some("test-bucket".to_string()),
        "WORK_DIR" => Some(work_dir.clone()),
        "MAX_UPLOAD_MB" => Some(max_upload_mb.clone()),
        _ => None,
    })
    .unwrap()
}

fn app_with(store: StubStore, model_response: &str, max_upload_mb: &str) -> TestApp {
    let work_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store);
    let analyzer = Arc::new(StubAnalyzer::new(model_response));
    let extractor = Arc::new(StubExtractor::default());

    let pipeline = Pipeline::new(store.clone(), analyzer.clone(), extractor.clone()).with_clip_upload(false);
    let state = AppState::with_services(config(work_dir.path(), max_upload_mb), store.clone(), pipeline);

    TestApp {
        router: create_router(state.clone(), None),
        state,
        store,
        analyzer,
        extractor,
        _work_dir: work_dir,
    }
}

fn app(model_response: &str) -> TestApp {
    app_with(StubStore::default(), model_response, "200")
}

fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn send_json(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn create_session(app: &TestApp) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/api/sessions")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send_json(app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    json["session_id"].as_str().unwrap().to_string()
}

fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

#[tokio::test]
async fn test_health() {
    let app = app(THREE_HIGHLIGHTS);
    let (status, json) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");

    let (status, _) = send_json(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_ready_reflects_bucket() {
    let app = app(THREE_HIGHLIGHTS);
    let (status, json) = send_json(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["checks"]["storage"]["status"], "ok");

    let failing = app_with(
        StubStore {
            fail: true,
            ..Default::default()
        },
        THREE_HIGHLIGHTS,
        "200",
    );
    let (status, json) = send_json(&failing, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_landing_page() {
    let app = app(THREE_HIGHLIGHTS);
    let (status, headers, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("Maximum file size is 200MB"));
    assert!(html.contains(r#"action="/upload""#));
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_one_bad_timestamp_yields_n_minus_one_clips() {
    let app = app(THREE_HIGHLIGHTS);
    let id = create_session(&app).await;

    let body = multipart_body("video", "Cup Final.mp4", "video/mp4", b"not really a video");
    let (status, json) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["session_id"], id.as_str());
    assert_eq!(json["clips_ready"], 2);
    assert_eq!(json["clips_failed"], 1);
    assert_eq!(json["video"]["file_name"], "cup_final.mp4");
    assert!(json["video"]["gcs_uri"]
        .as_str()
        .unwrap()
        .starts_with("gs://test-bucket/uploads/"));

    let highlights = json["highlights"].as_array().unwrap();
    assert_eq!(highlights.len(), 3);
    assert_eq!(highlights[0]["clip"]["status"], "ready");
    assert_eq!(highlights[0]["clip"]["file_name"], "highlight_1.mp4");
    assert_eq!(highlights[0]["duration_secs"], 8.0);
    assert_eq!(highlights[1]["clip"]["status"], "failed");
    assert!(highlights[1]["clip"]["error"].as_str().unwrap().contains("Invalid timestamps"));

    assert_eq!(calls(&app.store.calls), 1);
    assert_eq!(calls(&app.analyzer.calls), 1);
    assert_eq!(calls(&app.extractor.calls), 2);

    // The report stays on the session
    let (status, json) = send_json(&app, get(&format!("/api/sessions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["clips_ready"], 2);
}

#[tokio::test]
async fn test_oversized_upload_rejected_before_cloud_calls() {
    let app = app_with(StubStore::default(), THREE_HIGHLIGHTS, "1");
    let id = create_session(&app).await;

    let data = vec![0u8; 1024 * 1024 + 512 * 1024];
    let body = multipart_body("video", "big.mp4", "video/mp4", &data);
    let (status, json) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "upload_too_large");
    assert_eq!(json["detail"], "File too large. Maximum file size is 1MB");
    assert_eq!(calls(&app.store.calls), 0);
    assert_eq!(calls(&app.analyzer.calls), 0);
    assert_eq!(calls(&app.extractor.calls), 0);
}

#[tokio::test]
async fn test_wrong_format_rejected_before_cloud_calls() {
    let app = app(THREE_HIGHLIGHTS);
    let id = create_session(&app).await;

    let body = multipart_body("video", "clip.avi", "video/x-msvideo", b"data");
    let (status, json) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["code"], "unsupported_format");

    let body = multipart_body("video", "clip.mp4", "image/png", b"data");
    let (status, _) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    assert_eq!(calls(&app.store.calls), 0);
    assert_eq!(calls(&app.analyzer.calls), 0);
}

#[tokio::test]
async fn test_missing_or_empty_file() {
    let app = app(THREE_HIGHLIGHTS);
    let id = create_session(&app).await;

    let body = multipart_body("attachment", "clip.mp4", "video/mp4", b"data");
    let (status, json) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "missing_file");

    let body = multipart_body("video", "clip.mp4", "video/mp4", b"");
    let (status, _) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/sessions/{id}/video"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, json) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "bad_request");

    assert_eq!(calls(&app.store.calls), 0);
}

#[tokio::test]
async fn test_malformed_model_output_is_422() {
    let app = app("Here are your highlights: 1. the goal");
    let id = create_session(&app).await;

    let body = multipart_body("video", "match.mp4", "video/mp4", b"data");
    let (status, json) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "analysis_parse_error");
    assert_eq!(calls(&app.extractor.calls), 0);

    // No report was stored, the session is free for another try
    let (status, _) = send_json(&app, get(&format!("/api/sessions/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_highlights_key_is_422() {
    let app = app(r#"{"clips": []}"#);
    let id = create_session(&app).await;

    let body = multipart_body("video", "match.mp4", "video/mp4", b"data");
    let (status, json) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["detail"].as_str().unwrap().contains("highlights"));
}

#[tokio::test]
async fn test_storage_failure_is_502() {
    let app = app_with(
        StubStore {
            fail: true,
            ..Default::default()
        },
        THREE_HIGHLIGHTS,
        "200",
    );
    let id = create_session(&app).await;

    let body = multipart_body("video", "match.mp4", "video/mp4", b"data");
    let (status, json) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "storage_error");
    assert_eq!(calls(&app.analyzer.calls), 0);
}

#[tokio::test]
async fn test_busy_session_is_409() {
    let app = app(THREE_HIGHLIGHTS);
    let id = create_session(&app).await;

    let session = app
        .state
        .sessions
        .get(&SessionId::parse(&id).unwrap())
        .await
        .unwrap();
    assert!(session.try_begin());

    let body = multipart_body("video", "match.mp4", "video/mp4", b"data");
    let (status, json) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "session_busy");
    assert_eq!(calls(&app.store.calls), 0);

    session.finish();
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = app(THREE_HIGHLIGHTS);

    let (status, json) = send_json(&app, get("/api/sessions/550e8400-e29b-41d4-a716-446655440000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");

    let (status, _) = send_json(&app, get("/api/sessions/not-a-session")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, get("/sessions/550e8400-e29b-41d4-a716-446655440000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clip_serving() {
    let app = app(THREE_HIGHLIGHTS);
    let id = create_session(&app).await;
    let body = multipart_body("video", "match.mp4", "video/mp4", b"data");
    let (status, _) = send_json(&app, upload_request(&format!("/api/sessions/{id}/video"), body)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, body) = send(&app, get(&format!("/api/sessions/{id}/clips/highlight_1.mp4"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"clip-bytes");
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");

    // Failed clip, unknown name, traversal attempt
    for name in ["highlight_2.mp4", "highlight_9.mp4", "..%2Finput_match.mp4"] {
        let (status, _, _) = send(&app, get(&format!("/api/sessions/{id}/clips/{name}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{name}");
    }
}

#[tokio::test]
async fn test_delete_session() {
    let app = app(THREE_HIGHLIGHTS);
    let id = create_session(&app).await;

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/sessions/{id}"))
            .body(Body::empty())
            .unwrap()
    };
    let (status, _, _) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.state.sessions.is_empty().await);
}

#[tokio::test]
async fn test_html_form_flow() {
    let app = app(THREE_HIGHLIGHTS);

    let body = multipart_body("video", "match.mp4", "video/mp4", b"data");
    let (status, headers, _) = send(&app, upload_request("/upload", body)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let location = headers[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("/sessions/"));

    let (status, _, body) = send(&app, get(&location)).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("#1 - Early strike"));
    assert!(html.contains("Duration: 8 seconds"));
    assert!(html.contains("Clip unavailable"));

    let (_, _, body) = send(&app, get(&format!("{location}?view=clips"))).await;
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("#3 - Winner"));
    assert!(!html.contains("#2 - Broken"));

    let (_, _, body) = send(&app, get(&format!("{location}?view=list"))).await;
    let html = String::from_utf8(body).unwrap();
    assert_eq!(html.matches("<details>").count(), 3);
}

#[tokio::test]
async fn test_html_form_error_banner() {
    let app = app(THREE_HIGHLIGHTS);

    let body = multipart_body("video", "movie.mov", "video/quicktime", b"data");
    let (status, _, body) = send(&app, upload_request("/upload", body)).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains(r#"role="alert""#));
    assert!(html.contains("Please upload an MP4 video"));

    // The failed session is not kept around
    assert!(app.state.sessions.is_empty().await);
    assert_eq!(calls(&app.store.calls), 0);
}

//! Prometheus metrics for the web service.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "hlgen_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "hlgen_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "hlgen_http_requests_in_flight";

    // Pipeline metrics
    pub const PIPELINE_RUNS_TOTAL: &str = "hlgen_pipeline_runs_total";
    pub const STAGE_DURATION_SECONDS: &str = "hlgen_pipeline_stage_duration_seconds";
    pub const CLIPS_TOTAL: &str = "hlgen_clips_total";
    pub const UPLOADS_REJECTED_TOTAL: &str = "hlgen_uploads_rejected_total";

    // Sessions
    pub const SESSIONS_ACTIVE: &str = "hlgen_sessions_active";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record how long one pipeline stage took (`store`, `analyze`, `extract`).
pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

/// Record the end of a pipeline run (`completed` or `failed`).
pub fn record_pipeline_run(outcome: &'static str) {
    counter!(names::PIPELINE_RUNS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record one clip outcome (`ready` or `failed`).
pub fn record_clip(outcome: &'static str) {
    counter!(names::CLIPS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record an upload refused by validation.
pub fn record_upload_rejected(reason: &'static str) {
    counter!(names::UPLOADS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Update the live sessions gauge.
pub fn set_active_sessions(count: usize) {
    gauge!(names::SESSIONS_ACTIVE).set(count as f64);
}

/// Route template for the `path` label, so ids and clip names don't
/// create new series. Requests that matched no route share one label.
fn path_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = path_label(&request);
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn echo_label(request: Request<Body>, next: Next) -> Response<Body> {
        let label = path_label(&request);
        let mut response = next.run(request).await;
        response.headers_mut().insert("x-path-label", label.parse().unwrap());
        response
    }

    fn app() -> Router {
        let api = Router::new().route("/sessions/:session_id/clips/:clip_name", get(|| async { "clip" }));
        Router::new()
            .route("/sessions/:session_id", get(|| async { "page" }))
            .nest("/api", api)
            .layer(axum::middleware::from_fn(echo_label))
    }

    async fn label_for(uri: &str) -> (StatusCode, String) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let label = response.headers()["x-path-label"].to_str().unwrap().to_string();
        (response.status(), label)
    }

    #[tokio::test]
    async fn test_path_label_uses_route_template() {
        let (status, label) =
            label_for("/api/sessions/550e8400-e29b-41d4-a716-446655440000/clips/highlight_1.mp4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(label, "/api/sessions/:session_id/clips/:clip_name");

        let (_, label) = label_for("/sessions/550e8400-e29b-41d4-a716-446655440000").await;
        assert_eq!(label, "/sessions/:session_id");
    }

    #[tokio::test]
    async fn test_unknown_paths_share_one_label() {
        for uri in ["/wp-login.php", "/.env", "/api/nope/123"] {
            let (status, label) = label_for(uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(label, "unmatched");
        }
    }
}

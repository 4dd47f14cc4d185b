//! HTTP routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::{
    create_session, delete_session, get_clip, get_report, health, index, ready, results, upload_form, upload_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, redact_internal_errors, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let page_routes = Router::new()
        .route("/", get(index))
        .route("/upload", post(upload_form))
        .route("/sessions/:session_id", get(results));

    let api_routes = Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:session_id", get(get_report).delete(delete_session))
        .route("/sessions/:session_id/video", post(upload_video))
        .route("/sessions/:session_id/clips/:clip_name", get(get_clip));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(page_routes)
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Multipart reads past this limit fail with 413, reported as "file too large"
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes()))
        .layer(middleware::from_fn_with_state(state.config.clone(), redact_internal_errors))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

//! Session JSON API.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hlgen_models::{HighlightReport, SessionId};
use serde::Serialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::ingest::receive_video;
use crate::metrics;
use crate::session::Session;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

pub(crate) async fn find_session(state: &AppState, session_id: &str) -> ApiResult<Arc<Session>> {
    let id = SessionId::parse(session_id).ok_or_else(|| ApiError::not_found("Session not found"))?;
    state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| ApiError::not_found("Session not found"))
}

pub(crate) async fn new_session(state: &AppState) -> ApiResult<Arc<Session>> {
    let session = state
        .sessions
        .create()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session directory: {}", e)))?;
    metrics::set_active_sessions(state.sessions.len().await);
    Ok(session)
}

/// Receive the uploaded video into `session` and run the pipeline on it.
///
/// The session is claimed for the whole run; a concurrent upload to the
/// same session is refused rather than queued.
pub(crate) async fn process_upload(
    state: &AppState,
    session: &Arc<Session>,
    multipart: &mut Multipart,
) -> ApiResult<HighlightReport> {
    if !session.try_begin() {
        return Err(ApiError::conflict("A video is already being processed in this session"));
    }
    let _guard = scopeguard::guard(Arc::clone(session), |s| s.finish());

    let policy = state.config.upload_policy();
    let video = receive_video(multipart, &policy, |name| session.input_path(name)).await?;

    session
        .reset(Some(&video.path))
        .await
        .map_err(|e| ApiError::internal(format!("Failed to clear previous run: {}", e)))?;

    let report = state.pipeline.run(session, &video).await?;
    session.set_report(report.clone()).await;
    Ok(report)
}

/// Create an empty session.
pub async fn create_session(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    let session = new_session(&state).await?;
    info!(session_id = %session.id(), "Session created via API");
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id().to_string(),
        }),
    ))
}

/// Upload a video into a session and run the pipeline.
pub async fn upload_video(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<HighlightReport>> {
    let session = find_session(&state, &session_id).await?;
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let report = process_upload(&state, &session, &mut multipart).await?;
    Ok(Json(report))
}

/// Current report of a session.
pub async fn get_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<HighlightReport>> {
    let session = find_session(&state, &session_id).await?;
    session
        .report()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No video has been analyzed in this session yet"))
}

/// End a session and delete its working files.
pub async fn delete_session(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult<StatusCode> {
    let session = find_session(&state, &session_id).await?;
    if session.is_busy() {
        return Err(ApiError::conflict("A video is still being processed in this session"));
    }

    let id = session.id().clone();
    drop(session);
    state.sessions.remove(&id).await;
    metrics::set_active_sessions(state.sessions.len().await);
    Ok(StatusCode::NO_CONTENT)
}

/// Stream a ready clip file.
pub async fn get_clip(
    State(state): State<AppState>,
    Path((session_id, clip_name)): Path<(String, String)>,
    request: Request<Body>,
) -> ApiResult<Response> {
    let session = find_session(&state, &session_id).await?;

    // Only names recorded in the report are served
    let known = session
        .report()
        .await
        .is_some_and(|report| report.has_clip(&clip_name));
    if !known {
        return Err(ApiError::not_found("Clip not found"));
    }

    let path = session.clip_path(&clip_name);
    match ServeFile::new(path).oneshot(request).await {
        Ok(res) => Ok(res.into_response()),
        Err(err) => {
            error!("ServeFile error: {}", err);
            Err(ApiError::internal("Failed to read clip"))
        }
    }
}

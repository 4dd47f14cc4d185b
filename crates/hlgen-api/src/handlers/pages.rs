//! HTML pages: the upload form and the results views.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::handlers::sessions::{find_session, new_session, process_upload};
use crate::state::AppState;
use crate::views::{self, View};

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub view: View,
}

fn error_page(state: &AppState, err: &ApiError) -> Response {
    let message = err.user_message(state.config.is_production());
    (
        err.status_code(),
        Html(views::landing(Some(message.as_str()), state.config.max_upload_mb)),
    )
        .into_response()
}

/// Landing page with the upload form.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(views::landing(None, state.config.max_upload_mb))
}

/// Form submission: new session, full run, then redirect to the results.
pub async fn upload_form(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => return error_page(&state, &ApiError::bad_request(e.body_text())),
    };

    let session = match new_session(&state).await {
        Ok(s) => s,
        Err(e) => return error_page(&state, &e),
    };

    match process_upload(&state, &session, &mut multipart).await {
        Ok(_) => Redirect::to(&format!("/sessions/{}", session.id())).into_response(),
        Err(e) => {
            warn!(session_id = %session.id(), "Upload failed: {}", e);
            let id = session.id().clone();
            drop(session);
            state.sessions.remove(&id).await;
            error_page(&state, &e)
        }
    }
}

/// Results page for a session.
pub async fn results(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> Response {
    let session = match find_session(&state, &session_id).await {
        Ok(s) => s,
        Err(e) => return error_page(&state, &e),
    };

    match session.report().await {
        Some(report) => Html(views::results(&report, query.view)).into_response(),
        None if session.is_busy() => (
            StatusCode::ACCEPTED,
            Html(views::landing(
                Some("Your video is still being processed. Refresh this page in a moment."),
                state.config.max_upload_mb,
            )),
        )
            .into_response(),
        None => error_page(
            &state,
            &ApiError::not_found("No video has been analyzed in this session yet"),
        ),
    }
}

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use presence_core::activity::WeakActivity;

use super::blocking;
use crate::auth::Caller;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/app/availability/state: effective presence for the caller.
pub async fn get_state(
    State(app): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let view = blocking(move || app.tracker.get_state(&user.id, Utc::now())).await?;
    Ok(Json(serde_json::json!({
        "state": view.state,
        "session_id": view.session_id,
        "last_seen_at": view.last_seen_at,
        "inside_work_window": view.inside_work_window,
    })))
}

/// GET /api/app/availability/session: today's session, or `null`.
pub async fn get_session(
    State(app): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = blocking(move || app.tracker.get_session(&user.id, Utc::now())).await?;
    Ok(Json(serde_json::json!(session)))
}

/// POST /api/app/availability/start: start (or re-read) today's session.
pub async fn start(
    State(app): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let start = blocking(move || app.tracker.start_session(&user.id, Utc::now())).await?;
    Ok(Json(serde_json::json!({
        "state": start.state,
        "session_id": start.session_id,
        "late_start": start.late_start,
        "started_at": start.started_at,
        "window_ends_at": start.window_ends_at,
        "last_seen_at": start.last_seen_at,
        "already_started": start.already_started,
    })))
}

/// POST /api/app/availability/end: end today's session.
pub async fn end(
    State(app): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let end = blocking(move || app.tracker.end_session(&user.id, Utc::now())).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "ended_at": end.ended_at,
        "already_ended": end.already_ended,
    })))
}

/// POST /api/app/availability/still-here: weak "still here" signal.
///
/// Throttled calls answer 429; a call with no session today is a no-op.
pub async fn still_here(
    State(app): State<AppState>,
    Caller(user): Caller,
) -> Result<Response, AppError> {
    let outcome = blocking(move || app.tracker.record_weak_activity(&user.id, Utc::now())).await?;
    let response = match outcome {
        WeakActivity::Recorded { extended_until } => Json(serde_json::json!({
            "ok": true,
            "extended_until": extended_until,
        }))
        .into_response(),
        WeakActivity::Throttled => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "ok": false, "error": "Throttled" })),
        )
            .into_response(),
        WeakActivity::NoSession => {
            Json(serde_json::json!({ "ok": false, "reason": "no_session" })).into_response()
        }
    };
    Ok(response)
}

/// POST /api/app/availability/activity: verified work from the work-log
/// collaborator. Restores `available` with a fresh window.
pub async fn strong_activity(
    State(app): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let window = blocking(move || app.tracker.record_strong_activity(&user.id, Utc::now())).await?;
    Ok(Json(serde_json::json!({
        "ok": window.is_some(),
        "window_ends_at": window.map(|w| w.ends_at),
    })))
}

/// POST /api/app/heartbeat: client liveness; updates `last_seen_at`.
pub async fn heartbeat(
    State(app): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let seen = blocking(move || app.tracker.heartbeat(&user.id, Utc::now())).await?;
    Ok(Json(serde_json::json!({ "ok": true, "last_seen_at": seen })))
}

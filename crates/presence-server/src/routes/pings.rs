use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use presence_core::types::PingFilter;

use super::blocking;
use crate::auth::{AdminCaller, Caller};
use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct PingListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct CreatePingBody {
    pub target_user_id: String,
}

/// GET /api/admin/pings: every ping, newest first. `?status=open|responded|missed`.
pub async fn admin_list(
    State(app): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Query(query): Query<PingListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = match query.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(s) => Some(
            s.parse::<PingFilter>()
                .map_err(|e| AppError::bad_request(e.to_string()))?,
        ),
    };
    let pings = blocking(move || app.tracker.list_pings(&admin.id, filter)).await?;
    Ok(Json(serde_json::json!(pings)))
}

/// POST /api/admin/pings: ping an employee.
pub async fn create(
    State(app): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Json(body): Json<CreatePingBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let target = body.target_user_id.trim().to_string();
    if target.is_empty() {
        return Err(AppError::bad_request("target_user_id is required"));
    }
    let ping = blocking(move || app.tracker.create_ping(&admin.id, &target, Utc::now())).await?;
    Ok(Json(serde_json::json!({
        "id": ping.id,
        "from_user_id": ping.from_user_id,
        "target_user_id": ping.target_user_id,
        "sent_at": ping.sent_at,
        "sla_minutes": ping.sla_minutes,
        "deadline": ping.deadline(),
    })))
}

/// GET /api/app/pings: the caller's open pings.
pub async fn my_pings(
    State(app): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let pings = blocking(move || app.tracker.list_pings(&user.id, None)).await?;
    Ok(Json(serde_json::json!(pings)))
}

/// POST /api/app/pings/{id}/respond: answer a ping addressed to the caller.
pub async fn respond(
    State(app): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let answer = blocking(move || app.tracker.respond_ping(&id, &user.id, Utc::now())).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "already_responded": answer.already_responded,
        "responded_at": answer.ping.responded_at,
    })))
}

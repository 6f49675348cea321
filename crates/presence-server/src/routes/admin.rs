use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;

use super::blocking;
use crate::auth::AdminCaller;
use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default)]
    pub team_id: Option<String>,
}

/// GET /api/admin/availability: presence board for every active employee,
/// optionally narrowed with `?team_id=`.
pub async fn list_availability(
    State(app): State<AppState>,
    AdminCaller(_admin): AdminCaller,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let team = query.team_id.filter(|t| !t.is_empty());
    let rows = blocking(move || app.tracker.list_availability(team.as_deref(), Utc::now())).await?;
    Ok(Json(serde_json::json!(rows)))
}

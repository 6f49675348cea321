use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/cron/availability: run one decay sweep. Guarded by the cron
/// bearer middleware; intended for an external scheduler.
pub async fn run_sweep(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let report = tokio::task::spawn_blocking(move || app.tracker.run_sweep(Utc::now()))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "soft_away": report.soft_away,
        "away": report.away,
        "missed_pings": report.missed_pings,
        "errors": report.errors,
    })))
}

//! Request identity and the sweep endpoint's bearer guard.
//!
//! Identity comes from the upstream authentication proxy, which forwards the
//! signed-in user's id in the `x-presence-user` header. The role is always
//! read from the store, never from the request.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use presence_core::types::User;

use crate::state::AppState;

pub const USER_HEADER: &str = "x-presence-user";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unauthorized")]
    MissingIdentity,
    #[error("unauthorized")]
    UnknownUser,
    #[error("forbidden")]
    NotAdmin,
    #[error("identity lookup failed: {0}")]
    Lookup(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingIdentity | AuthError::UnknownUser => StatusCode::UNAUTHORIZED,
            AuthError::NotAdmin => StatusCode::FORBIDDEN,
            AuthError::Lookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// The authenticated user making the request.
#[derive(Debug, Clone)]
pub struct Caller(pub User);

/// An authenticated administrator.
#[derive(Debug, Clone)]
pub struct AdminCaller(pub User);

impl FromRequestParts<AppState> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, app: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingIdentity)?
            .to_string();

        let tracker = app.tracker.clone();
        let user = tokio::task::spawn_blocking(move || tracker.db().get_user(&user_id))
            .await
            .map_err(|e| AuthError::Lookup(format!("task join error: {e}")))?
            .map_err(|e| AuthError::Lookup(e.to_string()))?;

        match user {
            Some(user) if user.active => Ok(Caller(user)),
            _ => Err(AuthError::UnknownUser),
        }
    }
}

impl FromRequestParts<AppState> for AdminCaller {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, app: &AppState) -> Result<Self, Self::Rejection> {
        let Caller(user) = Caller::from_request_parts(parts, app).await?;
        if !user.is_admin() {
            return Err(AuthError::NotAdmin);
        }
        Ok(AdminCaller(user))
    }
}

/// Axum middleware guarding the sweep endpoint.
///
/// Passes only when `Authorization: Bearer <secret>` matches the configured
/// cron secret. With no secret configured every request is rejected.
pub async fn cron_auth_middleware(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match (app.cron_secret.as_deref(), presented) {
        (Some(secret), Some(token)) if token == secret => next.run(req).await,
        _ => Response::builder()
            .status(401)
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"error":"Unauthorized"}"#))
            .unwrap_or_else(|_| StatusCode::UNAUTHORIZED.into_response()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

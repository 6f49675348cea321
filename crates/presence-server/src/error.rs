use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use presence_core::error::PresenceError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 Bad Request errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain for input
/// problems that never reach the core (bad query parameters, bad bodies).
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }
}

pub(crate) fn status_for(e: &PresenceError) -> StatusCode {
    match e {
        PresenceError::OutsideWorkWindow
        | PresenceError::NoActiveSession
        | PresenceError::InvalidWorkTime(_)
        | PresenceError::InvalidTimezone(_) => StatusCode::BAD_REQUEST,
        PresenceError::PingNotFound(_) | PresenceError::UserNotFound(_) => StatusCode::NOT_FOUND,
        PresenceError::Forbidden => StatusCode::FORBIDDEN,
        PresenceError::PingMissed(_) => StatusCode::CONFLICT,
        PresenceError::InvalidConfig(_)
        | PresenceError::Store(_)
        | PresenceError::Io(_)
        | PresenceError::Yaml(_)
        | PresenceError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }

        let status = match self.0.downcast_ref::<PresenceError>() {
            Some(e) => status_for(e),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {:#}", self.0);
        }

        let mut body = serde_json::json!({ "error": self.0.to_string() });
        if matches!(
            self.0.downcast_ref::<PresenceError>(),
            Some(PresenceError::OutsideWorkWindow)
        ) {
            body["inside_work_window"] = serde_json::Value::Bool(false);
        }
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("outside work window: try again during working hours")]
    OutsideWorkWindow,

    #[error("no active session: start work first")]
    NoActiveSession,

    #[error("ping not found: {0}")]
    PingNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("forbidden")]
    Forbidden,

    #[error("ping {0} was already marked missed")]
    PingMissed(String),

    #[error("invalid work time '{0}': expected 24h HH:mm")]
    InvalidWorkTime(String),

    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PresenceError>;

/// Map any storage-layer failure into `PresenceError::Store`.
pub(crate) fn store_err<E: std::fmt::Display>(e: E) -> PresenceError {
    PresenceError::Store(e.to_string())
}

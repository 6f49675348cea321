use std::sync::Arc;

use presence_core::PresenceTracker;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub tracker: PresenceTracker,
    /// Bearer secret for the sweep endpoint. `None` rejects every call.
    pub cron_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(tracker: PresenceTracker, cron_secret: Option<String>) -> Self {
        Self {
            tracker,
            cron_secret: cron_secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }
}

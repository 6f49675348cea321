//! `PresenceTracker` ties the store, the tunables, and the notifier together.
//! Each concern adds its operations in its own module (`lifecycle`,
//! `activity`, `sweep`, `ping`); the read-side views live here.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::clock;
use crate::config::PresenceConfig;
use crate::db::PresenceDb;
use crate::engine::effective_state;
use crate::error::{PresenceError, Result};
use crate::notify::Notifier;
use crate::types::{AvailabilityState, Role, SessionSnapshot, User};

#[derive(Clone)]
pub struct PresenceTracker {
    db: Arc<PresenceDb>,
    config: Arc<PresenceConfig>,
    notifier: Notifier,
}

/// What a user (or their client) sees about their own presence right now.
#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    pub state: Option<AvailabilityState>,
    pub session_id: Option<Uuid>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub inside_work_window: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub late_start: bool,
    pub last_state: AvailabilityState,
    pub last_state_at: DateTime<Utc>,
    pub window_ends_at: Option<DateTime<Utc>>,
}

impl From<&SessionSnapshot> for SessionView {
    fn from(snap: &SessionSnapshot) -> Self {
        let s = &snap.session;
        Self {
            id: s.id,
            date: s.date,
            started_at: s.started_at,
            ended_at: s.ended_at,
            late_start: s.late_start,
            last_state: s.last_state,
            last_state_at: s.last_state_at,
            window_ends_at: snap.current_window().map(|w| w.ends_at),
        }
    }
}

/// One row of the admin availability board.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityRow {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub team_id: Option<String>,
    pub state: Option<AvailabilityState>,
    pub session_id: Option<Uuid>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub session_ended_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub work_start_time: Option<String>,
    pub work_end_time: Option<String>,
    pub timezone: Option<String>,
}

impl PresenceTracker {
    pub fn new(db: Arc<PresenceDb>, config: PresenceConfig, notifier: Notifier) -> Self {
        Self {
            db,
            config: Arc::new(config),
            notifier,
        }
    }

    pub fn db(&self) -> &PresenceDb {
        &self.db
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn require_user(&self, user_id: &str) -> Result<User> {
        self.db
            .get_user(user_id)?
            .ok_or_else(|| PresenceError::UserNotFound(user_id.to_string()))
    }

    /// Effective presence for `user_id` at `now`.
    pub fn get_state(&self, user_id: &str, now: DateTime<Utc>) -> Result<StateView> {
        let user = self.require_user(user_id)?;
        let date = clock::user_local_date(&user, now)?;
        let snapshot = self.db.read(|tx| tx.snapshot(&user.id, date))?;
        Ok(StateView {
            state: effective_state(snapshot.as_ref(), now),
            session_id: snapshot.as_ref().map(|s| s.session.id),
            last_seen_at: user.last_seen_at,
            inside_work_window: clock::is_inside_work_window(&user, now)?,
        })
    }

    /// Today's session for `user_id`, if one was started.
    pub fn get_session(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<SessionView>> {
        let user = self.require_user(user_id)?;
        let date = clock::user_local_date(&user, now)?;
        let snapshot = self.db.read(|tx| tx.snapshot(&user.id, date))?;
        Ok(snapshot.as_ref().map(SessionView::from))
    }

    /// Record that the user's client is connected. Returns the stored timestamp.
    pub fn heartbeat(&self, user_id: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.db.write(|tx| {
            let mut user = tx
                .user(user_id)?
                .ok_or_else(|| PresenceError::UserNotFound(user_id.to_string()))?;
            user.last_seen_at = Some(now);
            tx.put_user(&user)?;
            Ok(now)
        })
    }

    /// Presence of every active employee, optionally restricted to one team.
    pub fn list_availability(
        &self,
        team_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityRow>> {
        let mut rows = self.db.read(|tx| {
            let mut rows = Vec::new();
            for user in tx.users()? {
                if user.role != Role::Employee || !user.active {
                    continue;
                }
                if team_id.is_some() && user.team_id.as_deref() != team_id {
                    continue;
                }
                let date = match clock::user_local_date(&user, now) {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(user = %user.id, "{e}; listing with UTC date");
                        now.date_naive()
                    }
                };
                let snapshot = tx.snapshot(&user.id, date)?;
                rows.push(AvailabilityRow {
                    state: effective_state(snapshot.as_ref(), now),
                    session_id: snapshot.as_ref().map(|s| s.session.id),
                    session_started_at: snapshot.as_ref().map(|s| s.session.started_at),
                    session_ended_at: snapshot.as_ref().and_then(|s| s.session.ended_at),
                    user_id: user.id,
                    name: user.name,
                    email: user.email,
                    team_id: user.team_id,
                    last_seen_at: user.last_seen_at,
                    work_start_time: user.work_start_time,
                    work_end_time: user.work_end_time,
                    timezone: user.timezone,
                });
            }
            Ok(rows)
        })?;
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

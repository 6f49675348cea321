//! Start and end of the one-per-day presence session.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::clock;
use crate::engine::effective_state;
use crate::error::{PresenceError, Result};
use crate::tracker::PresenceTracker;
use crate::types::{
    AvailabilityEvent, AvailabilitySession, AvailabilityState, AvailabilityWindow, EventKind,
    SessionSnapshot,
};

#[derive(Debug, Clone, Serialize)]
pub struct SessionStart {
    pub session_id: Uuid,
    /// Effective state after the call; always `available` for a fresh start.
    pub state: AvailabilityState,
    pub late_start: bool,
    pub started_at: DateTime<Utc>,
    pub window_ends_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    /// True when today's session already existed and nothing was written.
    pub already_started: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEnd {
    pub ended_at: DateTime<Utc>,
    pub already_ended: bool,
}

enum Started {
    Created(SessionSnapshot),
    Existing(SessionSnapshot),
}

impl PresenceTracker {
    /// Start today's session for `user_id`.
    ///
    /// Fails with `OutsideWorkWindow` when `now` is outside the user's local
    /// work hours. A second call on the same local day returns the existing
    /// session untouched.
    pub fn start_session(&self, user_id: &str, now: DateTime<Utc>) -> Result<SessionStart> {
        let user = self.require_user(user_id)?;
        if !clock::is_inside_work_window(&user, now)? {
            return Err(PresenceError::OutsideWorkWindow);
        }
        let date = clock::user_local_date(&user, now)?;
        let late_start = clock::is_late_start(&user, now, self.config().grace_minutes)?;
        let window_minutes = self.config().dynamic_window_minutes(user.reliability_score);

        let outcome = self.db().write(|tx| {
            if let Some(existing) = tx.snapshot(&user.id, date)? {
                return Ok(Started::Existing(existing));
            }
            let session = AvailabilitySession {
                id: Uuid::new_v4(),
                user_id: user.id.clone(),
                date,
                started_at: now,
                ended_at: None,
                late_start,
                last_state: AvailabilityState::Available,
                last_state_at: now,
            };
            let window = AvailabilityWindow {
                id: Uuid::new_v4(),
                session_id: session.id,
                starts_at: now,
                ends_at: now + Duration::minutes(i64::from(window_minutes)),
            };
            tx.put_session(&session)?;
            tx.put_window(&window)?;
            tx.append_event(&AvailabilityEvent {
                id: Uuid::new_v4(),
                user_id: user.id.clone(),
                session_id: session.id,
                kind: EventKind::StartWork,
                created_at: now,
            })?;
            Ok(Started::Created(SessionSnapshot {
                session,
                windows: vec![window],
            }))
        })?;

        let (snapshot, already_started) = match outcome {
            Started::Created(snap) => {
                tracing::info!(
                    user = %user.id,
                    %date,
                    late_start,
                    window_minutes,
                    "session started"
                );
                self.notifier().notify_availability_change();
                (snap, false)
            }
            Started::Existing(snap) => (snap, true),
        };

        Ok(SessionStart {
            session_id: snapshot.session.id,
            state: effective_state(Some(&snapshot), now).unwrap_or(AvailabilityState::Available),
            late_start: snapshot.session.late_start,
            started_at: snapshot.session.started_at,
            window_ends_at: snapshot.current_window().map(|w| w.ends_at),
            last_seen_at: user.last_seen_at,
            already_started,
        })
    }

    /// End today's session. Ending twice returns the first `ended_at`.
    pub fn end_session(&self, user_id: &str, now: DateTime<Utc>) -> Result<SessionEnd> {
        let user = self.require_user(user_id)?;
        let date = clock::user_local_date(&user, now)?;

        let end = self.db().write(|tx| {
            let mut session = tx
                .session(&user.id, date)?
                .ok_or(PresenceError::NoActiveSession)?;
            if let Some(ended_at) = session.ended_at {
                return Ok(SessionEnd {
                    ended_at,
                    already_ended: true,
                });
            }
            session.ended_at = Some(now);
            tx.put_session(&session)?;
            Ok(SessionEnd {
                ended_at: now,
                already_ended: false,
            })
        })?;

        if !end.already_ended {
            tracing::info!(user = %user.id, %date, "session ended");
            self.notifier().notify_availability_change();
        }
        Ok(end)
    }
}

//! Strong and weak activity signals.
//!
//! Strong activity (verified work) always restores `available` with a fresh
//! full-length window. Weak activity (a keep-alive click) is throttled and can
//! only stretch the current window while the session is already soft-away; it
//! never restores `available` on its own.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::clock;
use crate::error::Result;
use crate::tracker::PresenceTracker;
use crate::types::{AvailabilityEvent, AvailabilityState, AvailabilityWindow, EventKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WeakActivity {
    /// Event recorded; `extended_until` is set when the window was stretched.
    Recorded {
        extended_until: Option<DateTime<Utc>>,
    },
    /// A weak signal was accepted too recently. Nothing written.
    Throttled,
    /// No session today. Nothing written.
    NoSession,
}

impl PresenceTracker {
    /// Record verified work. Returns the new window, or `None` when the user
    /// has not started a session today.
    pub fn record_strong_activity(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AvailabilityWindow>> {
        let user = self.require_user(user_id)?;
        let date = clock::user_local_date(&user, now)?;
        let window_minutes = self.config().dynamic_window_minutes(user.reliability_score);

        let window = self.db().write(|tx| {
            let Some(mut session) = tx.session(&user.id, date)? else {
                return Ok(None);
            };
            tx.append_event(&AvailabilityEvent {
                id: Uuid::new_v4(),
                user_id: user.id.clone(),
                session_id: session.id,
                kind: EventKind::StrongActivity,
                created_at: now,
            })?;
            let window = AvailabilityWindow {
                id: Uuid::new_v4(),
                session_id: session.id,
                starts_at: now,
                ends_at: now + Duration::minutes(i64::from(window_minutes)),
            };
            tx.put_window(&window)?;
            session.last_state = AvailabilityState::Available;
            session.last_state_at = now;
            tx.put_session(&session)?;
            Ok(Some(window))
        })?;

        if window.is_some() {
            tracing::debug!(user = %user.id, window_minutes, "strong activity");
            self.notifier().notify_availability_change();
        }
        Ok(window)
    }

    /// Record a lightweight "still here" signal.
    pub fn record_weak_activity(&self, user_id: &str, now: DateTime<Utc>) -> Result<WeakActivity> {
        let user = self.require_user(user_id)?;
        let date = clock::user_local_date(&user, now)?;
        let throttle = Duration::minutes(i64::from(self.config().weak_activity.throttle_minutes));
        let extension = Duration::minutes(i64::from(self.config().weak_activity.extension_minutes));

        self.db().write(|tx| {
            if let Some(last) = tx.latest_event(&user.id, EventKind::WeakActivity)? {
                if now - last.created_at < throttle {
                    return Ok(WeakActivity::Throttled);
                }
            }
            let Some(snapshot) = tx.snapshot(&user.id, date)? else {
                return Ok(WeakActivity::NoSession);
            };
            tx.append_event(&AvailabilityEvent {
                id: Uuid::new_v4(),
                user_id: user.id.clone(),
                session_id: snapshot.session.id,
                kind: EventKind::WeakActivity,
                created_at: now,
            })?;

            let mut extended_until = None;
            if snapshot.session.last_state == AvailabilityState::SoftAway {
                if let Some(current) = snapshot.current_window() {
                    let mut window = current.clone();
                    window.ends_at += extension;
                    tx.put_window(&window)?;
                    extended_until = Some(window.ends_at);
                }
            }
            Ok(WeakActivity::Recorded { extended_until })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::testing::*;

    #[test]
    fn strong_activity_without_session_is_noop() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        assert!(t.record_strong_activity("ana", at(10, 0)).unwrap().is_none());
        assert!(t.db().read(|tx| tx.user_events("ana")).unwrap().is_empty());
    }

    #[test]
    fn strong_activity_resets_decay_from_any_state() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        t.start_session("ana", at(9, 0)).unwrap();
        t.run_sweep(at(11, 31));
        t.run_sweep(at(12, 0));
        assert_eq!(
            t.get_session("ana", at(12, 0)).unwrap().unwrap().last_state,
            AvailabilityState::Away
        );

        let window = t.record_strong_activity("ana", at(12, 5)).unwrap().unwrap();
        assert_eq!(window.starts_at, at(12, 5));
        assert_eq!(window.ends_at, at(14, 35));

        let session = t.get_session("ana", at(12, 5)).unwrap().unwrap();
        assert_eq!(session.last_state, AvailabilityState::Available);
        assert_eq!(session.last_state_at, at(12, 5));
        assert_eq!(session.window_ends_at, Some(at(14, 35)));
        assert_eq!(
            t.get_state("ana", at(12, 5)).unwrap().state,
            Some(AvailabilityState::Available)
        );
    }

    #[test]
    fn weak_activity_is_throttled_within_ten_minutes() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        t.start_session("ana", at(9, 0)).unwrap();

        assert_eq!(
            t.record_weak_activity("ana", at(9, 30)).unwrap(),
            WeakActivity::Recorded {
                extended_until: None
            }
        );
        assert_eq!(
            t.record_weak_activity("ana", at(9, 39)).unwrap(),
            WeakActivity::Throttled
        );
        assert!(matches!(
            t.record_weak_activity("ana", at(9, 40)).unwrap(),
            WeakActivity::Recorded { .. }
        ));

        let weak = t
            .db()
            .read(|tx| tx.user_events("ana"))
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EventKind::WeakActivity)
            .count();
        assert_eq!(weak, 2);
    }

    #[test]
    fn weak_activity_only_extends_while_soft_away() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        t.start_session("ana", at(9, 0)).unwrap();

        // Available: recorded, window untouched.
        t.record_weak_activity("ana", at(10, 0)).unwrap();
        assert_eq!(
            t.get_session("ana", at(10, 0)).unwrap().unwrap().window_ends_at,
            Some(at(11, 30))
        );

        t.run_sweep(at(11, 31));
        let outcome = t.record_weak_activity("ana", at(11, 40)).unwrap();
        assert_eq!(
            outcome,
            WeakActivity::Recorded {
                extended_until: Some(at(11, 35))
            }
        );
        let session = t.get_session("ana", at(11, 40)).unwrap().unwrap();
        // Extended, but still soft-away: weak signals never restore available.
        assert_eq!(session.last_state, AvailabilityState::SoftAway);
        assert_eq!(session.window_ends_at, Some(at(11, 35)));
    }

    #[test]
    fn throttled_weak_activity_does_not_extend_again() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        t.start_session("ana", at(9, 0)).unwrap();
        t.run_sweep(at(11, 31));

        assert_eq!(
            t.record_weak_activity("ana", at(11, 40)).unwrap(),
            WeakActivity::Recorded {
                extended_until: Some(at(11, 35))
            }
        );
        assert_eq!(
            t.record_weak_activity("ana", at(11, 45)).unwrap(),
            WeakActivity::Throttled
        );

        let session = t.get_session("ana", at(11, 45)).unwrap().unwrap();
        assert_eq!(session.window_ends_at, Some(at(11, 35)));
        assert_eq!(session.last_state, AvailabilityState::SoftAway);
        let weak = t
            .db()
            .read(|tx| tx.user_events("ana"))
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EventKind::WeakActivity)
            .count();
        assert_eq!(weak, 1);
    }

    #[test]
    fn weak_activity_without_session_writes_nothing() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        assert_eq!(
            t.record_weak_activity("ana", at(9, 30)).unwrap(),
            WeakActivity::NoSession
        );
        assert!(t.db().read(|tx| tx.user_events("ana")).unwrap().is_empty());
    }
}

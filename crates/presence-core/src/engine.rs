//! Read-time presence projection.
//!
//! The persisted `last_state` only moves when the sweep or an activity writes
//! it. Between sweeps, readers see a one-step projection: once the current
//! window has lapsed, the state is shown one decay step further along. This
//! never writes anything.

use chrono::{DateTime, Utc};

use crate::types::{AvailabilityState, SessionSnapshot};

/// Effective presence for a user at `now`. `None` means no session today.
pub fn effective_state(
    snapshot: Option<&SessionSnapshot>,
    now: DateTime<Utc>,
) -> Option<AvailabilityState> {
    let snapshot = snapshot?;
    let state = snapshot.session.last_state;
    match snapshot.current_window() {
        Some(window) if now > window.ends_at => Some(state.decayed()),
        _ => Some(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AvailabilitySession, AvailabilityWindow};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn snapshot(state: AvailabilityState, window_ends: Option<DateTime<Utc>>) -> SessionSnapshot {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let id = Uuid::new_v4();
        SessionSnapshot {
            session: AvailabilitySession {
                id,
                user_id: "u1".into(),
                date: start.date_naive(),
                started_at: start,
                ended_at: None,
                late_start: false,
                last_state: state,
                last_state_at: start,
            },
            windows: window_ends
                .map(|ends_at| AvailabilityWindow {
                    id: Uuid::new_v4(),
                    session_id: id,
                    starts_at: start,
                    ends_at,
                })
                .into_iter()
                .collect(),
        }
    }

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn no_session_is_none() {
        assert_eq!(effective_state(None, t(10, 0)), None);
    }

    #[test]
    fn inside_window_reports_persisted_state() {
        let s = snapshot(AvailabilityState::Available, Some(t(11, 0)));
        assert_eq!(
            effective_state(Some(&s), t(10, 0)),
            Some(AvailabilityState::Available)
        );
        // The boundary instant itself is still inside.
        assert_eq!(
            effective_state(Some(&s), t(11, 0)),
            Some(AvailabilityState::Available)
        );
    }

    #[test]
    fn lapsed_window_projects_exactly_one_step() {
        let s = snapshot(AvailabilityState::Available, Some(t(11, 0)));
        // Even hours later the projection only goes one step.
        assert_eq!(
            effective_state(Some(&s), t(16, 0)),
            Some(AvailabilityState::SoftAway)
        );

        let s = snapshot(AvailabilityState::SoftAway, Some(t(11, 0)));
        assert_eq!(
            effective_state(Some(&s), t(11, 1)),
            Some(AvailabilityState::Away)
        );
    }

    #[test]
    fn furthest_window_bounds_validity() {
        let mut s = snapshot(AvailabilityState::Available, Some(t(10, 0)));
        s.windows.push(AvailabilityWindow {
            id: Uuid::new_v4(),
            session_id: s.session.id,
            starts_at: t(9, 30),
            ends_at: t(9, 30) + Duration::minutes(150),
        });
        assert_eq!(
            effective_state(Some(&s), t(11, 0)),
            Some(AvailabilityState::Available)
        );
    }

    #[test]
    fn session_without_window_keeps_state() {
        let s = snapshot(AvailabilityState::Away, None);
        assert_eq!(
            effective_state(Some(&s), t(23, 0)),
            Some(AvailabilityState::Away)
        );
    }
}

//! The decay sweep: persists state decay and expires overdue pings.
//!
//! Three passes run in order, each re-scanning current truth:
//! 1. `available` sessions whose current window has ended become `soft_away`.
//! 2. `soft_away` sessions older than the ceiling become `away`.
//! 3. open pings past their deadline are marked missed and the target's
//!    reliability score drops by the configured penalty.
//!
//! Every row is written in its own transaction and only if it still holds the
//! value the pass observed, so a sweep racing a request (or another sweep)
//! never clobbers a newer transition. A failure in one pass is logged and
//! counted; the remaining passes still run.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::clamp_score;
use crate::error::{PresenceError, Result};
use crate::tracker::PresenceTracker;
use crate::types::{
    AvailabilityEvent, AvailabilitySession, AvailabilityState, EventKind, Ping, SessionSnapshot,
};

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub soft_away: usize,
    pub away: usize,
    pub missed_pings: usize,
    /// Passes or rows that failed; retried on the next tick.
    pub errors: usize,
}

impl SweepReport {
    pub fn changed(&self) -> bool {
        self.soft_away + self.away + self.missed_pings > 0
    }
}

impl PresenceTracker {
    /// Run one sweep at `now`. Safe to call repeatedly or concurrently.
    pub fn run_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.decay_available(now) {
            Ok((n, errors)) => {
                report.soft_away = n;
                report.errors += errors;
            }
            Err(e) => {
                tracing::warn!("sweep: available decay pass failed: {e}");
                report.errors += 1;
            }
        }
        match self.decay_soft_away(now) {
            Ok((n, errors)) => {
                report.away = n;
                report.errors += errors;
            }
            Err(e) => {
                tracing::warn!("sweep: soft-away ceiling pass failed: {e}");
                report.errors += 1;
            }
        }
        match self.expire_pings(now) {
            Ok((n, errors)) => {
                report.missed_pings = n;
                report.errors += errors;
            }
            Err(e) => {
                tracing::warn!("sweep: ping expiry pass failed: {e}");
                report.errors += 1;
            }
        }

        if report.soft_away + report.away > 0 {
            self.notifier().notify_availability_change();
        }
        if report.changed() || report.errors > 0 {
            tracing::info!(
                soft_away = report.soft_away,
                away = report.away,
                missed_pings = report.missed_pings,
                errors = report.errors,
                "sweep finished"
            );
        }
        report
    }

    fn decay_available(&self, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let candidates: Vec<SessionSnapshot> = self.db().read(|tx| {
            let mut out = Vec::new();
            for session in tx.sessions()? {
                if session.last_state != AvailabilityState::Available {
                    continue;
                }
                let windows = tx.windows(session.id)?;
                let snapshot = SessionSnapshot { session, windows };
                if snapshot.current_window().is_some_and(|w| w.ends_at < now) {
                    out.push(snapshot);
                }
            }
            Ok(out)
        })?;

        let mut changed = 0;
        let mut errors = 0;
        for snapshot in candidates {
            match self.transition(&snapshot.session, AvailabilityState::SoftAway, now) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(session = %snapshot.session.id, "sweep: soft-away transition failed: {e}");
                    errors += 1;
                }
            }
        }
        Ok((changed, errors))
    }

    fn decay_soft_away(&self, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let ceiling = Duration::minutes(i64::from(self.config().soft_away_ceiling_minutes));
        let cutoff = now - ceiling;
        let candidates: Vec<AvailabilitySession> = self.db().read(|tx| {
            Ok(tx
                .sessions()?
                .into_iter()
                .filter(|s| s.last_state == AvailabilityState::SoftAway && s.last_state_at < cutoff)
                .collect())
        })?;

        let mut changed = 0;
        let mut errors = 0;
        for session in candidates {
            match self.transition(&session, AvailabilityState::Away, now) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(session = %session.id, "sweep: away transition failed: {e}");
                    errors += 1;
                }
            }
        }
        Ok((changed, errors))
    }

    /// Move `observed` to `to` if the stored row still matches what was
    /// observed. Returns false when something else got there first.
    fn transition(
        &self,
        observed: &AvailabilitySession,
        to: AvailabilityState,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.db().write(|tx| {
            let Some(mut current) = tx.session(&observed.user_id, observed.date)? else {
                return Ok(false);
            };
            if current.id != observed.id
                || current.last_state != observed.last_state
                || current.last_state_at != observed.last_state_at
            {
                return Ok(false);
            }
            current.last_state = to;
            current.last_state_at = now;
            tx.put_session(&current)?;
            tx.append_event(&AvailabilityEvent {
                id: Uuid::new_v4(),
                user_id: current.user_id.clone(),
                session_id: current.id,
                kind: EventKind::StateChange,
                created_at: now,
            })?;
            Ok(true)
        })
    }

    fn expire_pings(&self, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let overdue: Vec<Ping> = self.db().read(|tx| {
            Ok(tx
                .pings()?
                .into_iter()
                .filter(|p| p.is_open() && now > p.deadline())
                .collect())
        })?;

        let mut missed = 0;
        let mut errors = 0;
        for ping in overdue {
            match self.mark_missed(ping.id, now) {
                Ok(true) => missed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(ping = %ping.id, "sweep: marking ping missed failed: {e}");
                    errors += 1;
                }
            }
        }
        Ok((missed, errors))
    }

    /// Mark one ping missed and apply the reliability penalty to its target,
    /// both in one transaction.
    fn mark_missed(&self, ping_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let penalty = self.config().missed_ping_penalty;
        self.db().write(|tx| {
            let mut ping = tx
                .ping(ping_id)?
                .ok_or_else(|| PresenceError::PingNotFound(ping_id.to_string()))?;
            if !ping.is_open() {
                return Ok(false);
            }
            ping.missed_at = Some(now);
            tx.put_ping(&ping)?;

            match tx.user(&ping.target_user_id)? {
                Some(mut user) => {
                    let before = user.reliability_score;
                    user.reliability_score = clamp_score(before - penalty);
                    user.last_reliability_at = Some(now);
                    tx.put_user(&user)?;
                    tracing::info!(
                        user = %user.id,
                        ping = %ping.id,
                        before,
                        after = user.reliability_score,
                        "ping missed"
                    );
                }
                None => {
                    tracing::warn!(ping = %ping.id, target = %ping.target_user_id, "missed ping target no longer exists");
                }
            }
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::testing::*;

    fn state(t: &PresenceTracker, id: &str, now: DateTime<Utc>) -> AvailabilityState {
        t.get_session(id, now).unwrap().unwrap().last_state
    }

    #[test]
    fn sweep_walks_available_to_away_one_step_at_a_time() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        let start = t.start_session("ana", at(9, 5)).unwrap();
        assert!(!start.late_start);
        assert_eq!(start.window_ends_at, Some(at(11, 35)));

        let report = t.run_sweep(at(11, 40));
        assert_eq!(report.soft_away, 1);
        assert_eq!(report.away, 0);
        assert_eq!(state(&t, "ana", at(11, 40)), AvailabilityState::SoftAway);

        // Only 20 minutes since soft-away: below the ceiling.
        t.run_sweep(at(12, 0));
        assert_eq!(state(&t, "ana", at(12, 0)), AvailabilityState::SoftAway);

        let report = t.run_sweep(at(12, 10));
        assert_eq!(report.away, 1);
        assert_eq!(state(&t, "ana", at(12, 10)), AvailabilityState::Away);
        assert_eq!(
            t.get_state("ana", at(12, 10)).unwrap().state,
            Some(AvailabilityState::Away)
        );
    }

    #[test]
    fn far_overdue_session_still_decays_one_step() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        t.start_session("ana", at(9, 0)).unwrap();

        let report = t.run_sweep(at(17, 0));
        assert_eq!(report.soft_away, 1);
        assert_eq!(report.away, 0, "soft-away was just set; ceiling not reached");
        assert_eq!(state(&t, "ana", at(17, 0)), AvailabilityState::SoftAway);
    }

    #[test]
    fn repeated_sweep_is_a_noop() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        t.start_session("ana", at(9, 0)).unwrap();

        assert!(t.run_sweep(at(11, 40)).changed());
        assert_eq!(t.run_sweep(at(11, 40)), SweepReport::default());

        let changes = t
            .db()
            .read(|tx| tx.user_events("ana"))
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EventKind::StateChange)
            .count();
        assert_eq!(changes, 1);
    }

    #[test]
    fn stale_observation_does_not_clobber_newer_activity() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        t.start_session("ana", at(9, 0)).unwrap();
        let observed = t
            .db()
            .read(|tx| tx.session("ana", at(9, 0).date_naive()))
            .unwrap()
            .unwrap();

        // Activity lands between the sweep's scan and its write.
        t.record_strong_activity("ana", at(11, 39)).unwrap();
        let applied = t
            .transition(&observed, AvailabilityState::SoftAway, at(11, 40))
            .unwrap();
        assert!(!applied);
        assert_eq!(state(&t, "ana", at(11, 40)), AvailabilityState::Available);
    }

    #[test]
    fn strong_activity_keeps_session_available_through_sweep() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        t.start_session("ana", at(9, 0)).unwrap();
        t.record_strong_activity("ana", at(11, 0)).unwrap();

        assert_eq!(t.run_sweep(at(11, 40)).soft_away, 0);
        assert_eq!(state(&t, "ana", at(11, 40)), AvailabilityState::Available);
    }

    #[test]
    fn overdue_ping_is_missed_and_costs_reliability() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "ana", "09:00", 0.4);

        let ping = t.create_ping(&boss.id, "ana", at(10, 0)).unwrap();
        assert_eq!(ping.sla_minutes, 25);

        assert_eq!(t.run_sweep(at(10, 25)).missed_pings, 0);
        let report = t.run_sweep(at(10, 26));
        assert_eq!(report.missed_pings, 1);

        let stored = t.db().read(|tx| tx.ping(ping.id)).unwrap().unwrap();
        assert_eq!(stored.missed_at, Some(at(10, 26)));
        assert!(stored.responded_at.is_none());

        let ana = t.db().get_user("ana").unwrap().unwrap();
        assert!((ana.reliability_score - 0.35).abs() < 1e-9);
        assert_eq!(ana.last_reliability_at, Some(at(10, 26)));

        // A second sweep must not charge the penalty again.
        assert_eq!(t.run_sweep(at(10, 40)).missed_pings, 0);
        let ana = t.db().get_user("ana").unwrap().unwrap();
        assert!((ana.reliability_score - 0.35).abs() < 1e-9);
    }

    #[test]
    fn reliability_never_drops_below_zero() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "ana", "09:00", 0.02);
        t.create_ping(&boss.id, "ana", at(10, 0)).unwrap();
        t.run_sweep(at(11, 0));
        let ana = t.db().get_user("ana").unwrap().unwrap();
        assert_eq!(ana.reliability_score, 0.0);
    }

    #[test]
    fn responded_ping_is_never_missed() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "ana", "09:00", 1.0);
        let ping = t.create_ping(&boss.id, "ana", at(10, 0)).unwrap();
        t.respond_ping(&ping.id.to_string(), "ana", at(10, 5)).unwrap();

        assert_eq!(t.run_sweep(at(12, 0)).missed_pings, 0);
        let ana = t.db().get_user("ana").unwrap().unwrap();
        assert_eq!(ana.reliability_score, 1.0);
    }

    #[test]
    fn decay_publishes_one_availability_tick() {
        let (_dir, t) = tracker();
        employee(&t, "ana", "09:00", 1.0);
        employee(&t, "bo", "09:00", 1.0);
        t.start_session("ana", at(9, 0)).unwrap();
        t.start_session("bo", at(9, 0)).unwrap();

        let mut rx = t.notifier().subscribe_availability();

        assert_eq!(t.run_sweep(at(11, 40)).soft_away, 2);
        t.run_sweep(at(11, 41));
        assert_eq!(ticks(&mut rx), 1);
    }
}

//! Admin-initiated availability checks with a reliability-scaled deadline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{PresenceError, Result};
use crate::tracker::PresenceTracker;
use crate::types::{Ping, PingFilter, Role, User};

/// A ping as shown in listings, with both parties' display names resolved.
#[derive(Debug, Clone, Serialize)]
pub struct PingView {
    #[serde(flatten)]
    pub ping: Ping,
    pub from_name: Option<String>,
    pub target_name: Option<String>,
    pub deadline: DateTime<Utc>,
}

/// Result of answering a ping.
#[derive(Debug, Clone, Serialize)]
pub struct PingAnswer {
    pub ping: Ping,
    pub already_responded: bool,
}

impl PresenceTracker {
    /// Send a ping from admin `caller_id` to employee `target_user_id`.
    pub fn create_ping(
        &self,
        caller_id: &str,
        target_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Ping> {
        let caller = self.require_user(caller_id)?;
        if !caller.is_admin() {
            return Err(PresenceError::Forbidden);
        }
        let target = self
            .db()
            .get_user(target_user_id)?
            .filter(|u| u.role == Role::Employee && u.active)
            .ok_or_else(|| PresenceError::UserNotFound(target_user_id.to_string()))?;

        let ping = Ping {
            id: Uuid::new_v4(),
            from_user_id: caller.id.clone(),
            target_user_id: target.id.clone(),
            sent_at: now,
            sla_minutes: self.config().sla_minutes(target.reliability_score),
            responded_at: None,
            missed_at: None,
        };
        self.db().write(|tx| tx.put_ping(&ping))?;

        tracing::info!(
            ping = %ping.id,
            from = %caller.id,
            target = %target.id,
            sla_minutes = ping.sla_minutes,
            "ping sent"
        );
        self.notifier().notify_ping_sent(&target.id);
        Ok(ping)
    }

    /// Answer a ping. A ping that does not exist and a ping addressed to
    /// someone else look the same to the caller.
    pub fn respond_ping(
        &self,
        ping_id: &str,
        responder_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PingAnswer> {
        let not_found = || PresenceError::PingNotFound(ping_id.to_string());
        let id = Uuid::parse_str(ping_id).map_err(|_| not_found())?;

        let answer = self.db().write(|tx| {
            let mut ping = tx
                .ping(id)?
                .filter(|p| p.target_user_id == responder_id)
                .ok_or_else(not_found)?;
            if ping.responded_at.is_some() {
                return Ok(PingAnswer {
                    ping,
                    already_responded: true,
                });
            }
            if ping.missed_at.is_some() {
                return Err(PresenceError::PingMissed(ping_id.to_string()));
            }
            ping.responded_at = Some(now);
            tx.put_ping(&ping)?;
            Ok(PingAnswer {
                ping,
                already_responded: false,
            })
        })?;

        if !answer.already_responded {
            tracing::info!(ping = %answer.ping.id, user = %responder_id, "ping answered");
        }
        Ok(answer)
    }

    /// Admins see every ping (optionally filtered), newest first, capped at
    /// `ping_list_limit`. Everyone else sees only their own open pings.
    pub fn list_pings(&self, caller_id: &str, filter: Option<PingFilter>) -> Result<Vec<PingView>> {
        let caller = self.require_user(caller_id)?;
        let limit = self.config().ping_list_limit;

        self.db().read(|tx| {
            let mut pings: Vec<Ping> = tx
                .pings()?
                .into_iter()
                .filter(|p| {
                    if caller.is_admin() {
                        filter.map_or(true, |f| f.matches(p))
                    } else {
                        p.target_user_id == caller.id && p.is_open()
                    }
                })
                .collect();
            pings.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
            if caller.is_admin() {
                pings.truncate(limit);
            }

            let names: HashMap<String, String> = tx
                .users()?
                .into_iter()
                .map(|User { id, name, .. }| (id, name))
                .collect();
            Ok(pings
                .into_iter()
                .map(|ping| PingView {
                    from_name: names.get(&ping.from_user_id).cloned(),
                    target_name: names.get(&ping.target_user_id).cloned(),
                    deadline: ping.deadline(),
                    ping,
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::testing::*;

    #[test]
    fn sla_scales_with_target_reliability() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "low", "09:00", 0.0);
        employee(&t, "mid", "09:00", 0.4);
        employee(&t, "high", "09:00", 1.0);

        assert_eq!(t.create_ping(&boss.id, "low", at(10, 0)).unwrap().sla_minutes, 15);
        assert_eq!(t.create_ping(&boss.id, "mid", at(10, 0)).unwrap().sla_minutes, 25);
        assert_eq!(t.create_ping(&boss.id, "high", at(10, 0)).unwrap().sla_minutes, 40);
    }

    #[test]
    fn only_admins_ping_and_only_employees_are_pinged() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "ana", "09:00", 1.0);
        let mut gone = employee(&t, "cy", "09:00", 1.0);
        gone.active = false;
        t.db().upsert_user(&gone).unwrap();

        assert!(matches!(
            t.create_ping("ana", &boss.id, at(10, 0)),
            Err(PresenceError::Forbidden)
        ));
        assert!(matches!(
            t.create_ping(&boss.id, &boss.id, at(10, 0)),
            Err(PresenceError::UserNotFound(_))
        ));
        assert!(matches!(
            t.create_ping(&boss.id, "cy", at(10, 0)),
            Err(PresenceError::UserNotFound(_))
        ));
        assert!(t.db().read(|tx| tx.pings()).unwrap().is_empty());
    }

    #[test]
    fn ping_notifies_only_the_target() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "ana", "09:00", 1.0);
        employee(&t, "bo", "09:00", 1.0);

        let mut ana = t.notifier().subscribe_pings("ana");
        let mut bo = t.notifier().subscribe_pings("bo");

        t.create_ping(&boss.id, "ana", at(10, 0)).unwrap();
        assert_eq!(ticks(&mut ana), 1);
        assert_eq!(ticks(&mut bo), 0);
    }

    #[test]
    fn respond_hides_other_users_pings() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "ana", "09:00", 1.0);
        employee(&t, "bo", "09:00", 1.0);
        let ping = t.create_ping(&boss.id, "ana", at(10, 0)).unwrap();
        let id = ping.id.to_string();

        assert!(matches!(
            t.respond_ping(&id, "bo", at(10, 1)),
            Err(PresenceError::PingNotFound(_))
        ));
        assert!(matches!(
            t.respond_ping(&Uuid::new_v4().to_string(), "ana", at(10, 1)),
            Err(PresenceError::PingNotFound(_))
        ));
        assert!(matches!(
            t.respond_ping("not-a-uuid", "ana", at(10, 1)),
            Err(PresenceError::PingNotFound(_))
        ));
    }

    #[test]
    fn respond_is_idempotent() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "ana", "09:00", 1.0);
        let id = t.create_ping(&boss.id, "ana", at(10, 0)).unwrap().id.to_string();

        let first = t.respond_ping(&id, "ana", at(10, 3)).unwrap();
        let second = t.respond_ping(&id, "ana", at(10, 9)).unwrap();
        assert!(!first.already_responded);
        assert!(second.already_responded);
        assert_eq!(first.ping.responded_at, Some(at(10, 3)));
        assert_eq!(second.ping.responded_at, Some(at(10, 3)));
    }

    #[test]
    fn responding_after_miss_is_rejected() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "ana", "09:00", 0.0);
        let id = t.create_ping(&boss.id, "ana", at(10, 0)).unwrap().id.to_string();
        t.run_sweep(at(10, 16));

        assert!(matches!(
            t.respond_ping(&id, "ana", at(10, 17)),
            Err(PresenceError::PingMissed(_))
        ));
        let stored = t.db().read(|tx| tx.pings()).unwrap();
        assert!(stored[0].responded_at.is_none());
    }

    #[test]
    fn listing_respects_role_and_filter() {
        let (_dir, t) = tracker();
        let boss = admin(&t);
        employee(&t, "ana", "09:00", 1.0);
        employee(&t, "bo", "09:00", 1.0);
        let answered = t.create_ping(&boss.id, "ana", at(9, 0)).unwrap();
        t.create_ping(&boss.id, "ana", at(10, 0)).unwrap();
        t.create_ping(&boss.id, "bo", at(11, 0)).unwrap();
        t.respond_ping(&answered.id.to_string(), "ana", at(9, 5)).unwrap();

        let all = t.list_pings(&boss.id, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].ping.sent_at, at(11, 0), "newest first");
        assert_eq!(all[0].target_name.as_deref(), Some("BO"));
        assert_eq!(all[0].from_name.as_deref(), Some("Boss"));

        let open = t.list_pings(&boss.id, Some(PingFilter::Open)).unwrap();
        assert_eq!(open.len(), 2);
        let responded = t.list_pings(&boss.id, Some(PingFilter::Responded)).unwrap();
        assert_eq!(responded.len(), 1);
        assert_eq!(responded[0].ping.id, answered.id);

        // Employees only ever see their own open pings; the filter is ignored.
        let mine = t.list_pings("ana", Some(PingFilter::Responded)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].ping.sent_at, at(10, 0));
        assert_eq!(mine[0].deadline, at(10, 40));
    }
}

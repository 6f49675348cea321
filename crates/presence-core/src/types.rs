use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AvailabilityState
// ---------------------------------------------------------------------------

/// Persisted presence state of a session. Decay only ever moves forward one
/// step at a time: `Available → SoftAway → Away`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityState {
    Available,
    SoftAway,
    Away,
}

impl AvailabilityState {
    /// The next state after one decay step. `Away` is terminal.
    pub fn decayed(self) -> AvailabilityState {
        match self {
            AvailabilityState::Available => AvailabilityState::SoftAway,
            AvailabilityState::SoftAway | AvailabilityState::Away => AvailabilityState::Away,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AvailabilityState::Available => "available",
            AvailabilityState::SoftAway => "soft_away",
            AvailabilityState::Away => "away",
        }
    }
}

impl fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StartWork,
    StrongActivity,
    WeakActivity,
    StateChange,
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::PresenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "employee" => Ok(Role::Employee),
            other => Err(crate::error::PresenceError::InvalidConfig(format!(
                "unknown role '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A worker as seen by the presence engine. Owned by the surrounding
/// application; this crate only reads the work window and mutates
/// `last_seen_at` and the reliability score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub team_id: Option<String>,
    /// Local `HH:mm` start of the work window.
    #[serde(default)]
    pub work_start_time: Option<String>,
    /// Local `HH:mm` end of the work window (exclusive).
    #[serde(default)]
    pub work_end_time: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_reliability")]
    pub reliability_score: f64,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reliability_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

fn default_reliability() -> f64 {
    1.0
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            role,
            active: true,
            team_id: None,
            work_start_time: None,
            work_end_time: None,
            timezone: None,
            reliability_score: 1.0,
            last_seen_at: None,
            last_reliability_at: None,
        }
    }

    /// IANA zone name, defaulting to UTC when unset or blank.
    pub fn timezone_name(&self) -> &str {
        match self.timezone.as_deref() {
            Some(tz) if !tz.trim().is_empty() => tz,
            _ => "UTC",
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ---------------------------------------------------------------------------
// Session / Window / Event
// ---------------------------------------------------------------------------

/// One day of presence tracking for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySession {
    pub id: Uuid,
    pub user_id: String,
    /// Calendar day in the user's timezone.
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub late_start: bool,
    pub last_state: AvailabilityState,
    pub last_state_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityEvent {
    pub id: Uuid,
    pub user_id: String,
    pub session_id: Uuid,
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
}

/// A session together with its windows, as the state engine consumes it.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: AvailabilitySession,
    pub windows: Vec<AvailabilityWindow>,
}

impl SessionSnapshot {
    /// The window that currently bounds validity: the one reaching furthest
    /// into the future.
    pub fn current_window(&self) -> Option<&AvailabilityWindow> {
        self.windows.iter().max_by_key(|w| (w.ends_at, w.starts_at))
    }
}

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub id: Uuid,
    pub from_user_id: String,
    pub target_user_id: String,
    pub sent_at: DateTime<Utc>,
    pub sla_minutes: u32,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub missed_at: Option<DateTime<Utc>>,
}

impl Ping {
    pub fn is_open(&self) -> bool {
        self.responded_at.is_none() && self.missed_at.is_none()
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.sent_at + chrono::Duration::minutes(i64::from(self.sla_minutes))
    }
}

/// Admin-side ping listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingFilter {
    Open,
    Responded,
    Missed,
}

impl PingFilter {
    pub fn matches(self, ping: &Ping) -> bool {
        match self {
            PingFilter::Open => ping.is_open(),
            PingFilter::Responded => ping.responded_at.is_some(),
            PingFilter::Missed => ping.missed_at.is_some(),
        }
    }
}

impl std::str::FromStr for PingFilter {
    type Err = crate::error::PresenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PingFilter::Open),
            "responded" => Ok(PingFilter::Responded),
            "missed" => Ok(PingFilter::Missed),
            other => Err(crate::error::PresenceError::InvalidConfig(format!(
                "unknown ping filter '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_is_single_step() {
        assert_eq!(
            AvailabilityState::Available.decayed(),
            AvailabilityState::SoftAway
        );
        assert_eq!(AvailabilityState::SoftAway.decayed(), AvailabilityState::Away);
        assert_eq!(AvailabilityState::Away.decayed(), AvailabilityState::Away);
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&AvailabilityState::SoftAway).unwrap();
        assert_eq!(json, "\"soft_away\"");
    }

    #[test]
    fn blank_timezone_defaults_to_utc() {
        let mut user = User::new("u1", "Ana", Role::Employee);
        assert_eq!(user.timezone_name(), "UTC");
        user.timezone = Some("  ".into());
        assert_eq!(user.timezone_name(), "UTC");
        user.timezone = Some("Europe/Berlin".into());
        assert_eq!(user.timezone_name(), "Europe/Berlin");
    }

    #[test]
    fn ping_filter_parses_and_matches() {
        let now = Utc::now();
        let mut ping = Ping {
            id: Uuid::new_v4(),
            from_user_id: "admin".into(),
            target_user_id: "u1".into(),
            sent_at: now,
            sla_minutes: 20,
            responded_at: None,
            missed_at: None,
        };
        let open: PingFilter = "open".parse().unwrap();
        assert!(open.matches(&ping));
        ping.responded_at = Some(now);
        assert!(!open.matches(&ping));
        assert!(PingFilter::Responded.matches(&ping));
        assert!("bogus".parse::<PingFilter>().is_err());
    }
}

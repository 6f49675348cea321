//! Timezone helpers: IANA zone + instant → local `HH:mm` and local calendar date.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::{PresenceError, Result};
use crate::types::User;

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| PresenceError::InvalidTimezone(name.to_string()))
}

/// Parse a 24h `HH:mm` string into minutes since midnight.
pub fn parse_hhmm(value: &str) -> Result<u32> {
    let t = NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| PresenceError::InvalidWorkTime(value.to_string()))?;
    Ok(t.hour() * 60 + t.minute())
}

/// Minutes since local midnight of `at` in `tz`.
pub fn local_minutes(tz: Tz, at: DateTime<Utc>) -> u32 {
    let local = at.with_timezone(&tz);
    local.hour() * 60 + local.minute()
}

/// Local `HH:mm` of `at` in `tz`.
pub fn local_hhmm(tz: Tz, at: DateTime<Utc>) -> String {
    at.with_timezone(&tz).format("%H:%M").to_string()
}

pub fn local_date(tz: Tz, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Calendar day of `at` in the user's timezone.
pub fn user_local_date(user: &User, at: DateTime<Utc>) -> Result<NaiveDate> {
    Ok(local_date(parse_timezone(user.timezone_name())?, at))
}

/// Whether `now` falls inside `[work_start_time, work_end_time)` in the user's
/// local time. A start after the end wraps past midnight. Users without both
/// bounds configured are always inside.
pub fn is_inside_work_window(user: &User, now: DateTime<Utc>) -> Result<bool> {
    let (Some(start), Some(end)) = (
        user.work_start_time.as_deref(),
        user.work_end_time.as_deref(),
    ) else {
        return Ok(true);
    };
    let start = parse_hhmm(start)?;
    let end = parse_hhmm(end)?;
    let current = local_minutes(parse_timezone(user.timezone_name())?, now);
    if start <= end {
        Ok(current >= start && current < end)
    } else {
        Ok(current >= start || current < end)
    }
}

/// Whether a start at `started_at` is more than `grace_minutes` past the
/// user's `work_start_time`. Users without a start time are never late.
pub fn is_late_start(user: &User, started_at: DateTime<Utc>, grace_minutes: u32) -> Result<bool> {
    let Some(start) = user.work_start_time.as_deref() else {
        return Ok(false);
    };
    let work_start = parse_hhmm(start)?;
    let started = local_minutes(parse_timezone(user.timezone_name())?, started_at);
    Ok(started > work_start.saturating_add(grace_minutes))
}

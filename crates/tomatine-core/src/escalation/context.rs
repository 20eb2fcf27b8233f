//! Context snapshot handed to the decision oracle, plus the timezone
//! helpers used to compute the user's local calendar day.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// What the oracle gets to see about the user before choosing an
/// action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeContext {
    pub sessions_completed_today: u32,
    /// Formatted in the user's local timezone, e.g. "14:05".
    pub current_local_time: String,
    pub state_label: String,
    /// Formatted last-activity timestamp, empty when there is none.
    pub last_activity: String,
    pub escalations_today: u32,
    pub desired_sessions_per_day: u32,
    /// Recent conversation transcript, when the chat adapter keeps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Resolve an IANA timezone name, falling back to UTC on anything
/// unrecognized. A bad stored timezone is a recoverable configuration
/// problem, not a reason to drop the nudge.
pub fn resolve_tz(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!(timezone = name, "unresolvable timezone, falling back to UTC");
        Tz::UTC
    })
}

/// UTC bounds `[start, end)` of the local calendar day containing
/// `now`.
pub fn local_day_bounds(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_date = now.with_timezone(&tz).date_naive();
    let start = local_midnight_utc(local_date, tz).unwrap_or_else(|| {
        // Midnight didn't exist locally (DST gap); approximate from UTC.
        now.date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc()
    });
    let end = local_midnight_utc(local_date + Duration::days(1), tz)
        .unwrap_or(start + Duration::hours(24));
    (start, end)
}

fn local_midnight_utc(date: chrono::NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// "HH:MM" in the user's local timezone.
pub fn format_local_time(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format("%H:%M").to_string()
}

/// "YYYY-MM-DD HH:MM" in the user's local timezone.
pub fn format_local_timestamp(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

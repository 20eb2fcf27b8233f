//! User profile record.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-mostly user profile. Mutated only by profile updates, which are
/// plumbing; the core reads it to resolve delivery addresses, the local
/// calendar day, and the daily session target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Chat-platform delivery address.
    pub chat_id: String,
    /// IANA timezone name, e.g. "Europe/Berlin". Unresolvable names
    /// fall back to UTC at the point of use.
    pub timezone: String,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub desired_sessions_per_day: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(chat_id: String, timezone: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            timezone,
            work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            work_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            desired_sessions_per_day: 8,
            created_at: now,
            updated_at: now,
        }
    }
}

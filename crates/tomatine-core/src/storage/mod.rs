//! Persistence contracts and the SQLite implementation.
//!
//! The core speaks to storage through the repository traits below;
//! [`SqliteStore`] implements all three over one mutex-guarded
//! connection, which also supplies the record-level mutual exclusion
//! the state machine relies on during a read-modify-write.

pub mod database;

pub use database::SqliteStore;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::reminder::Reminder;
use crate::session::PomodoroSession;
use crate::user::User;

/// Session repository contract.
pub trait SessionStore: Send + Sync {
    fn insert_session(&self, session: &PomodoroSession) -> Result<(), StoreError>;

    fn get_session(&self, id: Uuid) -> Result<Option<PomodoroSession>, StoreError>;

    /// Persist the mutable fields after a transition.
    fn update_session(&self, session: &PomodoroSession) -> Result<(), StoreError>;

    fn active_session_for_user(&self, user_id: Uuid)
        -> Result<Option<PomodoroSession>, StoreError>;

    /// Active sessions whose deadline has passed. Driven by the sweep.
    fn expired_active_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PomodoroSession>, StoreError>;

    /// Completed work sessions with `end_time` in `[start, end)`.
    fn completed_work_sessions_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// Most recently completed session for the user, if any.
    fn last_completed_session(&self, user_id: Uuid)
        -> Result<Option<PomodoroSession>, StoreError>;
}

/// Reminder repository contract.
pub trait ReminderStore: Send + Sync {
    fn insert_reminder(&self, reminder: &Reminder) -> Result<(), StoreError>;

    fn pending_reminders_for_user(&self, user_id: Uuid) -> Result<Vec<Reminder>, StoreError>;

    /// Transition every pending reminder for the user to cancelled.
    /// Idempotent; returns the number of rows affected.
    fn cancel_pending_for_user(&self, user_id: Uuid) -> Result<usize, StoreError>;

    /// Pending reminders with `send_at <= now`.
    fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StoreError>;

    fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// User repository contract.
pub trait UserStore: Send + Sync {
    fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    fn upsert_user(&self, user: &User) -> Result<(), StoreError>;
}

/// Returns `~/.config/tomatine[-dev]/` based on TOMATINE_ENV.
///
/// Set TOMATINE_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TOMATINE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("tomatine-dev")
    } else {
        base_dir.join("tomatine")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

//! SQLite-backed store for sessions, reminders, and users.
//!
//! Timestamps are persisted as RFC 3339 text so they compare correctly
//! across process restarts; durations as integer seconds; ids as UUID
//! text. The schema is created by an idempotent `migrate()` with
//! indexes on the sweep's two query paths (expired active sessions,
//! due pending reminders).

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{ReminderStore, SessionStore, UserStore};
use crate::error::StoreError;
use crate::reminder::{Reminder, ReminderState};
use crate::session::{PomodoroSession, SessionKind, SessionState};
use crate::user::User;

/// SQLite store implementing all three repository contracts.
///
/// A single mutex-guarded connection serializes read-modify-write
/// cycles, which is the record-level mutual exclusion the session
/// state machine assumes during a transition.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database at `~/.config/tomatine/tomatine.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self, StoreError> {
        let path = super::data_dir()
            .map_err(|e| StoreError::Corrupt {
                id: "data-dir".into(),
                message: e.to_string(),
            })?
            .join("tomatine.db");
        let conn = Connection::open(&path).map_err(|source| StoreError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id                TEXT PRIMARY KEY,
                user_id           TEXT NOT NULL,
                task_id           TEXT,
                kind              TEXT NOT NULL,
                state             TEXT NOT NULL,
                duration_secs     INTEGER NOT NULL,
                start_time        TEXT,
                end_time          TEXT,
                expires_at        TEXT,
                pause_start_time  TEXT,
                total_paused_secs INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS reminders (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL,
                chat_id          TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                send_at          TEXT NOT NULL,
                triggered_at     TEXT,
                state            TEXT NOT NULL,
                escalation_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS users (
                id                       TEXT PRIMARY KEY,
                chat_id                  TEXT NOT NULL,
                timezone                 TEXT NOT NULL,
                work_start               TEXT NOT NULL,
                work_end                 TEXT NOT NULL,
                desired_sessions_per_day INTEGER NOT NULL,
                created_at               TEXT NOT NULL,
                updated_at               TEXT NOT NULL
            );

            -- Sweep query paths
            CREATE INDEX IF NOT EXISTS idx_sessions_state_expires
                ON sessions(state, expires_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_user_state
                ON sessions(user_id, state);
            CREATE INDEX IF NOT EXISTS idx_reminders_state_send_at
                ON reminders(state, send_at);
            CREATE INDEX IF NOT EXISTS idx_reminders_user_state
                ON reminders(user_id, state);",
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // Lock poisoning only happens if another thread panicked while
        // holding the guard; continuing with the inner value is safe
        // for a SQLite handle.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Row mapping ──────────────────────────────────────────────────────

fn parse_uuid(idx: usize, raw: &str) -> Result<Uuid, rusqlite::Error> {
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_dt(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_dt(idx: usize, raw: Option<String>) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    raw.map(|s| parse_dt(idx, &s)).transpose()
}

fn kind_from_str(idx: usize, raw: &str) -> Result<SessionKind, rusqlite::Error> {
    match raw {
        "work" => Ok(SessionKind::Work),
        "short_break" => Ok(SessionKind::ShortBreak),
        "long_break" => Ok(SessionKind::LongBreak),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown session kind '{other}'").into(),
        )),
    }
}

fn state_from_str(idx: usize, raw: &str) -> Result<SessionState, rusqlite::Error> {
    match raw {
        "pending" => Ok(SessionState::Pending),
        "active" => Ok(SessionState::Active),
        "paused" => Ok(SessionState::Paused),
        "completed" => Ok(SessionState::Completed),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown session state '{other}'").into(),
        )),
    }
}

fn reminder_state_from_str(idx: usize, raw: &str) -> Result<ReminderState, rusqlite::Error> {
    match raw {
        "pending" => Ok(ReminderState::Pending),
        "triggered" => Ok(ReminderState::Triggered),
        "cancelled" => Ok(ReminderState::Cancelled),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown reminder state '{other}'").into(),
        )),
    }
}

fn session_from_row(row: &Row<'_>) -> Result<PomodoroSession, rusqlite::Error> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let task_id: Option<String> = row.get(2)?;
    let kind: String = row.get(3)?;
    let state: String = row.get(4)?;
    let duration_secs: i64 = row.get(5)?;
    let start_time: Option<String> = row.get(6)?;
    let end_time: Option<String> = row.get(7)?;
    let expires_at: Option<String> = row.get(8)?;
    let pause_start_time: Option<String> = row.get(9)?;
    let total_paused_secs: i64 = row.get(10)?;

    Ok(PomodoroSession::from_stored(
        parse_uuid(0, &id)?,
        parse_uuid(1, &user_id)?,
        task_id.as_deref().map(|s| parse_uuid(2, s)).transpose()?,
        kind_from_str(3, &kind)?,
        state_from_str(4, &state)?,
        chrono::Duration::seconds(duration_secs),
        parse_opt_dt(6, start_time)?,
        parse_opt_dt(7, end_time)?,
        parse_opt_dt(8, expires_at)?,
        parse_opt_dt(9, pause_start_time)?,
        chrono::Duration::seconds(total_paused_secs),
    ))
}

fn reminder_from_row(row: &Row<'_>) -> Result<Reminder, rusqlite::Error> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let chat_id: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let send_at: String = row.get(4)?;
    let triggered_at: Option<String> = row.get(5)?;
    let state: String = row.get(6)?;
    let escalation_count: i64 = row.get(7)?;

    Ok(Reminder {
        id: parse_uuid(0, &id)?,
        user_id: parse_uuid(1, &user_id)?,
        chat_id,
        created_at: parse_dt(3, &created_at)?,
        send_at: parse_dt(4, &send_at)?,
        triggered_at: parse_opt_dt(5, triggered_at)?,
        state: reminder_state_from_str(6, &state)?,
        escalation_count: escalation_count.max(0) as u32,
    })
}

fn user_from_row(row: &Row<'_>) -> Result<User, rusqlite::Error> {
    let id: String = row.get(0)?;
    let chat_id: String = row.get(1)?;
    let timezone: String = row.get(2)?;
    let work_start: String = row.get(3)?;
    let work_end: String = row.get(4)?;
    let desired: i64 = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    let parse_time = |idx: usize, raw: &str| {
        raw.parse::<chrono::NaiveTime>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    };

    Ok(User {
        id: parse_uuid(0, &id)?,
        chat_id,
        timezone,
        work_start: parse_time(3, &work_start)?,
        work_end: parse_time(4, &work_end)?,
        desired_sessions_per_day: desired.max(0) as u32,
        created_at: parse_dt(6, &created_at)?,
        updated_at: parse_dt(7, &updated_at)?,
    })
}

const SESSION_COLUMNS: &str = "id, user_id, task_id, kind, state, duration_secs, start_time, \
     end_time, expires_at, pause_start_time, total_paused_secs";

const REMINDER_COLUMNS: &str =
    "id, user_id, chat_id, created_at, send_at, triggered_at, state, escalation_count";

impl SessionStore for SqliteStore {
    fn insert_session(&self, session: &PomodoroSession) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (id, user_id, task_id, kind, state, duration_secs,
                start_time, end_time, expires_at, pause_start_time, total_paused_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                session.id.to_string(),
                session.user_id.to_string(),
                session.task_id.map(|t| t.to_string()),
                session.kind.as_str(),
                session.state.as_str(),
                session.duration.num_seconds(),
                session.start_time.map(|t| t.to_rfc3339()),
                session.end_time.map(|t| t.to_rfc3339()),
                session.expires_at.map(|t| t.to_rfc3339()),
                session.pause_start_time.map(|t| t.to_rfc3339()),
                session.total_paused.num_seconds(),
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, id: Uuid) -> Result<Option<PomodoroSession>, StoreError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id.to_string()], session_from_row)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    fn update_session(&self, session: &PomodoroSession) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sessions SET state = ?2, start_time = ?3, end_time = ?4,
                expires_at = ?5, pause_start_time = ?6, total_paused_secs = ?7
             WHERE id = ?1",
            params![
                session.id.to_string(),
                session.state.as_str(),
                session.start_time.map(|t| t.to_rfc3339()),
                session.end_time.map(|t| t.to_rfc3339()),
                session.expires_at.map(|t| t.to_rfc3339()),
                session.pause_start_time.map(|t| t.to_rfc3339()),
                session.total_paused.num_seconds(),
            ],
        )?;
        Ok(())
    }

    fn active_session_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PomodoroSession>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE user_id = ?1 AND state = 'active' LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![user_id.to_string()], session_from_row)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    fn expired_active_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PomodoroSession>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE state = 'active' AND expires_at IS NOT NULL AND expires_at <= ?1"
        ))?;
        let rows = stmt.query_map(params![now.to_rfc3339()], session_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn completed_work_sessions_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions
             WHERE user_id = ?1 AND kind = 'work' AND state = 'completed'
               AND end_time >= ?2 AND end_time < ?3",
            params![user_id.to_string(), start.to_rfc3339(), end.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u32)
    }

    fn last_completed_session(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PomodoroSession>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE user_id = ?1 AND state = 'completed' AND end_time IS NOT NULL
             ORDER BY end_time DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![user_id.to_string()], session_from_row)?;
        rows.next().transpose().map_err(StoreError::from)
    }
}

impl ReminderStore for SqliteStore {
    fn insert_reminder(&self, reminder: &Reminder) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO reminders (id, user_id, chat_id, created_at, send_at,
                triggered_at, state, escalation_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                reminder.id.to_string(),
                reminder.user_id.to_string(),
                reminder.chat_id,
                reminder.created_at.to_rfc3339(),
                reminder.send_at.to_rfc3339(),
                reminder.triggered_at.map(|t| t.to_rfc3339()),
                reminder.state.as_str(),
                reminder.escalation_count,
            ],
        )?;
        Ok(())
    }

    fn pending_reminders_for_user(&self, user_id: Uuid) -> Result<Vec<Reminder>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE user_id = ?1 AND state = 'pending' ORDER BY send_at"
        ))?;
        let rows = stmt.query_map(params![user_id.to_string()], reminder_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn cancel_pending_for_user(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let conn = self.lock();
        let affected = conn.execute(
            "UPDATE reminders SET state = 'cancelled'
             WHERE user_id = ?1 AND state = 'pending'",
            params![user_id.to_string()],
        )?;
        Ok(affected)
    }

    fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE state = 'pending' AND send_at <= ?1 ORDER BY send_at"
        ))?;
        let rows = stmt.query_map(params![now.to_rfc3339()], reminder_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE reminders SET state = 'triggered', triggered_at = ?2
             WHERE id = ?1 AND state = 'pending'",
            params![id.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }
}

impl UserStore for SqliteStore {
    fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, timezone, work_start, work_end,
                    desired_sessions_per_day, created_at, updated_at
             FROM users WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id.to_string()], user_from_row)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO users (id, chat_id, timezone, work_start, work_end,
                desired_sessions_per_day, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                chat_id = excluded.chat_id,
                timezone = excluded.timezone,
                work_start = excluded.work_start,
                work_end = excluded.work_end,
                desired_sessions_per_day = excluded.desired_sessions_per_day,
                updated_at = excluded.updated_at",
            params![
                user.id.to_string(),
                user.chat_id,
                user.timezone,
                user.work_start.to_string(),
                user.work_end.to_string(),
                user.desired_sessions_per_day,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn started_session(user_id: Uuid) -> PomodoroSession {
        let mut s = PomodoroSession::new(
            user_id,
            None,
            SessionKind::Work,
            Duration::minutes(25),
        );
        s.start(t0()).unwrap();
        s.drain_events();
        s
    }

    #[test]
    fn session_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let user_id = Uuid::new_v4();
        let mut s = started_session(user_id);
        s.pause(t0() + Duration::minutes(10)).unwrap();
        s.drain_events();
        store.insert_session(&s).unwrap();

        let loaded = store.get_session(s.id).unwrap().unwrap();
        assert_eq!(loaded.state, SessionState::Paused);
        assert_eq!(loaded.duration, Duration::minutes(25));
        assert_eq!(loaded.expires_at, s.expires_at);
        assert_eq!(loaded.pause_start_time, s.pause_start_time);
        assert_eq!(loaded.user_id, user_id);
    }

    #[test]
    fn expired_active_only_returns_overdue_active_sessions() {
        let store = SqliteStore::open_memory().unwrap();
        let user_id = Uuid::new_v4();

        let fresh = started_session(user_id);
        store.insert_session(&fresh).unwrap();

        let mut overdue = started_session(user_id);
        overdue.expires_at = Some(t0() - Duration::minutes(1));
        store.insert_session(&overdue).unwrap();

        let mut done = started_session(user_id);
        done.complete(t0() + Duration::minutes(25)).unwrap();
        done.drain_events();
        store.insert_session(&done).unwrap();

        let expired = store.expired_active_sessions(t0()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, overdue.id);
    }

    #[test]
    fn cancel_pending_is_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let user_id = Uuid::new_v4();
        let reminder = Reminder::new(user_id, "chat".into(), t0(), 1, t0());
        store.insert_reminder(&reminder).unwrap();

        assert_eq!(store.cancel_pending_for_user(user_id).unwrap(), 1);
        assert_eq!(store.cancel_pending_for_user(user_id).unwrap(), 0);
        assert!(store.pending_reminders_for_user(user_id).unwrap().is_empty());
    }

    #[test]
    fn due_reminders_filters_on_send_at_and_state() {
        let store = SqliteStore::open_memory().unwrap();
        let user_id = Uuid::new_v4();

        let due = Reminder::new(user_id, "chat".into(), t0() - Duration::minutes(1), 1, t0());
        let future = Reminder::new(user_id, "chat".into(), t0() + Duration::hours(1), 1, t0());
        store.insert_reminder(&due).unwrap();
        store.insert_reminder(&future).unwrap();

        let found = store.due_reminders(t0()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);

        store.mark_triggered(due.id, t0()).unwrap();
        assert!(store.due_reminders(t0()).unwrap().is_empty());
    }

    #[test]
    fn completed_work_count_honors_bounds_and_kind() {
        let store = SqliteStore::open_memory().unwrap();
        let user_id = Uuid::new_v4();

        let mut work = started_session(user_id);
        work.complete(t0() + Duration::minutes(25)).unwrap();
        work.drain_events();
        store.insert_session(&work).unwrap();

        let mut brk = PomodoroSession::new(
            user_id,
            None,
            SessionKind::ShortBreak,
            Duration::minutes(5),
        );
        brk.start(t0()).unwrap();
        brk.complete(t0() + Duration::minutes(5)).unwrap();
        brk.drain_events();
        store.insert_session(&brk).unwrap();

        let count = store
            .completed_work_sessions_between(user_id, t0(), t0() + Duration::hours(1))
            .unwrap();
        assert_eq!(count, 1);

        let outside = store
            .completed_work_sessions_between(user_id, t0() + Duration::hours(2), t0() + Duration::hours(3))
            .unwrap();
        assert_eq!(outside, 0);
    }

    #[test]
    fn user_upsert_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let mut user = User::new("chat-1".into(), "Europe/Berlin".into(), t0());
        store.upsert_user(&user).unwrap();

        user.desired_sessions_per_day = 4;
        store.upsert_user(&user).unwrap();

        let loaded = store.get_user(user.id).unwrap().unwrap();
        assert_eq!(loaded.desired_sessions_per_day, 4);
        assert_eq!(loaded.timezone, "Europe/Berlin");
        assert_eq!(loaded.work_start, user.work_start);
    }
}

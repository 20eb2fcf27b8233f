//! Session state machine.
//!
//! A [`PomodoroSession`] is a wall-clock-based state machine:
//!
//! ```text
//! Pending -> Active -> (Paused <-> Active) -> Completed
//! ```
//!
//! The entity owns its timestamps and pause bookkeeping, and appends a
//! domain event to an internal buffer on every transition. The caller
//! drains the buffer with [`PomodoroSession::drain_events`] after
//! persisting and publishes the events in order.
//!
//! Expiry is not a transition: the sweep detects it by comparing `now`
//! against `expires_at` on an active session, then calls `complete()`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;
use crate::events::Event;

/// Session flavor; decides the default duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionKind {
    pub fn default_duration(self) -> Duration {
        match self {
            SessionKind::Work => Duration::minutes(25),
            SessionKind::ShortBreak => Duration::minutes(5),
            SessionKind::LongBreak => Duration::minutes(15),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Work => "work",
            SessionKind::ShortBreak => "short_break",
            SessionKind::LongBreak => "long_break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Active,
    Paused,
    Completed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timed focus/break interval owned by a user.
///
/// `duration` is the planned length of the active portion and is fixed
/// at creation. While the session is active or paused,
/// `expires_at == start_time + duration + total_paused`; the pause
/// adjustment is applied on `resume()` so time frozen during a pause is
/// exact.
#[derive(Debug, Clone)]
pub struct PomodoroSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_id: Option<Uuid>,
    pub kind: SessionKind,
    pub state: SessionState,
    pub duration: Duration,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub pause_start_time: Option<DateTime<Utc>>,
    pub total_paused: Duration,
    /// Events appended by transitions, owned by this instance until the
    /// caller drains and publishes them. Never persisted.
    pending_events: Vec<Event>,
}

impl PomodoroSession {
    /// New session in the `Pending` state.
    pub fn new(
        user_id: Uuid,
        task_id: Option<Uuid>,
        kind: SessionKind,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            task_id,
            kind,
            state: SessionState::Pending,
            duration,
            start_time: None,
            end_time: None,
            expires_at: None,
            pause_start_time: None,
            total_paused: Duration::zero(),
            pending_events: Vec::new(),
        }
    }

    /// Rebuild a session from persisted fields. The event buffer starts
    /// empty; events belong to the process that ran the transition.
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        id: Uuid,
        user_id: Uuid,
        task_id: Option<Uuid>,
        kind: SessionKind,
        state: SessionState,
        duration: Duration,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
        pause_start_time: Option<DateTime<Utc>>,
        total_paused: Duration,
    ) -> Self {
        Self {
            id,
            user_id,
            task_id,
            kind,
            state,
            duration,
            start_time,
            end_time,
            expires_at,
            pause_start_time,
            total_paused,
            pending_events: Vec::new(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// `Pending -> Active`. Sets `start_time` and the deadline.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.state != SessionState::Pending {
            return Err(TransitionError {
                action: "start",
                state: self.state,
            });
        }
        self.state = SessionState::Active;
        self.start_time = Some(now);
        self.expires_at = Some(now + self.duration);
        self.pending_events.push(Event::SessionStarted {
            session_id: self.id,
            user_id: self.user_id,
            kind: self.kind,
        });
        Ok(())
    }

    /// `Active -> Paused`. The deadline is left untouched; the shift is
    /// applied on resume so the frozen interval is exact.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.state != SessionState::Active {
            return Err(TransitionError {
                action: "pause",
                state: self.state,
            });
        }
        self.state = SessionState::Paused;
        self.pause_start_time = Some(now);
        self.pending_events.push(Event::SessionPaused {
            session_id: self.id,
        });
        Ok(())
    }

    /// `Paused -> Active`. Shifts the deadline forward by the elapsed
    /// pause interval and accumulates it into `total_paused`. A negative
    /// interval (clock skew) is clamped to zero so the deadline never
    /// moves backward.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        let Some(pause_start) = self.pause_start_time else {
            return Err(TransitionError {
                action: "resume",
                state: self.state,
            });
        };
        if self.state != SessionState::Paused {
            return Err(TransitionError {
                action: "resume",
                state: self.state,
            });
        }
        let elapsed = clamp_non_negative(now - pause_start);
        self.total_paused += elapsed;
        if let Some(expires_at) = self.expires_at {
            self.expires_at = Some(expires_at + elapsed);
        }
        self.pause_start_time = None;
        self.state = SessionState::Active;
        self.pending_events.push(Event::SessionResumed {
            session_id: self.id,
        });
        Ok(())
    }

    /// `Active -> Completed`. Completing directly from `Paused` is
    /// rejected; callers must resume first so pause accounting closes.
    /// Terminal: a completed session is immutable.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.state != SessionState::Active {
            return Err(TransitionError {
                action: "complete",
                state: self.state,
            });
        }
        self.state = SessionState::Completed;
        self.end_time = Some(now);
        self.pending_events.push(Event::SessionCompleted {
            session_id: self.id,
            user_id: self.user_id,
            kind: self.kind,
        });
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// True iff the session is active and its deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Active
            && self.expires_at.map_or(false, |deadline| deadline <= now)
    }

    /// Take ownership of the events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending_events)
    }
}

fn clamp_non_negative(delta: Duration) -> Duration {
    if delta < Duration::zero() {
        Duration::zero()
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn work_session() -> PomodoroSession {
        PomodoroSession::new(
            Uuid::new_v4(),
            None,
            SessionKind::Work,
            SessionKind::Work.default_duration(),
        )
    }

    #[test]
    fn start_sets_deadline() {
        let mut s = work_session();
        s.start(t0()).unwrap();
        assert_eq!(s.state, SessionState::Active);
        assert_eq!(s.start_time, Some(t0()));
        assert_eq!(s.expires_at, Some(t0() + Duration::minutes(25)));
    }

    #[test]
    fn double_start_fails_without_side_effects() {
        let mut s = work_session();
        s.start(t0()).unwrap();
        let err = s.start(t0() + Duration::minutes(1)).unwrap_err();
        assert_eq!(err.action, "start");
        assert_eq!(err.state, SessionState::Active);
        // First start's timestamps survive untouched.
        assert_eq!(s.start_time, Some(t0()));
        assert_eq!(s.expires_at, Some(t0() + Duration::minutes(25)));
    }

    #[test]
    fn pause_leaves_deadline_untouched() {
        let mut s = work_session();
        s.start(t0()).unwrap();
        s.pause(t0() + Duration::minutes(10)).unwrap();
        assert_eq!(s.state, SessionState::Paused);
        assert_eq!(s.pause_start_time, Some(t0() + Duration::minutes(10)));
        assert_eq!(s.expires_at, Some(t0() + Duration::minutes(25)));
    }

    #[test]
    fn resume_shifts_deadline_by_pause_interval() {
        // 25m session started at T0, paused at T0+10m for 5m:
        // deadline must land at T0+30m, not T0+25m.
        let mut s = work_session();
        s.start(t0()).unwrap();
        s.pause(t0() + Duration::minutes(10)).unwrap();
        s.resume(t0() + Duration::minutes(15)).unwrap();
        assert_eq!(s.state, SessionState::Active);
        assert_eq!(s.expires_at, Some(t0() + Duration::minutes(30)));
        assert_eq!(s.total_paused, Duration::minutes(5));
        assert_eq!(s.pause_start_time, None);
    }

    #[test]
    fn repeated_pause_cycles_accumulate() {
        let mut s = work_session();
        s.start(t0()).unwrap();
        s.pause(t0() + Duration::minutes(5)).unwrap();
        s.resume(t0() + Duration::minutes(8)).unwrap();
        s.pause(t0() + Duration::minutes(12)).unwrap();
        s.resume(t0() + Duration::minutes(14)).unwrap();
        assert_eq!(s.total_paused, Duration::minutes(5));
        assert_eq!(s.expires_at, Some(t0() + Duration::minutes(30)));
    }

    #[test]
    fn resume_clamps_clock_skew_to_zero() {
        let mut s = work_session();
        s.start(t0()).unwrap();
        s.pause(t0() + Duration::minutes(10)).unwrap();
        // Clock went backwards; the deadline must not move backward.
        s.resume(t0() + Duration::minutes(9)).unwrap();
        assert_eq!(s.total_paused, Duration::zero());
        assert_eq!(s.expires_at, Some(t0() + Duration::minutes(25)));
    }

    #[test]
    fn complete_from_paused_is_rejected() {
        let mut s = work_session();
        s.start(t0()).unwrap();
        s.pause(t0() + Duration::minutes(10)).unwrap();
        let err = s.complete(t0() + Duration::minutes(11)).unwrap_err();
        assert_eq!(err.action, "complete");
        assert_eq!(err.state, SessionState::Paused);
        assert_eq!(s.state, SessionState::Paused);
        assert_eq!(s.end_time, None);
    }

    #[test]
    fn completed_is_terminal() {
        let mut s = work_session();
        s.start(t0()).unwrap();
        s.complete(t0() + Duration::minutes(25)).unwrap();
        assert_eq!(s.state, SessionState::Completed);
        assert_eq!(s.end_time, Some(t0() + Duration::minutes(25)));
        assert!(s.start(t0()).is_err());
        assert!(s.pause(t0()).is_err());
        assert!(s.resume(t0()).is_err());
        assert!(s.complete(t0()).is_err());
    }

    #[test]
    fn full_round_trip_accounts_for_every_pause() {
        let mut s = work_session();
        s.start(t0()).unwrap();
        s.pause(t0() + Duration::minutes(10)).unwrap();
        s.resume(t0() + Duration::minutes(15)).unwrap();
        s.pause(t0() + Duration::minutes(20)).unwrap();
        s.resume(t0() + Duration::minutes(22)).unwrap();
        s.complete(t0() + Duration::minutes(32)).unwrap();
        assert_eq!(s.state, SessionState::Completed);
        assert_eq!(s.total_paused, Duration::minutes(7));

        let events: Vec<_> = s.drain_events();
        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        use crate::events::EventKind as K;
        assert_eq!(
            kinds,
            vec![
                K::SessionStarted,
                K::SessionPaused,
                K::SessionResumed,
                K::SessionPaused,
                K::SessionResumed,
                K::SessionCompleted,
            ]
        );
        // Drain empties the buffer.
        assert!(s.drain_events().is_empty());
    }

    #[test]
    fn expiry_is_a_query_not_a_transition() {
        let mut s = work_session();
        assert!(!s.is_expired(t0() + Duration::hours(1)));
        s.start(t0()).unwrap();
        assert!(!s.is_expired(t0() + Duration::minutes(24)));
        assert!(s.is_expired(t0() + Duration::minutes(25)));
        s.complete(t0() + Duration::minutes(25)).unwrap();
        assert!(!s.is_expired(t0() + Duration::hours(1)));
    }
}

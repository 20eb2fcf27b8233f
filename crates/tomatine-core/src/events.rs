//! Domain events.
//!
//! Every session transition produces an event; the six variants below
//! are the system's observable output stream. Subscribers (logging,
//! reminders, escalation, delivery) bind to this feed rather than to
//! internal state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionKind;

/// Immutable, value-typed domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: Uuid,
        user_id: Uuid,
        kind: SessionKind,
    },
    SessionCompleted {
        session_id: Uuid,
        user_id: Uuid,
        kind: SessionKind,
    },
    SessionPaused {
        session_id: Uuid,
    },
    SessionResumed {
        session_id: Uuid,
    },
    /// Emitted by the sweep, in addition to `SessionCompleted`, when a
    /// completion was triggered by the deadline rather than the user.
    SessionExpired {
        session_id: Uuid,
        user_id: Uuid,
    },
    /// A due reminder fired while the user had no active session.
    NudgeUser {
        user_id: Uuid,
        chat_id: String,
        escalation_count: u32,
        kind: SessionKind,
    },
}

/// Discriminant used as the event-bus registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    SessionCompleted,
    SessionPaused,
    SessionResumed,
    SessionExpired,
    NudgeUser,
}

impl EventKind {
    /// All event kinds, in a stable order. Handy for handlers that
    /// subscribe to the whole feed.
    pub const ALL: [EventKind; 6] = [
        EventKind::SessionStarted,
        EventKind::SessionCompleted,
        EventKind::SessionPaused,
        EventKind::SessionResumed,
        EventKind::SessionExpired,
        EventKind::NudgeUser,
    ];
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::SessionStarted { .. } => EventKind::SessionStarted,
            Event::SessionCompleted { .. } => EventKind::SessionCompleted,
            Event::SessionPaused { .. } => EventKind::SessionPaused,
            Event::SessionResumed { .. } => EventKind::SessionResumed,
            Event::SessionExpired { .. } => EventKind::SessionExpired,
            Event::NudgeUser { .. } => EventKind::NudgeUser,
        }
    }
}

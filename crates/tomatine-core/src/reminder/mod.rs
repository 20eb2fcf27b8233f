//! Reminder records and the reminder lifecycle.
//!
//! A reminder is a scheduled future check-in, independent of any
//! specific session. Reminders are created pending, and end up either
//! triggered (the sweep fired them) or cancelled (the user started a
//! session). Never resurrected.
//!
//! Firing is sweep-driven: there is no per-reminder timer, so
//! cancellation is a pure state transition with no cleanup obligation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::EventHandler;
use crate::clock::Clock;
use crate::config::EscalationConfig;
use crate::error::{CoreError, StoreError};
use crate::events::Event;
use crate::session::SessionKind;
use crate::storage::{ReminderStore, SessionStore, UserStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderState {
    Pending,
    Triggered,
    Cancelled,
}

impl ReminderState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderState::Pending => "pending",
            ReminderState::Triggered => "triggered",
            ReminderState::Cancelled => "cancelled",
        }
    }
}

/// A scheduled future check-in for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
    /// Mutable only while pending.
    pub send_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub state: ReminderState,
    /// Step number within one escalation chain; non-decreasing across
    /// the chain.
    pub escalation_count: u32,
}

impl Reminder {
    pub fn new(
        user_id: Uuid,
        chat_id: String,
        send_at: DateTime<Utc>,
        escalation_count: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            chat_id,
            created_at: now,
            send_at,
            triggered_at: None,
            state: ReminderState::Pending,
            escalation_count,
        }
    }
}

/// Schedules, cancels, and fires reminders; the bridge between session
/// lifecycle events and the escalation loop.
pub struct ReminderService {
    reminders: Arc<dyn ReminderStore>,
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    policy: EscalationConfig,
}

impl ReminderService {
    pub fn new(
        reminders: Arc<dyn ReminderStore>,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        policy: EscalationConfig,
    ) -> Self {
        Self {
            reminders,
            sessions,
            users,
            clock,
            policy,
        }
    }

    /// Insert a pending reminder. Multiple pending reminders per user
    /// are possible but undesirable; cancellation prevents pile-up.
    pub fn schedule(
        &self,
        user_id: Uuid,
        chat_id: &str,
        send_at: DateTime<Utc>,
        escalation_count: u32,
    ) -> Result<Reminder, StoreError> {
        let reminder = Reminder::new(
            user_id,
            chat_id.to_string(),
            send_at,
            escalation_count,
            self.clock.now(),
        );
        self.reminders.insert_reminder(&reminder)?;
        tracing::debug!(
            user = %user_id,
            send_at = %send_at,
            escalation = escalation_count,
            "reminder scheduled"
        );
        Ok(reminder)
    }

    /// Cancel every pending reminder for the user. Idempotent.
    pub fn cancel_for_user(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let cancelled = self.reminders.cancel_pending_for_user(user_id)?;
        if cancelled > 0 {
            tracing::debug!(user = %user_id, count = cancelled, "pending reminders cancelled");
        }
        Ok(cancelled)
    }

    /// Schedule the first "did you continue?" probe after a completed
    /// session.
    pub fn schedule_follow_up(&self, user_id: Uuid) -> Result<Reminder, CoreError> {
        let user = self
            .users
            .get_user(user_id)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })?;
        let send_at = self.clock.now() + self.policy.follow_up_delay();
        Ok(self.schedule(user_id, &user.chat_id, send_at, 1)?)
    }

    /// Fire every due pending reminder. Each is marked triggered; a
    /// nudge event is produced only when the user has no active session
    /// (they are not already engaged). Errors are isolated per item so
    /// one bad record never aborts the batch.
    pub fn fire_due(&self) -> Result<Vec<Event>, StoreError> {
        let now = self.clock.now();
        let due = self.reminders.due_reminders(now)?;
        let mut nudges = Vec::new();

        for reminder in due {
            match self.fire_one(&reminder, now) {
                Ok(Some(event)) => nudges.push(event),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(reminder = %reminder.id, %err, "failed to fire reminder");
                }
            }
        }
        Ok(nudges)
    }

    fn fire_one(
        &self,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<Option<Event>, StoreError> {
        self.reminders.mark_triggered(reminder.id, now)?;

        if self
            .sessions
            .active_session_for_user(reminder.user_id)?
            .is_some()
        {
            // Already engaged; no nudge.
            return Ok(None);
        }

        Ok(Some(Event::NudgeUser {
            user_id: reminder.user_id,
            chat_id: reminder.chat_id.clone(),
            escalation_count: reminder.escalation_count,
            kind: SessionKind::Work,
        }))
    }
}

/// Event-bus subscriber tying reminders to the session lifecycle:
/// a started session cancels every pending reminder for its user, and a
/// completed session schedules the first follow-up probe.
pub struct ReminderLifecycle {
    service: Arc<ReminderService>,
}

impl ReminderLifecycle {
    pub fn new(service: Arc<ReminderService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for ReminderLifecycle {
    fn name(&self) -> &'static str {
        "reminder-lifecycle"
    }

    async fn handle(&self, event: &Event) -> Result<(), CoreError> {
        match event {
            Event::SessionStarted { user_id, .. } => {
                self.service.cancel_for_user(*user_id)?;
                Ok(())
            }
            Event::SessionCompleted { user_id, .. } => {
                self.service.schedule_follow_up(*user_id)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

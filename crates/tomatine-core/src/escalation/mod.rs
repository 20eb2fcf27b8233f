//! Escalation negotiation loop.
//!
//! Consumes `NudgeUser` events: gathers a context snapshot, asks the
//! decision oracle what to do, and interprets the answer -- send a
//! message, reschedule a check-in, or propose starting a session.
//! A fixed cap bounds the chain; past the cap the user is told the
//! nudging pauses for today and the chain restarts tomorrow.

mod action;
mod context;

pub use action::{parse_delay, AgentAction, DecisionOracle, StaticOracle};
pub use context::{
    format_local_time, format_local_timestamp, local_day_bounds, resolve_tz, NudgeContext,
};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::bus::EventHandler;
use crate::clock::Clock;
use crate::config::EscalationConfig;
use crate::error::CoreError;
use crate::events::Event;
use crate::integrations::{Notifier, SendOptions};
use crate::reminder::ReminderService;
use crate::storage::{SessionStore, UserStore};

/// Escalation count a restarted chain begins with.
const RESET_ESCALATION_COUNT: u32 = 0;

const PAUSE_FOR_TODAY_TEXT: &str =
    "Alright, I'll stop nagging you for today. Let's try again tomorrow.";

const START_BUTTON_LABEL: &str = "Start a session";

/// Handles `NudgeUser` events end to end.
pub struct EscalationCoordinator {
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    reminders: Arc<ReminderService>,
    notifier: Arc<dyn Notifier>,
    oracle: Arc<dyn DecisionOracle>,
    clock: Arc<dyn Clock>,
    policy: EscalationConfig,
}

impl EscalationCoordinator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        reminders: Arc<ReminderService>,
        notifier: Arc<dyn Notifier>,
        oracle: Arc<dyn DecisionOracle>,
        clock: Arc<dyn Clock>,
        policy: EscalationConfig,
    ) -> Self {
        Self {
            sessions,
            users,
            reminders,
            notifier,
            oracle,
            clock,
            policy,
        }
    }

    async fn handle_nudge(
        &self,
        user_id: Uuid,
        chat_id: &str,
        escalation_count: u32,
    ) -> Result<(), CoreError> {
        if escalation_count >= self.policy.max_escalations {
            return self.pause_for_today(user_id, chat_id).await;
        }

        let context = self.build_context(user_id, escalation_count)?;

        let action = match self.oracle.decide(&context).await {
            Ok(action) => action,
            Err(err) => {
                // Fail-safe: a broken oracle must not keep the chain
                // alive, so nothing further is scheduled this cycle.
                tracing::warn!(user = %user_id, %err, "oracle failed, skipping escalation step");
                return Ok(());
            }
        };

        self.interpret(user_id, chat_id, escalation_count, action)
            .await
    }

    /// Terminal branch of the chain: one fixed message, one reminder
    /// ~24h out with the count reset so tomorrow starts cleanly.
    async fn pause_for_today(&self, user_id: Uuid, chat_id: &str) -> Result<(), CoreError> {
        self.send_best_effort(chat_id, PAUSE_FOR_TODAY_TEXT, &SendOptions::default())
            .await;
        self.reminders.schedule(
            user_id,
            chat_id,
            self.clock.now() + Duration::hours(24),
            RESET_ESCALATION_COUNT,
        )?;
        tracing::info!(user = %user_id, "escalation cap reached, chain parked until tomorrow");
        Ok(())
    }

    fn build_context(
        &self,
        user_id: Uuid,
        escalation_count: u32,
    ) -> Result<NudgeContext, CoreError> {
        let user = self
            .users
            .get_user(user_id)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })?;

        let tz = resolve_tz(&user.timezone);
        let now = self.clock.now();
        let (day_start, day_end) = local_day_bounds(now, tz);

        let sessions_completed_today =
            self.sessions
                .completed_work_sessions_between(user_id, day_start, day_end)?;
        let last_activity = self
            .sessions
            .last_completed_session(user_id)?
            .and_then(|s| s.end_time)
            .map(|t| format_local_timestamp(t, tz))
            .unwrap_or_default();

        Ok(NudgeContext {
            sessions_completed_today,
            current_local_time: format_local_time(now, tz),
            state_label: "idle".to_string(),
            last_activity,
            escalations_today: escalation_count,
            desired_sessions_per_day: user.desired_sessions_per_day,
            transcript: None,
        })
    }

    async fn interpret(
        &self,
        user_id: Uuid,
        chat_id: &str,
        escalation_count: u32,
        action: AgentAction,
    ) -> Result<(), CoreError> {
        match action {
            AgentAction::Message { text, buttons } => {
                let options = match buttons {
                    Some(buttons) => SendOptions::with_buttons(buttons),
                    None => SendOptions::default(),
                };
                self.send_best_effort(chat_id, &text, &options).await;
                // Escalation continues whether or not the user replies;
                // only a started session cancels the chain.
                self.reminders.schedule(
                    user_id,
                    chat_id,
                    self.send_at(self.policy.next_check_delay()),
                    escalation_count + 1,
                )?;
            }
            AgentAction::ScheduleNext { delay } => {
                let delay = parse_delay(&delay, self.policy.fallback_delay());
                self.reminders.schedule(
                    user_id,
                    chat_id,
                    self.send_at(delay),
                    escalation_count + 1,
                )?;
            }
            AgentAction::StartSession { duration_minutes } => {
                let minutes = duration_minutes.unwrap_or(25);
                let text = format!("Ready for a {minutes}-minute focus session?");
                self.send_best_effort(
                    chat_id,
                    &text,
                    &SendOptions::with_buttons(vec![START_BUTTON_LABEL.to_string()]),
                )
                .await;
                // No reminder here: starting cancels pending ones, and
                // declining falls back to normal user-driven flow.
            }
        }
        Ok(())
    }

    /// `now + delta`, substituting the fallback delay when the sum
    /// leaves the representable range. The delta can come from the
    /// oracle via `parse_delay`, so it may be astronomically large.
    fn send_at(&self, delta: Duration) -> DateTime<Utc> {
        let now = self.clock.now();
        now.checked_add_signed(delta)
            .or_else(|| now.checked_add_signed(self.policy.fallback_delay()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Deliver without retrying; failure is logged and otherwise
    /// ignored. The timeout boundary belongs to the notifier.
    async fn send_best_effort(&self, chat_id: &str, text: &str, options: &SendOptions) {
        if let Err(err) = self.notifier.send(chat_id, text, options).await {
            tracing::warn!(notifier = self.notifier.name(), %err, "delivery failed");
        }
    }
}

#[async_trait]
impl EventHandler for EscalationCoordinator {
    fn name(&self) -> &'static str {
        "escalation-coordinator"
    }

    async fn handle(&self, event: &Event) -> Result<(), CoreError> {
        match event {
            Event::NudgeUser {
                user_id,
                chat_id,
                escalation_count,
                ..
            } => self.handle_nudge(*user_id, chat_id, *escalation_count).await,
            _ => Ok(()),
        }
    }
}

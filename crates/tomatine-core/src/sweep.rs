//! Periodic sweep.
//!
//! One fixed-interval background pass drives both expiry detection and
//! reminder firing. The sweep never trusts a single bad record: every
//! item is processed under its own error boundary, so one corrupt row
//! cannot abort the batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::events::Event;
use crate::reminder::ReminderService;
use crate::session::PomodoroSession;
use crate::storage::SessionStore;

/// What one pass accomplished.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Sessions completed because their deadline passed.
    pub expired_sessions: usize,
    /// Nudge events published from due reminders.
    pub nudges_fired: usize,
}

pub struct Sweeper {
    sessions: Arc<dyn SessionStore>,
    reminders: Arc<ReminderService>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl Sweeper {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        reminders: Arc<ReminderService>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            reminders,
            bus,
            clock,
        }
    }

    /// Run forever at the given interval.
    pub async fn run(&self, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let summary = self.sweep_once().await;
            if summary.expired_sessions > 0 || summary.nudges_fired > 0 {
                tracing::info!(
                    expired = summary.expired_sessions,
                    nudges = summary.nudges_fired,
                    "sweep pass"
                );
            }
        }
    }

    /// One pass: complete overdue sessions, then fire due reminders.
    pub async fn sweep_once(&self) -> SweepSummary {
        let now = self.clock.now();
        let mut summary = SweepSummary::default();

        match self.sessions.expired_active_sessions(now) {
            Ok(expired) => {
                for session in expired {
                    match self.expire_session(session, now).await {
                        Ok(()) => summary.expired_sessions += 1,
                        Err(err) => {
                            tracing::warn!(%err, "failed to expire session");
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to list expired sessions");
            }
        }

        match self.reminders.fire_due() {
            Ok(nudges) => {
                summary.nudges_fired = nudges.len();
                for nudge in &nudges {
                    self.bus.publish(nudge).await;
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to fire due reminders");
            }
        }

        summary
    }

    /// Deadline completion: the generic `SessionCompleted` is emitted
    /// by `complete()`, then `SessionExpired` marks that this
    /// completion came from the sweep, not the user.
    async fn expire_session(
        &self,
        mut session: PomodoroSession,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        session.complete(now)?;
        self.sessions.update_session(&session)?;
        self.bus.publish_all(session.drain_events()).await;
        self.bus
            .publish(&Event::SessionExpired {
                session_id: session.id,
                user_id: session.user_id,
            })
            .await;
        Ok(())
    }
}

//! Session use cases.
//!
//! Entry points the outer surface (HTTP handler, chat callback) calls
//! to drive the state machine. Each one loads, transitions, persists,
//! then publishes the drained events in append order. Transition
//! failures surface to the caller; nothing is published when a
//! transition is rejected.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::session::{PomodoroSession, SessionKind};
use crate::storage::SessionStore;

pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(sessions: Arc<dyn SessionStore>, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions,
            bus,
            clock,
        }
    }

    /// Create and immediately start a session. `duration_minutes`
    /// overrides the kind's default.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        task_id: Option<Uuid>,
        kind: SessionKind,
        duration_minutes: Option<u32>,
    ) -> Result<PomodoroSession> {
        let duration = duration_minutes
            .map(|m| Duration::minutes(i64::from(m)))
            .unwrap_or_else(|| kind.default_duration());
        let mut session = PomodoroSession::new(user_id, task_id, kind, duration);
        session.start(self.clock.now())?;
        self.sessions.insert_session(&session)?;
        self.publish_drained(&mut session).await;
        Ok(session)
    }

    pub async fn pause_session(&self, id: Uuid) -> Result<PomodoroSession> {
        self.transition(id, |session, now| session.pause(now)).await
    }

    pub async fn resume_session(&self, id: Uuid) -> Result<PomodoroSession> {
        self.transition(id, |session, now| session.resume(now)).await
    }

    pub async fn complete_session(&self, id: Uuid) -> Result<PomodoroSession> {
        self.transition(id, |session, now| session.complete(now))
            .await
    }

    async fn transition<F>(&self, id: Uuid, apply: F) -> Result<PomodoroSession>
    where
        F: FnOnce(
            &mut PomodoroSession,
            chrono::DateTime<chrono::Utc>,
        ) -> std::result::Result<(), crate::error::TransitionError>,
    {
        let mut session = self
            .sessions
            .get_session(id)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "session",
                id: id.to_string(),
            })?;
        apply(&mut session, self.clock.now())?;
        self.sessions.update_session(&session)?;
        self.publish_drained(&mut session).await;
        Ok(session)
    }

    async fn publish_drained(&self, session: &mut PomodoroSession) {
        self.bus.publish_all(session.drain_events()).await;
    }
}

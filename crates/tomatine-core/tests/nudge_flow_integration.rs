//! Integration tests for the full nudge pipeline: session transitions
//! feed the event bus, the sweep detects expiry and fires reminders,
//! and the escalation coordinator turns nudges into oracle-driven
//! actions.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use tomatine_core::{
    AgentAction, CoreError, DecisionOracle, EscalationConfig, EscalationCoordinator, Event,
    EventBus, EventHandler, EventKind, ManualClock, NudgeContext, OracleError, Notifier,
    ReminderLifecycle, ReminderService, ReminderStore, SendOptions, SessionKind, SessionService,
    SqliteStore, Sweeper, User, UserStore,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

// ── Test doubles ─────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, Option<Vec<String>>)>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, String, Option<Vec<String>>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), tomatine_core::DeliveryError> {
        self.sent.lock().unwrap().push((
            chat_id.to_string(),
            text.to_string(),
            options.buttons.clone(),
        ));
        Ok(())
    }
}

struct ScriptedOracle {
    action: AgentAction,
    calls: Mutex<u32>,
}

impl ScriptedOracle {
    fn new(action: AgentAction) -> Self {
        Self {
            action,
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, _context: &NudgeContext) -> Result<AgentAction, OracleError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.action.clone())
    }
}

struct BrokenOracle;

#[async_trait]
impl DecisionOracle for BrokenOracle {
    async fn decide(&self, _context: &NudgeContext) -> Result<AgentAction, OracleError> {
        Err(OracleError::NotConfigured)
    }
}

struct Collector {
    events: Arc<Mutex<Vec<Event>>>,
}

#[async_trait]
impl EventHandler for Collector {
    fn name(&self) -> &'static str {
        "collector"
    }

    async fn handle(&self, event: &Event) -> Result<(), CoreError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────

struct Harness {
    store: Arc<SqliteStore>,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
    reminders: Arc<ReminderService>,
    sessions: SessionService,
    sweeper: Sweeper,
    events: Arc<Mutex<Vec<Event>>>,
    user: User,
}

impl Harness {
    fn new(oracle: Arc<dyn DecisionOracle>) -> Self {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = EscalationConfig::default();

        let user = User::new("chat-1".into(), "Europe/Berlin".into(), t0());
        store.upsert_user(&user).unwrap();

        let reminders = Arc::new(ReminderService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
            policy.clone(),
        ));
        let lifecycle = Arc::new(ReminderLifecycle::new(reminders.clone()));
        let coordinator = Arc::new(EscalationCoordinator::new(
            store.clone(),
            store.clone(),
            reminders.clone(),
            notifier.clone(),
            oracle,
            clock.clone(),
            policy,
        ));

        let events = Arc::new(Mutex::new(Vec::new()));
        let bus = Arc::new(
            EventBus::builder()
                .register_all(Arc::new(Collector {
                    events: Arc::clone(&events),
                }))
                .register(EventKind::SessionStarted, lifecycle.clone())
                .register(EventKind::SessionCompleted, lifecycle)
                .register(EventKind::NudgeUser, coordinator)
                .build(),
        );

        let sessions = SessionService::new(store.clone(), bus.clone(), clock.clone());
        let sweeper = Sweeper::new(store.clone(), reminders.clone(), bus, clock.clone());

        Self {
            store,
            clock,
            notifier,
            reminders,
            sessions,
            sweeper,
            events,
            user,
        }
    }

    fn observed(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    fn pending(&self) -> Vec<tomatine_core::Reminder> {
        self.store.pending_reminders_for_user(self.user.id).unwrap()
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_expires_overdue_session_with_both_events_exactly_once() {
    let harness = Harness::new(Arc::new(ScriptedOracle::new(AgentAction::ScheduleNext {
        delay: "15m".into(),
    })));

    harness
        .sessions
        .create_session(harness.user.id, None, SessionKind::Work, None)
        .await
        .unwrap();

    // Not yet due: nothing happens.
    harness.clock.advance(Duration::minutes(24));
    let summary = harness.sweeper.sweep_once().await;
    assert_eq!(summary.expired_sessions, 0);

    harness.clock.advance(Duration::minutes(1));
    let summary = harness.sweeper.sweep_once().await;
    assert_eq!(summary.expired_sessions, 1);
    assert_eq!(harness.observed(EventKind::SessionCompleted), 1);
    assert_eq!(harness.observed(EventKind::SessionExpired), 1);

    // Completion scheduled the first follow-up probe.
    let pending = harness.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].escalation_count, 1);

    // The next sweep must not expire it again.
    let summary = harness.sweeper.sweep_once().await;
    assert_eq!(summary.expired_sessions, 0);
    assert_eq!(harness.observed(EventKind::SessionExpired), 1);
}

#[tokio::test]
async fn pause_shifts_the_deadline_past_the_naive_expiry() {
    let harness = Harness::new(Arc::new(ScriptedOracle::new(AgentAction::ScheduleNext {
        delay: "15m".into(),
    })));

    let session = harness
        .sessions
        .create_session(harness.user.id, None, SessionKind::Work, Some(25))
        .await
        .unwrap();

    harness.clock.advance(Duration::minutes(10));
    harness.sessions.pause_session(session.id).await.unwrap();
    harness.clock.advance(Duration::minutes(5));
    harness.sessions.resume_session(session.id).await.unwrap();

    // T0+26m: a naive 25m deadline would have passed, but 5m were paused.
    harness.clock.set(t0() + Duration::minutes(26));
    let summary = harness.sweeper.sweep_once().await;
    assert_eq!(summary.expired_sessions, 0);

    harness.clock.set(t0() + Duration::minutes(30));
    let summary = harness.sweeper.sweep_once().await;
    assert_eq!(summary.expired_sessions, 1);
}

#[tokio::test]
async fn reminder_during_active_session_never_nudges() {
    let oracle = Arc::new(ScriptedOracle::new(AgentAction::ScheduleNext {
        delay: "15m".into(),
    }));
    let harness = Harness::new(oracle.clone());

    harness
        .reminders
        .schedule(harness.user.id, "chat-1", t0(), 1)
        .unwrap();
    harness
        .sessions
        .create_session(harness.user.id, None, SessionKind::Work, None)
        .await
        .unwrap();

    // Starting cancelled the pending reminder entirely.
    assert!(harness.pending().is_empty());

    // A reminder that somehow fires mid-session stays quiet too.
    harness
        .reminders
        .schedule(harness.user.id, "chat-1", t0(), 1)
        .unwrap();
    let summary = harness.sweeper.sweep_once().await;
    assert_eq!(summary.nudges_fired, 0);
    assert_eq!(harness.observed(EventKind::NudgeUser), 0);
    assert_eq!(oracle.calls(), 0);
    assert!(harness.pending().is_empty()); // consumed, marked triggered
}

#[tokio::test]
async fn message_action_sends_and_schedules_next_check() {
    let oracle = Arc::new(ScriptedOracle::new(AgentAction::Message {
        text: "Time for one more?".into(),
        buttons: Some(vec!["Sure".into()]),
    }));
    let harness = Harness::new(oracle.clone());

    harness
        .reminders
        .schedule(harness.user.id, "chat-1", t0(), 1)
        .unwrap();
    let summary = harness.sweeper.sweep_once().await;
    assert_eq!(summary.nudges_fired, 1);
    assert_eq!(oracle.calls(), 1);

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "chat-1");
    assert_eq!(sent[0].1, "Time for one more?");
    assert_eq!(sent[0].2.as_deref(), Some(&["Sure".to_string()][..]));

    // Escalation continues: next check 10 minutes out, count bumped.
    let pending = harness.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].escalation_count, 2);
    assert_eq!(pending[0].send_at, t0() + Duration::minutes(10));
}

#[tokio::test]
async fn schedule_next_action_parses_delay_with_fallback() {
    let oracle = Arc::new(ScriptedOracle::new(AgentAction::ScheduleNext {
        delay: "nonsense".into(),
    }));
    let harness = Harness::new(oracle);

    harness
        .reminders
        .schedule(harness.user.id, "chat-1", t0(), 2)
        .unwrap();
    harness.sweeper.sweep_once().await;

    // Unrecognized delay falls back to 15 minutes.
    let pending = harness.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].send_at, t0() + Duration::minutes(15));
    assert_eq!(pending[0].escalation_count, 3);
    // No message for a pure reschedule.
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn astronomical_delay_from_oracle_is_clamped_to_fallback() {
    // Parses as a valid Duration but overflows any reachable date.
    let oracle = Arc::new(ScriptedOracle::new(AgentAction::ScheduleNext {
        delay: "100000000000000m".into(),
    }));
    let harness = Harness::new(oracle);

    harness
        .reminders
        .schedule(harness.user.id, "chat-1", t0(), 1)
        .unwrap();
    let summary = harness.sweeper.sweep_once().await;
    assert_eq!(summary.nudges_fired, 1);

    let pending = harness.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].send_at, t0() + Duration::minutes(15));
    assert_eq!(pending[0].escalation_count, 2);
}

#[tokio::test]
async fn start_session_action_prompts_without_scheduling() {
    let oracle = Arc::new(ScriptedOracle::new(AgentAction::StartSession {
        duration_minutes: Some(50),
    }));
    let harness = Harness::new(oracle);

    harness
        .reminders
        .schedule(harness.user.id, "chat-1", t0(), 1)
        .unwrap();
    harness.sweeper.sweep_once().await;

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("50-minute"));
    assert!(sent[0].2.is_some());
    assert!(harness.pending().is_empty());
}

#[tokio::test]
async fn escalation_cap_sends_once_and_parks_until_tomorrow() {
    let oracle = Arc::new(ScriptedOracle::new(AgentAction::Message {
        text: "should not be used".into(),
        buttons: None,
    }));
    let harness = Harness::new(oracle.clone());
    let max = EscalationConfig::default().max_escalations;

    harness
        .reminders
        .schedule(harness.user.id, "chat-1", t0(), max)
        .unwrap();
    harness.sweeper.sweep_once().await;

    // The oracle is never consulted in the terminal branch.
    assert_eq!(oracle.calls(), 0);
    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);

    let pending = harness.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].escalation_count, 0);
    assert_eq!(pending[0].send_at, t0() + Duration::hours(24));
}

#[tokio::test]
async fn broken_oracle_drops_the_chain() {
    let harness = Harness::new(Arc::new(BrokenOracle));

    harness
        .reminders
        .schedule(harness.user.id, "chat-1", t0(), 1)
        .unwrap();
    let summary = harness.sweeper.sweep_once().await;

    // The nudge fired, but the step was skipped: no message, nothing
    // scheduled, no runaway loop.
    assert_eq!(summary.nudges_fired, 1);
    assert!(harness.notifier.sent().is_empty());
    assert!(harness.pending().is_empty());
}

#[tokio::test]
async fn starting_a_session_cancels_every_pending_reminder() {
    let harness = Harness::new(Arc::new(ScriptedOracle::new(AgentAction::ScheduleNext {
        delay: "15m".into(),
    })));

    for offset in [10, 20, 30] {
        harness
            .reminders
            .schedule(
                harness.user.id,
                "chat-1",
                t0() + Duration::minutes(offset),
                1,
            )
            .unwrap();
    }
    assert_eq!(harness.pending().len(), 3);

    harness
        .sessions
        .create_session(harness.user.id, None, SessionKind::Work, None)
        .await
        .unwrap();
    assert!(harness.pending().is_empty());
}

//! Tomatine background worker.
//!
//! Wires the event bus once at startup (logging, reminder lifecycle,
//! escalation), then runs the periodic sweep that completes expired
//! sessions and fires due reminders.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use tomatine_core::{
    Clock, Config, DecisionOracle, EscalationCoordinator, EventBus, EventKind, EventLogger,
    HttpOracle, NoopNotifier, Notifier, ReminderLifecycle, ReminderService, SqliteStore,
    StaticOracle, Sweeper, SystemClock,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;
    let store = Arc::new(SqliteStore::open()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let notifier: Arc<dyn Notifier> = match &config.telegram.bot_token {
        Some(token) => Arc::new(tomatine_core::TelegramNotifier::new(token.clone())),
        None => {
            tracing::warn!("no telegram bot token configured; messages will be dropped");
            Arc::new(NoopNotifier)
        }
    };

    let oracle: Arc<dyn DecisionOracle> = match &config.oracle.endpoint {
        Some(endpoint) => Arc::new(HttpOracle::new(endpoint.clone())),
        None => {
            tracing::warn!("no oracle endpoint configured; using a static 15m schedule");
            Arc::new(StaticOracle::new("15m"))
        }
    };

    let reminders = Arc::new(ReminderService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        config.escalation.clone(),
    ));
    let lifecycle = Arc::new(ReminderLifecycle::new(reminders.clone()));
    let coordinator = Arc::new(EscalationCoordinator::new(
        store.clone(),
        store.clone(),
        reminders.clone(),
        notifier,
        oracle,
        clock.clone(),
        config.escalation.clone(),
    ));

    let bus = Arc::new(
        EventBus::builder()
            .register_all(Arc::new(EventLogger))
            .register(EventKind::SessionStarted, lifecycle.clone())
            .register(EventKind::SessionCompleted, lifecycle)
            .register(EventKind::NudgeUser, coordinator)
            .build(),
    );

    let sweeper = Sweeper::new(store, reminders, bus, clock);
    tracing::info!(
        interval_secs = config.sweep.interval_secs,
        "worker started"
    );
    sweeper.run(config.sweep.interval()).await;
    Ok(())
}

//! # Tomatine Core Library
//!
//! Core business logic for Tomatine, a Pomodoro coach that tracks
//! focused-work sessions and nudges the user back on track when they
//! go idle.
//!
//! ## Architecture
//!
//! - **Session state machine**: `pending -> active -> (paused <->
//!   active) -> completed`, with pause time excluded from the deadline
//! - **Event bus**: in-process dispatcher built once at startup;
//!   session transitions emit domain events that every other component
//!   subscribes to
//! - **Reminders**: sweep-driven future check-ins; started sessions
//!   cancel them, completed sessions schedule the first probe
//! - **Escalation**: a capped negotiation loop that asks an external
//!   decision oracle what to say and when to check back
//! - **Storage**: SQLite behind repository traits; TOML configuration
//!
//! ## Key Components
//!
//! - [`PomodoroSession`]: the session state machine
//! - [`EventBus`]: frozen publish/subscribe dispatcher
//! - [`ReminderService`]: schedule/cancel/fire reminders
//! - [`EscalationCoordinator`]: consumes nudges, drives the oracle
//! - [`Sweeper`]: the periodic expiry + reminder pass

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod escalation;
pub mod events;
pub mod integrations;
pub mod reminder;
pub mod session;
pub mod storage;
pub mod sweep;
pub mod user;

pub use bus::{DispatchMode, EventBus, EventBusBuilder, EventHandler, EventLogger};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, EscalationConfig, OracleConfig, SweepConfig, TelegramConfig};
pub use error::{
    ConfigError, CoreError, DeliveryError, OracleError, Result, StoreError, TransitionError,
};
pub use escalation::{
    parse_delay, AgentAction, DecisionOracle, EscalationCoordinator, NudgeContext, StaticOracle,
};
pub use events::{Event, EventKind};
pub use integrations::{HttpOracle, NoopNotifier, Notifier, SendOptions, TelegramNotifier};
pub use reminder::{Reminder, ReminderLifecycle, ReminderService, ReminderState};
pub use session::{PomodoroSession, SessionKind, SessionService, SessionState};
pub use storage::{ReminderStore, SessionStore, SqliteStore, UserStore};
pub use sweep::{SweepSummary, Sweeper};
pub use user::User;

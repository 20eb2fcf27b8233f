//! Core error types for tomatine-core.
//!
//! One top-level [`CoreError`] plus focused sub-enums, all built on
//! thiserror. Delivery and oracle failures are recoverable by design:
//! callers log them and move on rather than aborting a sweep.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;

/// Core error type for tomatine-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A session transition precondition was violated. Surfaced to the
    /// caller; the session is left unchanged.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Storage-related errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A session/user/reminder id could not be resolved.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Notifier delivery failed. Logged and swallowed by the sweep.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Decision oracle failed or returned garbage. The escalation step
    /// is skipped for the cycle; nothing further is scheduled.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A session transition was requested from a state that does not allow it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot {action} a session in the '{state}' state")]
pub struct TransitionError {
    pub action: &'static str,
    pub state: SessionState,
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the database file
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A persisted row could not be mapped back to a domain value
    #[error("corrupt record {id}: {message}")]
    Corrupt { id: String, message: String },
}

/// Notifier delivery errors. Best-effort: never retried by the core.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The chat platform rejected the message
    #[error("notifier returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level failure
    #[error("notifier transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Decision oracle errors.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The oracle call itself failed
    #[error("oracle request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The oracle answered with something that is not a known action
    #[error("unparsable oracle response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// No oracle endpoint is configured
    #[error("oracle endpoint not configured")]
    NotConfigured,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

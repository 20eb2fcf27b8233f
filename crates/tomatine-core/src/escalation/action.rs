//! Decision-oracle actions and the delay grammar.

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::context::NudgeContext;
use crate::error::OracleError;

/// Exactly one action chosen by the decision oracle.
///
/// A tagged sum type: `type = "message"` without a text, or a schedule
/// without a delay, is unrepresentable and fails at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    /// Send a message, optionally with quick-reply buttons.
    Message {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buttons: Option<Vec<String>>,
    },
    /// Check back in after a relative delay ("15m", "1h", "tomorrow").
    ScheduleNext { delay: String },
    /// Propose starting a session right now.
    StartSession {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_minutes: Option<u32>,
    },
}

/// The black-box decision oracle. Given behavioral context, chooses the
/// next nudge action.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, context: &NudgeContext) -> Result<AgentAction, OracleError>;
}

/// Oracle that always answers with the same relative delay. Fallback
/// for running without a configured endpoint.
pub struct StaticOracle {
    delay: String,
}

impl StaticOracle {
    pub fn new(delay: impl Into<String>) -> Self {
        Self {
            delay: delay.into(),
        }
    }
}

#[async_trait]
impl DecisionOracle for StaticOracle {
    async fn decide(&self, _context: &NudgeContext) -> Result<AgentAction, OracleError> {
        Ok(AgentAction::ScheduleNext {
            delay: self.delay.clone(),
        })
    }
}

/// Parse a relative delay expression: `"<N>m"`, `"<N>h"`, or
/// `"tomorrow"` (+24h). Anything unrecognized, including magnitudes
/// that overflow a `Duration`, falls back to `fallback`. The expression
/// is oracle-controlled, so this must never panic.
pub fn parse_delay(expr: &str, fallback: Duration) -> Duration {
    let expr = expr.trim();
    if expr.eq_ignore_ascii_case("tomorrow") {
        return Duration::hours(24);
    }
    let Some(unit) = expr.chars().last() else {
        return fallback;
    };
    let digits = &expr[..expr.len() - unit.len_utf8()];
    let amount = match digits.parse::<i64>() {
        Ok(n) if n > 0 => n,
        _ => return fallback,
    };
    match unit {
        'm' => Duration::try_minutes(amount).unwrap_or(fallback),
        'h' => Duration::try_hours(amount).unwrap_or(fallback),
        _ => fallback,
    }
}

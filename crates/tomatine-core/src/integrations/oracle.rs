//! HTTP adapter for the decision oracle.
//!
//! POSTs the nudge context as JSON and expects exactly one tagged
//! action back. Anything unparsable is an [`OracleError::Malformed`],
//! which the escalation loop logs and drops.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::OracleError;
use crate::escalation::{AgentAction, DecisionOracle, NudgeContext};

pub struct HttpOracle {
    endpoint: String,
    client: Client,
}

impl HttpOracle {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: super::http_client(super::HTTP_TIMEOUT),
        }
    }
}

#[async_trait]
impl DecisionOracle for HttpOracle {
    async fn decide(&self, context: &NudgeContext) -> Result<AgentAction, OracleError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(context)
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        let action = serde_json::from_str(&body)?;
        Ok(action)
    }
}

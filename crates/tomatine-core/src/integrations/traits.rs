//! Notifier seam.

use async_trait::async_trait;

use crate::error::DeliveryError;

/// Per-message delivery options.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Quick-reply buttons rendered under the message.
    pub buttons: Option<Vec<String>>,
}

impl SendOptions {
    pub fn with_buttons(buttons: Vec<String>) -> Self {
        Self {
            buttons: Some(buttons),
        }
    }
}

/// Delivers a text message to a user-addressable channel.
///
/// Best-effort: the core performs no retry; a failed delivery is logged
/// by the caller and otherwise ignored.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), DeliveryError>;
}

/// Notifier that only logs. Used when no chat platform is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        _options: &SendOptions,
    ) -> Result<(), DeliveryError> {
        tracing::info!(chat = chat_id, text, "notifier disabled; message dropped");
        Ok(())
    }
}

//! Telegram integration -- deliver nudges via the Bot API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::traits::{Notifier, SendOptions};
use crate::error::DeliveryError;

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    token: String,
    base_url: String,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, TELEGRAM_API.to_string())
    }

    /// Point the notifier at a different API host (for tests).
    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            token,
            base_url,
            client: super::http_client(super::HTTP_TIMEOUT),
        }
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), DeliveryError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(buttons) = &options.buttons {
            let keyboard: Vec<Vec<serde_json::Value>> = buttons
                .iter()
                .map(|label| vec![json!({ "text": label, "callback_data": label })])
                .collect();
            body["reply_markup"] = json!({ "inline_keyboard": keyboard });
        }

        let resp = self
            .client
            .post(self.send_message_url())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Http { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_posts_to_send_message_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottoken/sendMessage")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_base_url("token".into(), server.url());
        notifier
            .send("42", "back to work?", &SendOptions::default())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn hung_server_times_out_instead_of_stalling() {
        // Accepts the connection into the backlog but never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let notifier = TelegramNotifier {
            token: "token".into(),
            base_url: format!("http://{addr}"),
            client: super::super::http_client(std::time::Duration::from_millis(200)),
        };
        let err = notifier
            .send("42", "hi", &SendOptions::default())
            .await
            .unwrap_err();
        match err {
            DeliveryError::Transport(e) => assert!(e.is_timeout() || e.is_connect()),
            other => panic!("expected a transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_error_maps_to_delivery_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bottoken/sendMessage")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_base_url("token".into(), server.url());
        let err = notifier
            .send("42", "hi", &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Http { status: 403, .. }));
    }
}

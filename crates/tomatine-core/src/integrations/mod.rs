//! External collaborators behind narrow seams: the chat notifier and
//! the HTTP decision-oracle adapter.

mod oracle;
mod telegram;
mod traits;

pub use oracle::HttpOracle;
pub use telegram::TelegramNotifier;
pub use traits::{NoopNotifier, Notifier, SendOptions};

use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Client with a bounded per-request timeout. Adapters run inside the
/// sweep's dispatch, so a hung remote must fail, not stall the loop.
fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

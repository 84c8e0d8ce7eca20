//! Operator notifications.
//!
//! Delivery is best-effort: [`notify_best_effort`] logs transport failures and
//! never lets them influence the sync itself.

pub mod messages;
pub mod telegram;

use async_trait::async_trait;
use thiserror::Error;

pub use self::telegram::TelegramNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request URL carries the bot token, so it is stripped before the
    /// error is stored.
    #[error("Notification request failed: {0}")]
    Http(reqwest::Error),

    #[error("Notification rejected (status {status}): {description}")]
    Rejected { status: u16, description: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Http(e.without_url())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Notifier that only writes to the log. Used when no chat transport is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(notification = %text, "Notification");
        Ok(())
    }
}

/// Send `text`, logging (never propagating) delivery failures.
pub async fn notify_best_effort(notifier: &dyn Notifier, text: &str) {
    if let Err(e) = notifier.send(text).await {
        tracing::warn!(error = %e, "Failed to deliver notification");
    }
}

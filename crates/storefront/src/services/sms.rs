//! Outbound SMS port.
//!
//! No SMS vendor is wired in. [`LogSmsSender`] writes messages to the log,
//! and [`OutboxSmsSender`] keeps them in memory for tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use partyrent_core::PhoneNumber;

/// SMS delivery failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SmsError(pub String);

/// Sends a text message to a phone number.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// # Errors
    ///
    /// Returns `SmsError` if the message could not be handed to the carrier.
    async fn send(&self, to: &PhoneNumber, body: &str) -> Result<(), SmsError>;
}

/// Logs messages instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send(&self, to: &PhoneNumber, body: &str) -> Result<(), SmsError> {
        tracing::info!(to = %mask(to.as_str()), body, "SMS not delivered (log sender)");
        Ok(())
    }
}

/// Collects messages in memory.
#[derive(Debug, Default)]
pub struct OutboxSmsSender {
    sent: Mutex<Vec<(PhoneNumber, String)>>,
}

impl OutboxSmsSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Body of the most recent message to `to`.
    pub async fn last_message_to(&self, to: &PhoneNumber) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|(phone, _)| phone == to)
            .map(|(_, body)| body.clone())
    }

    /// Number of messages sent so far.
    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl SmsSender for OutboxSmsSender {
    async fn send(&self, to: &PhoneNumber, body: &str) -> Result<(), SmsError> {
        self.sent.lock().await.push((to.clone(), body.to_owned()));
        Ok(())
    }
}

/// Keep the last four digits.
fn mask(phone: &str) -> String {
    let visible = phone.len().saturating_sub(4);
    phone
        .char_indices()
        .map(|(i, c)| if i < visible { '*' } else { c })
        .collect()
}

//! Outbound notification boundary
//!
//! The core never talks to an email transport directly. It hands a fully
//! rendered message to a [`Notifier`] and observes success or failure;
//! delivery transport, retries, and templating beyond plain text belong to
//! the implementation.

use crate::error::NotificationError;
use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Deliver a message to a single recipient.
    ///
    /// Called only after the corresponding token has been durably saved, so
    /// a failure here leaves an issued-but-unsent token, never the reverse.
    async fn send(
        &self,
        recipient_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError>;
}

/// Development transport that emits the message to the log instead of
/// sending it anywhere.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(
        &self,
        recipient_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            recipient = recipient_email,
            subject,
            body,
            "outbound notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_notifier_always_succeeds() {
        let notifier = TracingNotifier;
        let result = notifier
            .send("user@example.com", "Your magic login link", "body")
            .await;
        assert!(result.is_ok());
    }
}

//! Announcement delivery.

use tracing::{debug, info};

use crate::error::Result;

/// Delivers a message to a set of people.
///
/// Implementations decide the channel (SMS gateway, PA system, pager). The
/// session only decides who receives what.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Send `message` to the people with the given ids.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Notification`] if delivery fails.
    async fn notify(&self, person_ids: &[String], message: &str) -> Result<()>;
}

/// A [`Notifier`] that writes announcements to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, person_ids: &[String], message: &str) -> Result<()> {
        if person_ids.is_empty() {
            debug!(message, "Announcement has no recipients");
            return Ok(());
        }
        info!(recipients = person_ids.len(), message, "Announcement issued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_accepts_messages() {
        let notifier = LogNotifier;
        assert!(notifier
            .notify(&["p1".to_string()], "Evacuate")
            .await
            .is_ok());
        assert!(notifier.notify(&[], "Nobody home").await.is_ok());
    }
}

use async_trait::async_trait;
use tracing::info;

use crate::error::NotifyError;
use crate::notify::{DeliveryId, Notification, Notifier};

/// Writes notifications to the log instead of delivering them. Used when no
/// webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<DeliveryId, NotifyError> {
        let body = serde_json::to_string(notification)?;
        info!(
            kind = notification.kind(),
            subject = notification.subject(),
            "notification (log only): {body}"
        );
        Ok(format!("log-{}", notification.kind()))
    }
}

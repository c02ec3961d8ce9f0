//! Delivery of reports, alerts and error notices. Formatting into e-mail or
//! chat markup is left to whatever sits behind the webhook.

pub mod log;
pub mod payload;
pub mod webhook;

use async_trait::async_trait;

use crate::error::NotifyError;

pub use self::log::LogNotifier;
pub use payload::Notification;
pub use webhook::WebhookNotifier;

/// Identifier the delivery channel assigned to a sent notification.
pub type DeliveryId = String;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name for logs.
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<DeliveryId, NotifyError>;
}

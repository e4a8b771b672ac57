pub mod telegram;

pub use telegram::TelegramNotifier;

use anyhow::Result;
use async_trait::async_trait;

use crate::alerts::AlertEvent;

/// Delivery transport for alert notifications. Implementations own their
/// retry policy; an `Err` here means the alert was not delivered and the
/// cooldown engine will keep the key armed.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<()>;
}

//! Notifier that writes to the log instead of a chat platform

use async_trait::async_trait;
use tracing::info;

use crate::common::errors::Result;
use crate::common::traits::Notifier;

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_user(&self, user_id: &str, message: &str) -> Result<()> {
        info!(target: "notify", user_id, "{}", message);
        Ok(())
    }

    async fn notify_channel(&self, channel_id: &str, message: &str) -> Result<()> {
        info!(target: "notify", channel_id, "{}", message);
        Ok(())
    }
}

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::info;

use super::{Notifier, format_notification};
use crate::error::NotificationError;

/// Sink used when no chat credentials are configured: alerts only reach the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, symbol: &str, ts: NaiveDateTime, message: &str) -> Result<(), NotificationError> {
        info!(%symbol, %ts, "{}", format_notification(symbol, ts, message));
        Ok(())
    }
}

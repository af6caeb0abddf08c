mod log;
mod telegram;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::NotificationError;

pub use log::LogNotifier;
pub use telegram::TelegramNotifier;

/// Outbound alert channel. Delivery is best effort: callers log failures
/// and never retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, symbol: &str, ts: NaiveDateTime, message: &str) -> Result<(), NotificationError>;
}

/// Human-readable alert body shared by every sink.
pub fn format_notification(symbol: &str, ts: NaiveDateTime, message: &str) -> String {
    format!(
        "🚨 Alarm triggered 🚨\nSymbol: {symbol}\nTime: {}\nMessage: {message}",
        ts.time()
    )
}

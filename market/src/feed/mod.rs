pub mod replay;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::FeedError;
use crate::types::{Bar, Tick};

pub use replay::ReplayFeed;

/// Upstream market-data client.
///
/// Implementations own connection management and timezone handling; they
/// hand out bars and ticks already in exchange-local time, ordered
/// ascending.
#[async_trait]
pub trait MarketFeed: Send + Sync + 'static {
    /// Establishes the session. A failure here ends the whole run.
    async fn connect(&self) -> Result<(), FeedError>;

    /// Intraday bars of the current session at candle granularity.
    async fn intraday_history(&self, symbol: &str) -> Result<Vec<Bar>, FeedError>;

    /// Daily bars up to the previous session, enough to warm up ATR.
    async fn daily_history(&self, symbol: &str) -> Result<Vec<Bar>, FeedError>;

    /// Streams live ticks into `sender` until the subscription ends or the
    /// receiver is dropped.
    async fn stream_ticks(&self, symbol: &str, sender: mpsc::Sender<Tick>) -> Result<(), FeedError>;
}

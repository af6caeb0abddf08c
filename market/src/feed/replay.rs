use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::MarketFeed;
use crate::error::FeedError;
use crate::types::{Bar, Tick};

/// File-backed feed replaying recorded sessions.
///
/// Layout, one set per symbol:
/// - `<dir>/<SYMBOL>.intraday.json`: `[Bar]`
/// - `<dir>/<SYMBOL>.daily.json`: `[Bar]`
/// - `<dir>/<SYMBOL>.ticks.json`: `[Tick]`
pub struct ReplayFeed {
    dir: PathBuf,
    tick_interval: Duration,
}

impl ReplayFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tick_interval: Duration::ZERO,
        }
    }

    /// Pause between replayed ticks; zero replays as fast as the consumer reads.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    fn path(&self, symbol: &str, kind: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.{kind}.json"))
    }

    async fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("{}: {e}", path.display()))?;
        serde_json::from_slice(&bytes).map_err(|e| format!("{}: {e}", path.display()))
    }

    async fn history(&self, symbol: &str, kind: &str) -> Result<Vec<Bar>, FeedError> {
        let bars: Vec<Bar> = Self::load(&self.path(symbol, kind))
            .await
            .map_err(|reason| FeedError::History {
                symbol: symbol.to_string(),
                reason,
            })?;

        if bars.is_empty() {
            return Err(FeedError::EmptyHistory {
                symbol: symbol.to_string(),
            });
        }
        debug!(%symbol, kind, bars = bars.len(), "replayed history");
        Ok(bars)
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn connect(&self) -> Result<(), FeedError> {
        if !tokio::fs::metadata(&self.dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(FeedError::Connection(format!(
                "replay directory {} not found",
                self.dir.display()
            )));
        }
        info!(dir = %self.dir.display(), "replay feed ready");
        Ok(())
    }

    async fn intraday_history(&self, symbol: &str) -> Result<Vec<Bar>, FeedError> {
        self.history(symbol, "intraday").await
    }

    async fn daily_history(&self, symbol: &str) -> Result<Vec<Bar>, FeedError> {
        self.history(symbol, "daily").await
    }

    async fn stream_ticks(&self, symbol: &str, sender: mpsc::Sender<Tick>) -> Result<(), FeedError> {
        let ticks: Vec<Tick> = Self::load(&self.path(symbol, "ticks"))
            .await
            .map_err(|reason| FeedError::Subscription {
                symbol: symbol.to_string(),
                reason,
            })?;

        for tick in ticks {
            if sender.send(tick).await.is_err() {
                debug!(%symbol, "tick receiver dropped; ending replay");
                return Ok(());
            }
            if !self.tick_interval.is_zero() {
                tokio::time::sleep(self.tick_interval).await;
            }
        }
        Ok(())
    }
}

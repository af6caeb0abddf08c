pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use market::{Alarm, HistoricalRow};

pub use error::StoreError;
pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;

/// Whether `append` wrote a row or found the key already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    Duplicate,
}

/// Per-instrument row history plus the alarm log.
///
/// Row reads are always ascending by (date, time); every indicator
/// computation depends on that order. Implementations never cache rows
/// across calls.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Clears candle history for every instrument. The alarm log survives.
    async fn reset(&self) -> Result<(), StoreError>;

    async fn fetch_all(&self, symbol: &str) -> Result<Vec<HistoricalRow>, StoreError>;

    /// The newest `n` rows, still returned oldest first.
    async fn fetch_last(&self, symbol: &str, n: usize) -> Result<Vec<HistoricalRow>, StoreError>;

    /// Inserts `row` unless its (symbol, date, time) key already exists.
    async fn append(&self, row: &HistoricalRow) -> Result<AppendOutcome, StoreError>;

    /// Atomic bulk variant of [`append`](Self::append); returns how many rows
    /// were actually inserted.
    async fn append_many(&self, rows: &[HistoricalRow]) -> Result<usize, StoreError>;

    async fn append_alarm(&self, alarm: &Alarm) -> Result<(), StoreError>;

    /// True if an alarm for `symbol` at or after `cutoff` exists.
    async fn alarm_exists_since(&self, symbol: &str, cutoff: NaiveDateTime) -> Result<bool, StoreError>;
}

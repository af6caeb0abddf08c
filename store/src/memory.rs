use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use market::{Alarm, HistoricalRow};
use parking_lot::Mutex;

use crate::{AppendOutcome, HistoryStore, StoreError};

/// In-process store for tests and dry runs. Same semantics as the SQLite
/// store, nothing survives a restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    rows: Mutex<HashMap<String, BTreeMap<NaiveDateTime, HistoricalRow>>>,
    alarms: Mutex<Vec<Alarm>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the alarm log in insertion order.
    pub fn alarms(&self) -> Vec<Alarm> {
        self.alarms.lock().clone()
    }

    pub fn row_count(&self, symbol: &str) -> usize {
        self.rows.lock().get(symbol).map_or(0, |r| r.len())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn reset(&self) -> Result<(), StoreError> {
        self.rows.lock().clear();
        Ok(())
    }

    async fn fetch_all(&self, symbol: &str) -> Result<Vec<HistoricalRow>, StoreError> {
        Ok(self
            .rows
            .lock()
            .get(symbol)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_last(&self, symbol: &str, n: usize) -> Result<Vec<HistoricalRow>, StoreError> {
        let rows = self.rows.lock();
        let Some(series) = rows.get(symbol) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<_> = series.values().rev().take(n).cloned().collect();
        out.reverse();
        Ok(out)
    }

    async fn append(&self, row: &HistoricalRow) -> Result<AppendOutcome, StoreError> {
        let mut rows = self.rows.lock();
        let series = rows.entry(row.symbol.clone()).or_default();
        let key = row.timestamp();
        if series.contains_key(&key) {
            return Ok(AppendOutcome::Duplicate);
        }
        series.insert(key, row.clone());
        Ok(AppendOutcome::Inserted)
    }

    async fn append_many(&self, rows: &[HistoricalRow]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for row in rows {
            if self.append(row).await? == AppendOutcome::Inserted {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn append_alarm(&self, alarm: &Alarm) -> Result<(), StoreError> {
        self.alarms.lock().push(alarm.clone());
        Ok(())
    }

    async fn alarm_exists_since(&self, symbol: &str, cutoff: NaiveDateTime) -> Result<bool, StoreError> {
        Ok(self
            .alarms
            .lock()
            .iter()
            .any(|a| a.symbol == symbol && a.timestamp() >= cutoff))
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub ticks_ingested: Arc<AtomicU64>,
    pub ticks_rejected_late: Arc<AtomicU64>,
    pub ticks_rejected_invalid: Arc<AtomicU64>,

    pub candles_finalized: Arc<AtomicU64>,
    pub rows_duplicate: Arc<AtomicU64>,

    pub alarms_raised: Arc<AtomicU64>,
    pub alarms_suppressed: Arc<AtomicU64>,

    pub instruments_skipped: Arc<AtomicU64>,
    pub pipeline_failures: Arc<AtomicU64>,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn log_summary(&self) {
        info!(
            ticks_ingested = Self::get(&self.ticks_ingested),
            ticks_rejected_late = Self::get(&self.ticks_rejected_late),
            ticks_rejected_invalid = Self::get(&self.ticks_rejected_invalid),
            candles_finalized = Self::get(&self.candles_finalized),
            rows_duplicate = Self::get(&self.rows_duplicate),
            alarms_raised = Self::get(&self.alarms_raised),
            alarms_suppressed = Self::get(&self.alarms_suppressed),
            instruments_skipped = Self::get(&self.instruments_skipped),
            pipeline_failures = Self::get(&self.pipeline_failures),
            "pipeline counters"
        );
    }
}

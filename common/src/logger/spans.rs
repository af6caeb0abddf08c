use std::future::Future;
use std::time::{Duration, Instant};

use tracing::Span;

use super::TraceId;

/// Root span for everything that happens to one instrument.
pub fn instrument_span(stage: &'static str, symbol: &str) -> Span {
    tracing::info_span!(
        "instrument",
        stage = %stage,
        symbol = %symbol
    )
}

/// Child span for a single unit of work (one finalized candle, one strategy).
pub fn stage_span(stage: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!("stage", stage = %stage, trace_id = %trace_id)
}

pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            kind = "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}

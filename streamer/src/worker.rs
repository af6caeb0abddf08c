//! Per-instrument finalization.
//!
//! Every finalized candle of an instrument goes through one worker, in the
//! order the aggregator produced it: indicators, append, then strategies.
//! A candle is fully handled before the next is dequeued, so the store
//! never sees rows out of order and strategies always read the row they
//! were triggered by.

use std::sync::Arc;
use std::time::Duration;

use alarms::{StrategyReport, StrategyRunner};
use common::logger::{TraceId, stage_span, warn_if_slow};
use market::Candle;
use market::indicators::IndicatorEngine;
use store::{AppendOutcome, HistoryStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info};

use crate::error::PipelineFailure;
use crate::metrics::counters::Counters;

pub struct FinalizationWorker {
    symbol: String,
    engine: IndicatorEngine,
    store: Arc<dyn HistoryStore>,
    runner: Arc<StrategyRunner>,
    counters: Counters,
    failures: mpsc::UnboundedSender<PipelineFailure>,
    slow_threshold: Duration,
}

impl FinalizationWorker {
    pub fn new(
        symbol: &str,
        engine: IndicatorEngine,
        store: Arc<dyn HistoryStore>,
        runner: Arc<StrategyRunner>,
        counters: Counters,
        failures: mpsc::UnboundedSender<PipelineFailure>,
        slow_threshold: Duration,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            engine,
            store,
            runner,
            counters,
            failures,
            slow_threshold,
        }
    }

    /// Starts the worker loop behind a bounded queue.
    ///
    /// Dropping the returned sender lets the worker drain what is queued and
    /// exit; awaiting the handle is the drain point.
    pub fn spawn(self, capacity: usize) -> (mpsc::Sender<Candle>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let span = tracing::info_span!("finalizer", symbol = %self.symbol);
        let handle = tokio::spawn(self.run(rx).instrument(span));
        (tx, handle)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Candle>) {
        debug!("finalization worker started");
        while let Some(candle) = rx.recv().await {
            let trace_id = TraceId::new();
            let span = stage_span("finalize", &trace_id);
            self.finalize(candle).instrument(span).await;
        }
        debug!("finalization queue closed, worker exiting");
    }

    /// Handles one finalized candle. Failures are reported and end the
    /// step; the candle is not retried.
    pub async fn finalize(&mut self, candle: Candle) -> Option<StrategyReport> {
        let history = if self.engine.needs_history() {
            match warn_if_slow("fetch_all", self.slow_threshold, self.store.fetch_all(&self.symbol)).await {
                Ok(rows) => rows,
                Err(e) => {
                    self.fail("fetch_history", e);
                    return None;
                }
            }
        } else {
            Vec::new()
        };

        let row = self.engine.next_row(&candle, &history);

        match warn_if_slow("append", self.slow_threshold, self.store.append(&row)).await {
            Ok(AppendOutcome::Inserted) => {
                self.engine.commit(&row);
                Counters::incr(&self.counters.candles_finalized);
                info!(
                    start = %candle.start,
                    close = row.close,
                    vwap = row.vwap,
                    ema = row.ema,
                    relatr = ?row.relatr,
                    "candle finalized"
                );
            }
            Ok(AppendOutcome::Duplicate) => {
                Counters::incr(&self.counters.rows_duplicate);
                debug!(start = %candle.start, "candle already stored, skipping strategies");
                return None;
            }
            Err(e) => {
                self.fail("append", e);
                return None;
            }
        }

        let report = self.runner.run(&self.symbol).await;
        Counters::add(&self.counters.alarms_raised, report.raised as u64);
        Counters::add(&self.counters.alarms_suppressed, report.suppressed as u64);
        Some(report)
    }

    fn fail(&self, stage: &'static str, error: impl ToString) {
        // The collector outlives every worker; a send error only happens
        // during teardown.
        let _ = self.failures.send(PipelineFailure::new(&self.symbol, stage, error));
    }
}

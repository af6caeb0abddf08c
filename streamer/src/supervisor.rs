//! Streaming supervisor.
//!
//! `Cleanup → Backfill → IndicatorSeed → LiveMonitor`. Only a failure to
//! connect to the feed ends the run; every other failure is scoped to one
//! instrument (skipped) or one candle (reported and dropped).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alarms::StrategyRunner;
use common::logger::{instrument_span, warn_if_slow};
use futures::future::{join_all, try_join};
use market::candle::{BucketWidth, CandleAggregator, IngestOutcome, RolloverPolicy};
use market::feed::MarketFeed;
use market::indicators::{IndicatorEngine, IndicatorMode, IndicatorSettings, seed_history};
use market::{Bar, Candle};
use store::HistoryStore;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{PipelineFailure, SupervisorError};
use crate::metrics::counters::Counters;
use crate::worker::FinalizationWorker;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Cleanup,
    Backfill,
    IndicatorSeed,
    LiveMonitor,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cleanup => "cleanup",
            Self::Backfill => "backfill",
            Self::IndicatorSeed => "indicator_seed",
            Self::LiveMonitor => "live_monitor",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    pub bucket_width: BucketWidth,
    pub rollover_policy: RolloverPolicy,
    pub indicators: IndicatorSettings,
    pub indicator_mode: IndicatorMode,
    pub finalize_queue_capacity: usize,
    pub slow_store_threshold: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            bucket_width: BucketWidth::default(),
            rollover_policy: RolloverPolicy::default(),
            indicators: IndicatorSettings::default(),
            indicator_mode: IndicatorMode::default(),
            finalize_queue_capacity: 64,
            slow_store_threshold: Duration::from_millis(250),
        }
    }
}

/// What the run ended with.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub live: Vec<String>,
    pub skipped: Vec<String>,
    /// Buckets that never saw a following tick. They are reported, not stored.
    pub open_candles: Vec<Candle>,
}

/// Fetched history of one instrument, before indicators are derived.
struct Fetched {
    symbol: String,
    intraday: Vec<Bar>,
    daily: Vec<Bar>,
}

/// Seeded instrument, ready for live monitoring.
struct Ready {
    symbol: String,
    atr: Option<f64>,
}

pub struct Supervisor<F: MarketFeed> {
    feed: Arc<F>,
    store: Arc<dyn HistoryStore>,
    runner: Arc<StrategyRunner>,
    settings: PipelineSettings,
    counters: Counters,
}

impl<F: MarketFeed> Supervisor<F> {
    pub fn new(
        feed: Arc<F>,
        store: Arc<dyn HistoryStore>,
        runner: Arc<StrategyRunner>,
        settings: PipelineSettings,
        counters: Counters,
    ) -> Self {
        Self {
            feed,
            store,
            runner,
            settings,
            counters,
        }
    }

    /// Runs every phase and returns once live monitoring has ended, either
    /// because all subscriptions finished or because `shutdown` flipped to
    /// `true`.
    pub async fn run(
        &self,
        symbols: Vec<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, SupervisorError> {
        self.feed.connect().await.map_err(SupervisorError::Connect)?;

        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect_failures(failures_rx, self.counters.clone()));

        enter(Phase::Cleanup);
        if let Err(e) = self.store.reset().await {
            error!(error = %e, "history cleanup failed, continuing with existing rows");
        }

        enter(Phase::Backfill);
        let mut summary = RunSummary::default();
        let fetched = join_all(symbols.iter().map(|symbol| {
            self.fetch_history(symbol)
                .instrument(instrument_span("backfill", symbol))
        }))
        .await;

        let mut to_seed = Vec::with_capacity(fetched.len());
        for (symbol, result) in symbols.iter().zip(fetched) {
            match result {
                Some(f) => to_seed.push(f),
                None => summary.skipped.push(symbol.clone()),
            }
        }

        enter(Phase::IndicatorSeed);
        let seeded = join_all(to_seed.into_iter().map(|f| {
            let span = instrument_span("indicator_seed", &f.symbol);
            self.seed(f).instrument(span)
        }))
        .await;

        let mut ready = Vec::with_capacity(seeded.len());
        for result in seeded {
            match result {
                Ok(r) => ready.push(r),
                Err(symbol) => summary.skipped.push(symbol),
            }
        }
        Counters::add(&self.counters.instruments_skipped, summary.skipped.len() as u64);

        enter(Phase::LiveMonitor);
        let mut monitors = JoinSet::new();
        for r in ready {
            let engine = match self.live_engine(&r).await {
                Some(e) => e,
                None => {
                    summary.skipped.push(r.symbol);
                    Counters::incr(&self.counters.instruments_skipped);
                    continue;
                }
            };

            let worker = FinalizationWorker::new(
                &r.symbol,
                engine,
                self.store.clone(),
                self.runner.clone(),
                self.counters.clone(),
                failures_tx.clone(),
                self.settings.slow_store_threshold,
            );

            let monitor = LiveMonitor {
                symbol: r.symbol.clone(),
                feed: self.feed.clone(),
                settings: self.settings,
                counters: self.counters.clone(),
                failures: failures_tx.clone(),
            };

            summary.live.push(r.symbol.clone());
            let span = instrument_span("live", &r.symbol);
            monitors.spawn(monitor.run(worker, shutdown.clone()).instrument(span));
        }
        drop(failures_tx);

        info!(live = summary.live.len(), skipped = summary.skipped.len(), "live monitoring started");

        while let Some(joined) = monitors.join_next().await {
            match joined {
                Ok(exit) => {
                    if !exit.subscribed {
                        summary.live.retain(|s| s != &exit.symbol);
                        summary.skipped.push(exit.symbol);
                        Counters::incr(&self.counters.instruments_skipped);
                    }
                    summary.open_candles.extend(exit.open);
                }
                Err(e) => error!(error = %e, "live monitor task aborted"),
            }
        }

        // Every sender is gone once the monitors and their workers exit.
        if let Err(e) = collector.await {
            error!(error = %e, "failure collector aborted");
        }

        info!(open_candles = summary.open_candles.len(), "supervisor stopped");
        Ok(summary)
    }

    async fn fetch_history(&self, symbol: &str) -> Option<Fetched> {
        let fetched = try_join(
            self.feed.intraday_history(symbol),
            self.feed.daily_history(symbol),
        )
        .await;

        match fetched {
            Ok((intraday, daily)) => {
                debug!(intraday = intraday.len(), daily = daily.len(), "history fetched");
                Some(Fetched {
                    symbol: symbol.to_string(),
                    intraday,
                    daily,
                })
            }
            Err(e) => {
                warn!(error = %e, "backfill failed, instrument skipped");
                None
            }
        }
    }

    async fn seed(&self, f: Fetched) -> Result<Ready, String> {
        let seeded = seed_history(&f.symbol, &f.intraday, &f.daily, self.settings.indicators);

        let stored = warn_if_slow(
            "append_many",
            self.settings.slow_store_threshold,
            self.store.append_many(&seeded.rows),
        )
        .await;

        match stored {
            Ok(inserted) => {
                info!(rows = inserted, atr = ?seeded.atr, "history seeded");
                Ok(Ready {
                    symbol: f.symbol,
                    atr: seeded.atr,
                })
            }
            Err(e) => {
                error!(error = %e, "failed to persist seeded history, instrument skipped");
                Err(f.symbol)
            }
        }
    }

    async fn live_engine(&self, r: &Ready) -> Option<IndicatorEngine> {
        let settings = self.settings.indicators;
        match self.settings.indicator_mode {
            IndicatorMode::FullRecompute => Some(IndicatorEngine::full_recompute(&r.symbol, settings, r.atr)),
            IndicatorMode::Incremental => match self.store.fetch_all(&r.symbol).await {
                Ok(history) => Some(IndicatorEngine::incremental(&r.symbol, settings, r.atr, &history)),
                Err(e) => {
                    error!(symbol = %r.symbol, error = %e, "cannot seed incremental indicators, instrument skipped");
                    None
                }
            },
        }
    }
}

fn enter(phase: Phase) {
    info!(%phase, "supervisor phase");
}

async fn collect_failures(mut rx: mpsc::UnboundedReceiver<PipelineFailure>, counters: Counters) {
    while let Some(f) = rx.recv().await {
        Counters::incr(&counters.pipeline_failures);
        error!(symbol = %f.symbol, stage = f.stage, error = %f.error, "pipeline failure");
    }
}

/// How one instrument's tick loop ended.
struct MonitorExit {
    symbol: String,
    /// False when the tick subscription itself failed.
    subscribed: bool,
    open: Option<Candle>,
}

/// Tick loop of one instrument. Owns the instrument's aggregator, so no
/// state is shared with any other instrument.
struct LiveMonitor<F: MarketFeed> {
    symbol: String,
    feed: Arc<F>,
    settings: PipelineSettings,
    counters: Counters,
    failures: mpsc::UnboundedSender<PipelineFailure>,
}

impl<F: MarketFeed> LiveMonitor<F> {
    async fn run(self, worker: FinalizationWorker, mut shutdown: watch::Receiver<bool>) -> MonitorExit {
        let (finalize_tx, worker_handle) = worker.spawn(self.settings.finalize_queue_capacity);
        let (tick_tx, mut ticks) = mpsc::channel(1024);

        let feed = self.feed.clone();
        let symbol = self.symbol.clone();
        let subscription =
            tokio::spawn(async move { feed.stream_ticks(&symbol, tick_tx).await }.in_current_span());
        let mut stream_ended = false;

        let mut aggregator = CandleAggregator::new(self.settings.bucket_width, self.settings.rollover_policy);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown requested, stopping tick loop");
                        break;
                    }
                }
                tick = ticks.recv() => {
                    let Some(tick) = tick else {
                        stream_ended = true;
                        break;
                    };
                    match aggregator.ingest(&self.symbol, tick) {
                        IngestOutcome::Opened | IngestOutcome::Updated => {
                            Counters::incr(&self.counters.ticks_ingested);
                        }
                        IngestOutcome::Rolled(candle) => {
                            Counters::incr(&self.counters.ticks_ingested);
                            if finalize_tx.send(candle).await.is_err() {
                                let _ = self.failures.send(PipelineFailure::new(
                                    &self.symbol,
                                    "finalize",
                                    "finalization worker stopped",
                                ));
                                break;
                            }
                        }
                        IngestOutcome::RejectedLate { .. } => {
                            Counters::incr(&self.counters.ticks_rejected_late);
                        }
                        IngestOutcome::RejectedInvalid => {
                            Counters::incr(&self.counters.ticks_rejected_invalid);
                        }
                    }
                }
            }
        }

        let subscribed = if stream_ended || subscription.is_finished() {
            match subscription.await {
                Ok(Ok(())) => {
                    info!("tick stream ended");
                    true
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "tick subscription failed, instrument not monitored");
                    let _ = self.failures.send(PipelineFailure::new(&self.symbol, "subscription", e));
                    false
                }
                Err(e) => {
                    let _ = self.failures.send(PipelineFailure::new(&self.symbol, "subscription", e));
                    false
                }
            }
        } else {
            subscription.abort();
            true
        };

        drop(finalize_tx);
        if let Err(e) = worker_handle.await {
            let _ = self.failures.send(PipelineFailure::new(&self.symbol, "finalize", e));
        }

        MonitorExit {
            open: aggregator.open_candle(&self.symbol).cloned(),
            symbol: self.symbol,
            subscribed,
        }
    }
}

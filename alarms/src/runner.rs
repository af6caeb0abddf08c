use std::sync::Arc;

use store::HistoryStore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info_span};

use crate::engine::{AlarmEngine, AlarmOutcome};
use crate::error::AlarmError;
use crate::strategy::Strategy;

/// Tally of one fan-out over the enabled strategies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StrategyReport {
    pub quiet: usize,
    pub raised: usize,
    pub suppressed: usize,
    pub failed: usize,
}

impl StrategyReport {
    fn record(&mut self, outcome: Option<AlarmOutcome>) {
        match outcome {
            None => self.quiet += 1,
            Some(AlarmOutcome::Raised { .. }) => self.raised += 1,
            Some(AlarmOutcome::Suppressed) => self.suppressed += 1,
            Some(AlarmOutcome::Abandoned) => self.failed += 1,
        }
    }
}

/// Runs every enabled strategy concurrently for one finalized candle.
///
/// Strategies are independent: an error or panic in one is logged and
/// counted, the others still complete.
pub struct StrategyRunner {
    strategies: Vec<Arc<dyn Strategy>>,
    engine: Arc<AlarmEngine>,
    store: Arc<dyn HistoryStore>,
}

impl StrategyRunner {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>, engine: Arc<AlarmEngine>, store: Arc<dyn HistoryStore>) -> Self {
        Self {
            strategies,
            engine,
            store,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, symbol: &str) -> StrategyReport {
        let mut set = JoinSet::new();

        for strategy in &self.strategies {
            let strategy = Arc::clone(strategy);
            let engine = Arc::clone(&self.engine);
            let store = Arc::clone(&self.store);
            let symbol = symbol.to_string();
            let span = info_span!("strategy", strategy = strategy.name(), %symbol);

            set.spawn(
                async move {
                    let outcome = match strategy.evaluate(&symbol, store.as_ref()).await? {
                        Some(signal) => Some(engine.raise(signal.into_alarm()).await),
                        None => None,
                    };
                    Ok::<_, AlarmError>(outcome)
                }
                .instrument(span),
            );
        }

        let mut report = StrategyReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(outcome)) => report.record(outcome),
                Ok(Err(e)) => {
                    error!(%symbol, error = %e, "strategy failed");
                    report.failed += 1;
                }
                Err(join_err) => {
                    error!(%symbol, error = %join_err, "strategy task aborted");
                    report.failed += 1;
                }
            }
        }

        debug!(%symbol, ?report, "strategies evaluated");
        report
    }
}

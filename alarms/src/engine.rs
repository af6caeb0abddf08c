use std::collections::HashMap;
use std::sync::Arc;

use chrono::TimeDelta;
use market::Alarm;
use parking_lot::Mutex;
use store::HistoryStore;
use tracing::{error, info, warn};

use crate::notifier::Notifier;

pub const DEFAULT_DEDUP_MINUTES: i64 = 15;

/// What happened to a candidate alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmOutcome {
    /// Passed dedup. The two side effects are independent and either may
    /// have failed.
    Raised { persisted: bool, notified: bool },

    /// Another alarm for the instrument exists inside the window.
    Suppressed,

    /// The recency check itself failed; nothing was written or sent.
    Abandoned,
}

/// Recency-gated alarm emission: dedup check, persist, then notify.
pub struct AlarmEngine {
    store: Arc<dyn HistoryStore>,
    notifier: Arc<dyn Notifier>,
    window: TimeDelta,
    // Check-then-insert must not interleave between concurrent strategies
    // of one instrument. Instruments never wait on each other.
    gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AlarmEngine {
    pub fn new(store: Arc<dyn HistoryStore>, notifier: Arc<dyn Notifier>, window: TimeDelta) -> Self {
        Self {
            store,
            notifier,
            window,
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn gate(&self, symbol: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock();
        Arc::clone(gates.entry(symbol.to_string()).or_default())
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub async fn raise(&self, alarm: Alarm) -> AlarmOutcome {
        let symbol = alarm.symbol.as_str();
        let cutoff = alarm.timestamp() - self.window;

        let gate = self.gate(symbol);
        let persisted = {
            let _guard = gate.lock().await;

            match self.store.alarm_exists_since(symbol, cutoff).await {
                Ok(true) => {
                    info!(%symbol, ts = %alarm.timestamp(), message = %alarm.message, "alarm skipped: recent alarm exists");
                    return AlarmOutcome::Suppressed;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(%symbol, error = %e, "alarm recency check failed, abandoning alarm");
                    return AlarmOutcome::Abandoned;
                }
            }

            match self.store.append_alarm(&alarm).await {
                Ok(()) => true,
                Err(e) => {
                    error!(%symbol, error = %e, "failed to persist alarm");
                    false
                }
            }
        };

        let notified = match self.notifier.send(symbol, alarm.timestamp(), &alarm.message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%symbol, error = %e, "alarm notification failed");
                false
            }
        };

        info!(%symbol, message = %alarm.message, persisted, notified, "alarm raised");
        AlarmOutcome::Raised { persisted, notified }
    }
}

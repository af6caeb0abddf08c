use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use market::{Alarm, HistoricalRow};
use store::HistoryStore;
use tracing::debug;

use crate::detectors::{self, DetectorSettings};
use crate::error::AlarmError;

/// Rows scanned for capitulation or euphoria before a reversal check.
pub const EXTREME_WINDOW: usize = 5;

/// Rows needed for an EMA crossover.
pub const CROSSOVER_WINDOW: usize = 2;

/// A detector chain that fired on the latest row.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub name: String,
    pub symbol: String,
    pub ts: NaiveDateTime,
    pub close: f64,
}

impl Signal {
    fn at(name: String, row: &HistoricalRow) -> Self {
        Self {
            name,
            symbol: row.symbol.clone(),
            ts: row.timestamp(),
            close: row.close,
        }
    }

    pub fn message(&self) -> String {
        format!("{} detected for {} at {:.2}", self.name, self.symbol, self.close)
    }

    pub fn into_alarm(self) -> Alarm {
        let message = self.message();
        Alarm::new(&self.symbol, self.ts, message)
    }
}

/// Named composition of detectors, evaluated once per finalized candle.
///
/// Strategies read what they need from the store themselves and share no
/// state, so any number of them may run concurrently for one instrument.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(&self, symbol: &str, store: &dyn HistoryStore) -> Result<Option<Signal>, AlarmError>;
}

/// Capitulation in the recent window, then price crossing back above the EMA.
pub struct ReversalLong {
    pub settings: DetectorSettings,
    pub ema_period: usize,
}

#[async_trait]
impl Strategy for ReversalLong {
    fn name(&self) -> &'static str {
        "reversal_long"
    }

    async fn evaluate(&self, symbol: &str, store: &dyn HistoryStore) -> Result<Option<Signal>, AlarmError> {
        let window = store.fetch_last(symbol, EXTREME_WINDOW).await?;
        if !detectors::capitulation(&window, self.settings.capitulation_threshold) {
            return Ok(None);
        }
        debug!(%symbol, "capitulation in window, checking EMA crossover up");

        if !detectors::ema_cross_up_last(&window) {
            return Ok(None);
        }
        Ok(window
            .last()
            .map(|row| Signal::at(format!("EMA{} crossover up", self.ema_period), row)))
    }
}

/// Euphoria in the recent window, then price crossing back below the EMA.
pub struct ReversalShort {
    pub settings: DetectorSettings,
    pub ema_period: usize,
}

#[async_trait]
impl Strategy for ReversalShort {
    fn name(&self) -> &'static str {
        "reversal_short"
    }

    async fn evaluate(&self, symbol: &str, store: &dyn HistoryStore) -> Result<Option<Signal>, AlarmError> {
        let window = store.fetch_last(symbol, EXTREME_WINDOW).await?;
        if !detectors::euphoria(&window, self.settings.capitulation_threshold) {
            return Ok(None);
        }
        debug!(%symbol, "euphoria in window, checking EMA crossover down");

        if !detectors::ema_cross_down_last(&window) {
            return Ok(None);
        }
        Ok(window
            .last()
            .map(|row| Signal::at(format!("EMA{} crossover down", self.ema_period), row)))
    }
}

/// Euphoria anywhere in the session followed by a return to VWAP.
pub struct VwapContinuation {
    pub settings: DetectorSettings,
}

#[async_trait]
impl Strategy for VwapContinuation {
    fn name(&self) -> &'static str {
        "vwap_continuation"
    }

    async fn evaluate(&self, symbol: &str, store: &dyn HistoryStore) -> Result<Option<Signal>, AlarmError> {
        let history = store.fetch_all(symbol).await?;
        if !detectors::vwap_continuation_setup(&history, &self.settings) {
            return Ok(None);
        }
        Ok(history
            .last()
            .map(|row| Signal::at("VWAP continuation setup".to_string(), row)))
    }
}

/// Plain EMA crossover down, used to exit longs.
pub struct Exit {
    pub ema_period: usize,
}

#[async_trait]
impl Strategy for Exit {
    fn name(&self) -> &'static str {
        "exit"
    }

    async fn evaluate(&self, symbol: &str, store: &dyn HistoryStore) -> Result<Option<Signal>, AlarmError> {
        let window = store.fetch_last(symbol, CROSSOVER_WINDOW).await?;
        if !detectors::ema_cross_down_last(&window) {
            return Ok(None);
        }
        Ok(window
            .last()
            .map(|row| Signal::at(format!("EMA{} crossover down", self.ema_period), row)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    ReversalLong,
    ReversalShort,
    VwapContinuation,
    Exit,
}

impl StrategyKind {
    pub const DEFAULT_SET: [StrategyKind; 3] = [
        StrategyKind::ReversalLong,
        StrategyKind::ReversalShort,
        StrategyKind::VwapContinuation,
    ];

    pub fn build(self, settings: DetectorSettings, ema_period: usize) -> Arc<dyn Strategy> {
        match self {
            Self::ReversalLong => Arc::new(ReversalLong { settings, ema_period }),
            Self::ReversalShort => Arc::new(ReversalShort { settings, ema_period }),
            Self::VwapContinuation => Arc::new(VwapContinuation { settings }),
            Self::Exit => Arc::new(Exit { ema_period }),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reversal_long" => Ok(Self::ReversalLong),
            "reversal_short" => Ok(Self::ReversalShort),
            "vwap_continuation" => Ok(Self::VwapContinuation),
            "exit" => Ok(Self::Exit),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReversalLong => "reversal_long",
            Self::ReversalShort => "reversal_short",
            Self::VwapContinuation => "vwap_continuation",
            Self::Exit => "exit",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_message_uses_two_decimals() {
        let ts = chrono::NaiveDate::from_ymd_opt(2025, 1, 6)
            .and_then(|d| d.and_hms_opt(10, 4, 0))
            .unwrap();
        let signal = Signal {
            name: "EMA9 crossover up".into(),
            symbol: "CELH".into(),
            ts,
            close: 41.2,
        };
        let alarm = signal.into_alarm();
        assert_eq!(alarm.message, "EMA9 crossover up detected for CELH at 41.20");
        assert_eq!(alarm.timestamp(), ts);
    }

    #[test]
    fn kinds_parse_from_config_names() {
        for kind in [
            StrategyKind::ReversalLong,
            StrategyKind::ReversalShort,
            StrategyKind::VwapContinuation,
            StrategyKind::Exit,
        ] {
            assert_eq!(kind.to_string().parse::<StrategyKind>(), Ok(kind));
        }
        assert!("momentum".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn built_strategies_report_their_kind() {
        let s = StrategyKind::VwapContinuation.build(DetectorSettings::default(), 9);
        assert_eq!(s.name(), "vwap_continuation");
    }
}

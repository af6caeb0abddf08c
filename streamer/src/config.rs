use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alarms::{DEFAULT_DEDUP_MINUTES, DetectorSettings, StrategyKind};
use chrono::TimeDelta;
use market::candle::{BucketWidth, DEFAULT_BUCKET_WIDTH_SECS, RolloverPolicy};
use market::indicators::{DEFAULT_ATR_PERIOD, DEFAULT_EMA_PERIOD, IndicatorMode, IndicatorSettings};

use crate::error::ConfigError;
use crate::supervisor::PipelineSettings;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    /// Folder of `.txt` symbol lists.
    pub tickers_dir: PathBuf,

    /// Folder read by the replay feed.
    pub replay_dir: PathBuf,

    // =========================
    // Candles and indicators
    // =========================
    pub bucket_width: BucketWidth,
    pub rollover_policy: RolloverPolicy,
    pub indicators: IndicatorSettings,

    /// Full recompute reads the instrument's whole history for every
    /// finalized candle; incremental keeps running sums in memory.
    pub indicator_mode: IndicatorMode,

    // =========================
    // Alarms
    // =========================
    pub detectors: DetectorSettings,

    /// Trailing window in which a second alarm for the same instrument is
    /// suppressed.
    pub dedup_minutes: i64,

    pub strategies: Vec<StrategyKind>,

    /// Chat sink; alarms only go to the log when unset.
    pub telegram: Option<TelegramConfig>,

    // =========================
    // Pipeline
    // =========================
    /// Capacity of each instrument's finalization queue.
    ///
    /// Acts as backpressure: a slow store stalls that instrument's tick
    /// loop instead of growing memory.
    pub finalize_queue_capacity: usize,

    /// Store calls slower than this are logged as performance warnings.
    pub slow_store_threshold: Duration,

    /// JSON logs instead of pretty output.
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or blank keys take
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let width_secs: i64 = parse(&get, "BUCKET_WIDTH_SECS", DEFAULT_BUCKET_WIDTH_SECS)?;
        let bucket_width = BucketWidth::from_secs(width_secs)
            .ok_or_else(|| invalid("BUCKET_WIDTH_SECS", width_secs, "must be positive"))?;

        let ema_period = positive(parse(&get, "EMA_PERIOD", DEFAULT_EMA_PERIOD)?, "EMA_PERIOD")?;
        let atr_period = positive(parse(&get, "ATR_PERIOD", DEFAULT_ATR_PERIOD)?, "ATR_PERIOD")?;

        let capitulation_threshold: f64 = parse(&get, "CAPITULATION_THRESHOLD", 1.0)?;
        if !(capitulation_threshold.is_finite() && capitulation_threshold > 0.0) {
            return Err(invalid("CAPITULATION_THRESHOLD", capitulation_threshold, "must be positive"));
        }
        let vwap_distance: f64 = parse(&get, "VWAP_DISTANCE", 0.1)?;
        if !(vwap_distance.is_finite() && vwap_distance >= 0.0) {
            return Err(invalid("VWAP_DISTANCE", vwap_distance, "must not be negative"));
        }

        let dedup_minutes: i64 = parse(&get, "ALARM_DEDUP_MINUTES", DEFAULT_DEDUP_MINUTES)?;
        if dedup_minutes < 0 {
            return Err(invalid("ALARM_DEDUP_MINUTES", dedup_minutes, "must not be negative"));
        }

        let strategies = match get("STRATEGIES") {
            Some(list) => parse_strategies(&list)?,
            None => StrategyKind::DEFAULT_SET.to_vec(),
        };

        let finalize_queue_capacity = positive(
            parse(&get, "FINALIZE_QUEUE_CAPACITY", 64usize)?,
            "FINALIZE_QUEUE_CAPACITY",
        )?;

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            _ => None,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite://candles.db".to_string()),
            tickers_dir: get("TICKERS_DIR").unwrap_or_else(|| "tickers".to_string()).into(),
            replay_dir: get("REPLAY_DIR").unwrap_or_else(|| "replay".to_string()).into(),
            bucket_width,
            rollover_policy: parse(&get, "ROLLOVER_POLICY", RolloverPolicy::default())?,
            indicators: IndicatorSettings { ema_period, atr_period },
            indicator_mode: parse(&get, "INDICATOR_MODE", IndicatorMode::default())?,
            detectors: DetectorSettings {
                capitulation_threshold,
                vwap_distance,
            },
            dedup_minutes,
            strategies,
            telegram,
            finalize_queue_capacity,
            slow_store_threshold: Duration::from_millis(250),
            json_logs: get("APP_ENV").is_some_and(|v| v == "production"),
        })
    }

    pub fn dedup_window(&self) -> TimeDelta {
        TimeDelta::minutes(self.dedup_minutes)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            bucket_width: self.bucket_width,
            rollover_policy: self.rollover_policy,
            indicators: self.indicators,
            indicator_mode: self.indicator_mode,
            finalize_queue_capacity: self.finalize_queue_capacity,
            slow_store_threshold: self.slow_store_threshold,
        }
    }
}

fn invalid(key: &'static str, value: impl Display, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(key, &raw, e.to_string())),
        None => Ok(default),
    }
}

fn positive(value: usize, key: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(invalid(key, value, "must be positive"));
    }
    Ok(value)
}

/// Comma separated strategy names, de-duplicated in order.
fn parse_strategies(list: &str) -> Result<Vec<StrategyKind>, ConfigError> {
    let mut out = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind: StrategyKind = name.parse().map_err(|e: String| invalid("STRATEGIES", name, e))?;
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    Ok(out)
}

//! Indicator engine.
//!
//! Batch functions compute a full series over ordered history (backfill).
//! [`IndicatorEngine`] derives the indicators of one newly finalized candle,
//! either by recomputing over the full stored history or by advancing
//! running recurrences; both produce the values the batch functions would.
//!
//! Rounding follows the stored precision: VWAP, EMA and Relatr to 2
//! decimals, ATR to 4. Ties round to even.

pub mod atr;
pub mod ema;
pub mod engine;
pub mod relatr;
pub mod seed;
pub mod vwap;

use std::str::FromStr;

pub use atr::{atr_series, last_atr, true_ranges};
pub use ema::{Ema, ema_series};
pub use engine::IndicatorEngine;
pub use relatr::{relatr, relatr_or_none};
pub use seed::{SeededHistory, seed_history};
pub use vwap::{VwapAccumulator, vwap_series};

pub const DEFAULT_EMA_PERIOD: usize = 9;
pub const DEFAULT_ATR_PERIOD: usize = 14;

/// Periods used by every indicator computation of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndicatorSettings {
    pub ema_period: usize,
    pub atr_period: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            ema_period: DEFAULT_EMA_PERIOD,
            atr_period: DEFAULT_ATR_PERIOD,
        }
    }
}

/// How live rows get their VWAP and EMA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IndicatorMode {
    /// Re-read the instrument's full history for every new row.
    #[default]
    FullRecompute,

    /// Keep running sums and the EMA state in memory.
    Incremental,
}

impl FromStr for IndicatorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "full_recompute" => Ok(Self::FullRecompute),
            "incremental" => Ok(Self::Incremental),
            other => Err(format!("unknown indicator mode '{other}'")),
        }
    }
}

/// Rounds half to even at `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Non-finite inputs contribute nothing to the sums.
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

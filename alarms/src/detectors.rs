//! Pure pattern detectors over a window of stored rows.
//!
//! Windows are ordered oldest first, as the store returns them. Rows with
//! a null Relatr never satisfy a Relatr condition.

use market::HistoricalRow;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorSettings {
    /// Relatr magnitude that counts as capitulation (positive side) or
    /// euphoria (negative side).
    pub capitulation_threshold: f64,

    /// Half-width of the Relatr band that counts as "at VWAP".
    pub vwap_distance: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            capitulation_threshold: 1.0,
            vwap_distance: 0.1,
        }
    }
}

pub fn capitulation(window: &[HistoricalRow], threshold: f64) -> bool {
    window
        .iter()
        .filter_map(|r| r.relatr)
        .any(|relatr| relatr >= threshold)
}

pub fn euphoria(window: &[HistoricalRow], threshold: f64) -> bool {
    window
        .iter()
        .filter_map(|r| r.relatr)
        .any(|relatr| relatr <= -threshold)
}

/// Price closed above the EMA after the previous close sat below it.
pub fn ema_cross_up(prev: &HistoricalRow, curr: &HistoricalRow) -> bool {
    prev.close < curr.ema && curr.close > curr.ema
}

pub fn ema_cross_down(prev: &HistoricalRow, curr: &HistoricalRow) -> bool {
    prev.close > curr.ema && curr.close < curr.ema
}

/// Crossover over the last two rows of `window`; shorter windows never fire.
pub fn ema_cross_up_last(window: &[HistoricalRow]) -> bool {
    match window {
        [.., prev, curr] => ema_cross_up(prev, curr),
        _ => false,
    }
}

pub fn ema_cross_down_last(window: &[HistoricalRow]) -> bool {
    match window {
        [.., prev, curr] => ema_cross_down(prev, curr),
        _ => false,
    }
}

pub fn vwap_close(latest: &HistoricalRow, distance: f64) -> bool {
    latest
        .relatr
        .is_some_and(|relatr| (-distance..=distance).contains(&relatr))
}

/// Latest row back at VWAP after a euphoric move anywhere in the session.
pub fn vwap_continuation_setup(history: &[HistoricalRow], settings: &DetectorSettings) -> bool {
    let Some(latest) = history.last() else {
        return false;
    };
    vwap_close(latest, settings.vwap_distance) && euphoria(history, settings.capitulation_threshold)
}

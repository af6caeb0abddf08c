use super::{Ema, round_to};
use crate::types::Ohlcv;

/// True range per bar. The first bar has no previous close and uses
/// `high - low` alone.
pub fn true_ranges<T: Ohlcv>(bars: &[T]) -> Vec<f64> {
    let mut prev_close: Option<f64> = None;
    bars.iter()
        .map(|b| {
            let hl = b.high() - b.low();
            let tr = match prev_close {
                Some(pc) => hl.max((b.high() - pc).abs()).max((b.low() - pc).abs()),
                None => hl,
            };
            prev_close = Some(b.close());
            tr
        })
        .collect()
}

/// ATR as the EMA of true range, rounded to 4 decimals.
pub fn atr_series<T: Ohlcv>(bars: &[T], period: usize) -> Vec<f64> {
    let mut ema = Ema::new(period);
    true_ranges(bars)
        .into_iter()
        .map(|tr| round_to(ema.update(tr), 4))
        .collect()
}

/// Latest ATR of a daily series; `None` for an empty series.
pub fn last_atr<T: Ohlcv>(bars: &[T], period: usize) -> Option<f64> {
    atr_series(bars, period).last().copied()
}

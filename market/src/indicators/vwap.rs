use super::{finite_or_zero, round_to};
use crate::types::Ohlcv;

/// Cumulative (session-long, not rolling) VWAP over typical price.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VwapAccumulator {
    cum_price_volume: f64,
    cum_volume: f64,
}

impl VwapAccumulator {
    /// Adds one bar and returns the VWAP including it.
    pub fn push<T: Ohlcv + ?Sized>(&mut self, bar: &T) -> f64 {
        let volume = finite_or_zero(bar.volume());
        self.cum_price_volume += finite_or_zero(bar.ohlc4()) * volume;
        self.cum_volume += volume;
        self.value()
    }

    /// Rounded VWAP so far; 0 while no volume has traded.
    pub fn value(&self) -> f64 {
        if self.cum_volume == 0.0 {
            return 0.0;
        }
        round_to(self.cum_price_volume / self.cum_volume, 2)
    }
}

pub fn vwap_series<T: Ohlcv>(bars: &[T]) -> Vec<f64> {
    let mut acc = VwapAccumulator::default();
    bars.iter().map(|b| acc.push(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bar;
    use chrono::NaiveDate;

    fn bar(o: f64, h: f64, l: f64, c: f64, v: f64) -> Bar {
        Bar {
            ts: NaiveDate::from_ymd_opt(2025, 1, 2)
                .and_then(|d| d.and_hms_opt(9, 30, 0))
                .unwrap(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
        }
    }

    #[test]
    fn vwap_is_cumulative_over_typical_price() {
        let bars = [
            bar(10.0, 12.0, 8.0, 10.0, 100.0), // tp 10
            bar(20.0, 20.0, 20.0, 20.0, 300.0), // tp 20
        ];
        // (10*100 + 20*300) / 400 = 17.5
        assert_eq!(vwap_series(&bars), vec![10.0, 17.5]);
    }

    #[test]
    fn zero_volume_prefix_yields_zero() {
        let bars = [bar(5.0, 5.0, 5.0, 5.0, 0.0), bar(6.0, 6.0, 6.0, 6.0, 10.0)];
        assert_eq!(vwap_series(&bars), vec![0.0, 6.0]);
    }

    #[test]
    fn non_finite_volume_counts_as_zero() {
        let bars = [bar(5.0, 5.0, 5.0, 5.0, f64::NAN), bar(6.0, 6.0, 6.0, 6.0, 10.0)];
        assert_eq!(vwap_series(&bars), vec![0.0, 6.0]);
    }
}

use tracing::{debug, warn};

use super::{IndicatorSettings, ema_series, last_atr, relatr_or_none, vwap_series};
use crate::types::{Bar, HistoricalRow};

/// Backfilled intraday table of one instrument plus its ATR snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SeededHistory {
    pub rows: Vec<HistoricalRow>,
    pub atr: Option<f64>,
}

/// Batch indicator pass over fetched history.
///
/// VWAP and EMA run over the intraday series; the latest daily ATR is
/// broadcast to every intraday row for Relatr. Bars are ordered by
/// timestamp first so stored rows are ascending.
pub fn seed_history(
    symbol: &str,
    intraday: &[Bar],
    daily: &[Bar],
    settings: IndicatorSettings,
) -> SeededHistory {
    let mut intraday = intraday.to_vec();
    intraday.sort_by_key(|b| b.ts);
    let mut daily = daily.to_vec();
    daily.sort_by_key(|b| b.ts);

    let atr = last_atr(&daily, settings.atr_period);
    if atr.is_none() {
        warn!(%symbol, "no daily bars; relatr will be null for this instrument");
    }

    let vwap = vwap_series(&intraday);
    let ema = ema_series(intraday.iter().map(|b| b.close), settings.ema_period);

    let rows: Vec<HistoricalRow> = intraday
        .iter()
        .zip(vwap)
        .zip(ema)
        .map(|((bar, vwap), ema)| HistoricalRow {
            symbol: symbol.to_string(),
            date: bar.ts.date(),
            time: bar.ts.time(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            vwap,
            ema,
            relatr: relatr_or_none(symbol, vwap, bar.close, atr),
        })
        .collect();

    debug!(%symbol, rows = rows.len(), ?atr, "seeded intraday history");
    SeededHistory { rows, atr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, day)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    fn bar(ts: NaiveDateTime, c: f64, range: f64) -> Bar {
        Bar {
            ts,
            open: c,
            high: c + range,
            low: c - range,
            close: c,
            volume: 1_000.0,
        }
    }

    #[test]
    fn relatr_uses_latest_daily_atr_for_every_row() {
        let daily: Vec<Bar> = (1..=5).map(|d| bar(at(d, 0, 0), 100.0, 1.0)).collect();
        // Every daily TR is 2.0, so ATR is exactly 2.0.
        let intraday = vec![
            bar(at(7, 9, 30), 100.0, 0.0),
            bar(at(7, 9, 32), 98.0, 0.0),
        ];

        let seeded = seed_history("ABC", &intraday, &daily, IndicatorSettings::default());
        assert_eq!(seeded.atr, Some(2.0));
        assert_eq!(seeded.rows.len(), 2);

        // vwap after row 2 = 99.0, close 98 -> (99 - 98) / 2 = 0.5
        assert_eq!(seeded.rows[0].relatr, Some(0.0));
        assert_eq!(seeded.rows[1].vwap, 99.0);
        assert_eq!(seeded.rows[1].relatr, Some(0.5));
    }

    #[test]
    fn unordered_bars_are_stored_ascending() {
        let t0 = at(7, 9, 30);
        let intraday = vec![
            bar(t0 + TimeDelta::minutes(4), 3.0, 0.0),
            bar(t0, 1.0, 0.0),
            bar(t0 + TimeDelta::minutes(2), 2.0, 0.0),
        ];
        let seeded = seed_history("ABC", &intraday, &[], IndicatorSettings::default());

        let closes: Vec<f64> = seeded.rows.iter().map(|r| r.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
        assert!(seeded.rows.iter().all(|r| r.relatr.is_none()));
        assert_eq!(seeded.atr, None);
    }
}

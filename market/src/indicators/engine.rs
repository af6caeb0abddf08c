use super::{
    Ema, IndicatorMode, IndicatorSettings, VwapAccumulator, relatr_or_none, round_to,
};
use crate::types::{Candle, HistoricalRow};

#[derive(Clone, Debug)]
struct Running {
    vwap: VwapAccumulator,
    ema: Ema,
}

/// Derives VWAP, EMA and Relatr for newly finalized candles of one
/// instrument.
///
/// The ATR snapshot is fixed at construction (computed once during
/// backfill) and reused for every live row.
#[derive(Clone, Debug)]
pub struct IndicatorEngine {
    symbol: String,
    settings: IndicatorSettings,
    atr: Option<f64>,
    running: Option<Running>,
}

impl IndicatorEngine {
    pub fn new(
        mode: IndicatorMode,
        symbol: &str,
        settings: IndicatorSettings,
        atr: Option<f64>,
        history: &[HistoricalRow],
    ) -> Self {
        match mode {
            IndicatorMode::FullRecompute => Self::full_recompute(symbol, settings, atr),
            IndicatorMode::Incremental => Self::incremental(symbol, settings, atr, history),
        }
    }

    pub fn full_recompute(symbol: &str, settings: IndicatorSettings, atr: Option<f64>) -> Self {
        Self {
            symbol: symbol.to_string(),
            settings,
            atr,
            running: None,
        }
    }

    /// Seeds the running state by replaying `history` (ascending order).
    pub fn incremental(
        symbol: &str,
        settings: IndicatorSettings,
        atr: Option<f64>,
        history: &[HistoricalRow],
    ) -> Self {
        let mut running = Running {
            vwap: VwapAccumulator::default(),
            ema: Ema::new(settings.ema_period),
        };
        for row in history {
            running.vwap.push(row);
            running.ema.update(row.close);
        }

        Self {
            symbol: symbol.to_string(),
            settings,
            atr,
            running: Some(running),
        }
    }

    pub fn mode(&self) -> IndicatorMode {
        if self.running.is_some() {
            IndicatorMode::Incremental
        } else {
            IndicatorMode::FullRecompute
        }
    }

    /// Whether [`Self::next_row`] needs the stored history passed in.
    pub fn needs_history(&self) -> bool {
        self.running.is_none()
    }

    pub fn atr(&self) -> Option<f64> {
        self.atr
    }

    /// Builds the row for `candle` as if it were appended to `history`.
    ///
    /// `history` must be ordered by (date, time) and is ignored in
    /// incremental mode. Nothing advances until [`Self::commit`].
    pub fn next_row(&self, candle: &Candle, history: &[HistoricalRow]) -> HistoricalRow {
        let (vwap, ema) = match &self.running {
            Some(r) => {
                let mut next = r.clone();
                (next.vwap.push(candle), round_to(next.ema.update(candle.close), 2))
            }
            None => (
                next_vwap(history, candle),
                next_ema(history, candle, self.settings.ema_period),
            ),
        };

        let relatr = relatr_or_none(&self.symbol, vwap, candle.close, self.atr);
        HistoricalRow::from_candle(candle, vwap, ema, relatr)
    }

    /// Folds a persisted row into the running state. Rows that were not
    /// stored (duplicates, failed writes) must not be committed, so that the
    /// running sums keep describing exactly what the store holds.
    pub fn commit(&mut self, row: &HistoricalRow) {
        if let Some(r) = self.running.as_mut() {
            r.vwap.push(row);
            r.ema.update(row.close);
        }
    }
}

/// VWAP of `history` plus `candle`, recomputed from scratch.
pub fn next_vwap(history: &[HistoricalRow], candle: &Candle) -> f64 {
    let mut acc = VwapAccumulator::default();
    for row in history {
        acc.push(row);
    }
    acc.push(candle)
}

/// EMA of the closes of `history` plus `candle`, recomputed from scratch.
pub fn next_ema(history: &[HistoricalRow], candle: &Candle, period: usize) -> f64 {
    let mut ema = Ema::new(period);
    for row in history {
        ema.update(row.close);
    }
    round_to(ema.update(candle.close), 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{ema_series, vwap_series};
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use proptest::prelude::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 3)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap()
    }

    fn candles(points: &[(f64, f64, f64)]) -> Vec<Candle> {
        points
            .iter()
            .enumerate()
            .map(|(i, (price, spread, volume))| {
                let mut c = Candle::seed(
                    "ABC",
                    start() + TimeDelta::minutes(2 * i as i64),
                    *price,
                    *volume,
                );
                c.fold(price + spread, 0.0);
                c.fold(price - spread, 0.0);
                c.fold(price + spread / 2.0, 0.0);
                c
            })
            .collect()
    }

    /// Appends every candle through `engine`, re-reading what was "stored".
    fn drive(engine: &mut IndicatorEngine, cs: &[Candle]) -> Vec<HistoricalRow> {
        let mut stored: Vec<HistoricalRow> = Vec::new();
        for c in cs {
            let row = engine.next_row(c, &stored);
            engine.commit(&row);
            stored.push(row);
        }
        stored
    }

    #[test]
    fn first_row_uses_candle_alone() {
        let cs = candles(&[(10.0, 0.5, 100.0)]);
        let e = IndicatorEngine::full_recompute("ABC", IndicatorSettings::default(), Some(2.0));
        let row = e.next_row(&cs[0], &[]);

        assert_eq!(row.ema, round_to(cs[0].close, 2));
        assert_eq!(row.vwap, round_to(
            (cs[0].open + cs[0].high + cs[0].low + cs[0].close) / 4.0,
            2
        ));
        assert!(row.relatr.is_some());
    }

    #[test]
    fn missing_atr_gives_null_relatr_not_failure() {
        let cs = candles(&[(10.0, 0.5, 100.0), (11.0, 0.5, 100.0)]);
        let mut e = IndicatorEngine::full_recompute("ABC", IndicatorSettings::default(), None);
        let rows = drive(&mut e, &cs);
        assert!(rows.iter().all(|r| r.relatr.is_none()));
        assert!(rows.iter().all(|r| r.vwap > 0.0));
    }

    #[test]
    fn uncommitted_rows_leave_running_state_untouched() {
        let cs = candles(&[(10.0, 0.5, 100.0), (12.0, 0.5, 300.0), (11.0, 0.2, 50.0)]);
        let s = IndicatorSettings::default();
        let mut e = IndicatorEngine::incremental("ABC", s, Some(1.0), &[]);

        let first = e.next_row(&cs[0], &[]);
        e.commit(&first);

        // A duplicate of the first bucket is previewed but never stored.
        let _ = e.next_row(&cs[0], &[]);
        let second = e.next_row(&cs[1], &[]);

        let full = IndicatorEngine::full_recompute("ABC", s, Some(1.0));
        assert_eq!(second, full.next_row(&cs[1], &[first]));
    }

    #[test]
    fn mode_reflects_construction() {
        let s = IndicatorSettings::default();
        assert_eq!(IndicatorEngine::new(IndicatorMode::Incremental, "A", s, None, &[]).mode(), IndicatorMode::Incremental);
        assert!(IndicatorEngine::new(IndicatorMode::FullRecompute, "A", s, None, &[]).needs_history());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]
        #[test]
        fn incremental_matches_full_recompute_and_batch(
            points in prop::collection::vec((1.0f64..500.0, 0.0f64..5.0, 0.0f64..50_000.0), 1..80),
            split in 0usize..80,
        ) {
            let cs = candles(&points);
            let settings = IndicatorSettings::default();

            let mut full = IndicatorEngine::full_recompute("ABC", settings, Some(1.7));
            let full_rows = drive(&mut full, &cs);

            // Seed the incremental engine from a stored prefix, like a restart after backfill.
            let split = split.min(full_rows.len());
            let mut inc = IndicatorEngine::incremental("ABC", settings, Some(1.7), &full_rows[..split]);
            let mut inc_rows = full_rows[..split].to_vec();
            for c in &cs[split..] {
                let row = inc.next_row(c, &[]);
                inc.commit(&row);
                inc_rows.push(row);
            }

            prop_assert_eq!(&full_rows, &inc_rows);

            let batch_vwap = vwap_series(&cs);
            let batch_ema = ema_series(cs.iter().map(|c| c.close), settings.ema_period);
            for (i, row) in full_rows.iter().enumerate() {
                prop_assert_eq!(row.vwap, batch_vwap[i]);
                prop_assert_eq!(row.ema, batch_ema[i]);
            }
        }
    }
}

pub mod aggregator;

use std::str::FromStr;

use chrono::{NaiveDateTime, TimeDelta, Timelike};

pub use aggregator::{CandleAggregator, IngestOutcome};

pub const DEFAULT_BUCKET_WIDTH_SECS: i64 = 120;

/// Width of a candle bucket in whole seconds. Always positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketWidth(i64);

impl BucketWidth {
    pub fn from_secs(secs: i64) -> Option<Self> {
        (secs > 0).then_some(Self(secs))
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Floors `ts` to the start of the bucket containing it.
    ///
    /// Buckets are aligned to the epoch, so any width dividing an hour lines
    /// up with wall-clock minutes (2m buckets start at :00, :02, ...).
    pub fn floor(&self, ts: NaiveDateTime) -> NaiveDateTime {
        let whole = ts.with_nanosecond(0).unwrap_or(ts);
        let rem = whole.and_utc().timestamp().rem_euclid(self.0);
        whole - TimeDelta::seconds(rem)
    }
}

impl Default for BucketWidth {
    fn default() -> Self {
        Self(DEFAULT_BUCKET_WIDTH_SECS)
    }
}

/// What happens to the tick that crosses into a new bucket.
///
/// The crossing tick always seeds the new bucket. Only the closing bucket's
/// final values differ between the two policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RolloverPolicy {
    /// The closing bucket ends at its last in-window tick.
    #[default]
    CloseAtLastTick,

    /// The crossing tick is folded into the closing bucket before it is
    /// finalized, then reused to seed the next one.
    FoldCrossingTick,
}

impl FromStr for RolloverPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "close_at_last_tick" => Ok(Self::CloseAtLastTick),
            "fold_crossing_tick" => Ok(Self::FoldCrossingTick),
            other => Err(format!("unknown rollover policy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 2)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    #[test]
    fn two_minute_floor_matches_wall_clock() {
        let w = BucketWidth::default();
        assert_eq!(w.floor(at(10, 3, 59)), at(10, 2, 0));
        assert_eq!(w.floor(at(10, 4, 0)), at(10, 4, 0));
        assert_eq!(w.floor(at(23, 59, 5)), at(23, 58, 0));
    }

    #[test]
    fn sub_second_precision_is_dropped() {
        let w = BucketWidth::from_secs(60).unwrap();
        let ts = at(9, 30, 15) + TimeDelta::milliseconds(750);
        assert_eq!(w.floor(ts), at(9, 30, 0));
    }

    #[test]
    fn zero_or_negative_width_is_refused() {
        assert!(BucketWidth::from_secs(0).is_none());
        assert!(BucketWidth::from_secs(-60).is_none());
    }

    #[test]
    fn rollover_policy_parses_config_names() {
        assert_eq!(
            "fold_crossing_tick".parse::<RolloverPolicy>(),
            Ok(RolloverPolicy::FoldCrossingTick)
        );
        assert_eq!(
            " Close_At_Last_Tick ".parse::<RolloverPolicy>(),
            Ok(RolloverPolicy::CloseAtLastTick)
        );
        assert!("sometimes".parse::<RolloverPolicy>().is_err());
    }

    proptest! {
        #[test]
        fn floor_is_idempotent(secs in 0i64..4_000_000_000, width in 1i64..86_400) {
            let w = BucketWidth::from_secs(width).unwrap();
            let ts = chrono::DateTime::from_timestamp(secs, 0).unwrap().naive_utc();
            let once = w.floor(ts);
            prop_assert_eq!(w.floor(once), once);
            prop_assert!(once <= ts);
            prop_assert!(ts - once < TimeDelta::seconds(width));
        }
    }
}

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use super::{BucketWidth, RolloverPolicy};
use crate::types::{Candle, Tick};

/// Result of feeding one tick into the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// First bucket for this instrument was opened.
    Opened,

    /// Tick was folded into the open bucket.
    Updated,

    /// Tick crossed into a new boundary: the previous bucket is returned
    /// finalized and a fresh bucket was seeded from the tick.
    Rolled(Candle),

    /// Tick belongs to a boundary older than the open bucket.
    RejectedLate {
        boundary: NaiveDateTime,
        open_start: NaiveDateTime,
    },

    /// Non-finite price or negative/non-finite volume.
    RejectedInvalid,
}

/// Windowing state of one instrument.
#[derive(Debug, Default)]
struct InstrumentBuckets {
    seen: BTreeSet<NaiveDateTime>,
    open: Option<Candle>,
}

/// Buckets ticks into fixed-width candles, one open bucket per instrument.
///
/// State is owned and keyed by symbol; instruments never share a bucket, so a
/// pipeline that only ever feeds one symbol needs no locking at all.
/// Finalization is purely tick driven: an empty boundary is skipped and the
/// last bucket stays open until a later tick arrives.
#[derive(Debug, Default)]
pub struct CandleAggregator {
    width: BucketWidth,
    policy: RolloverPolicy,
    instruments: HashMap<String, InstrumentBuckets>,
}

impl CandleAggregator {
    pub fn new(width: BucketWidth, policy: RolloverPolicy) -> Self {
        Self {
            width,
            policy,
            instruments: HashMap::new(),
        }
    }

    pub fn width(&self) -> BucketWidth {
        self.width
    }

    pub fn ingest(&mut self, symbol: &str, tick: Tick) -> IngestOutcome {
        if !tick.price.is_finite() || !tick.volume.is_finite() || tick.volume < 0.0 {
            warn!(%symbol, price = tick.price, volume = tick.volume, "dropping malformed tick");
            return IngestOutcome::RejectedInvalid;
        }

        let boundary = self.width.floor(tick.ts);
        let state = self.instruments.entry(symbol.to_string()).or_default();

        if let Some(open) = &state.open {
            if boundary < open.start {
                warn!(
                    %symbol,
                    %boundary,
                    open_start = %open.start,
                    "rejecting late tick for an already finalized bucket"
                );
                return IngestOutcome::RejectedLate {
                    boundary,
                    open_start: open.start,
                };
            }
        }

        if !state.seen.insert(boundary) {
            // Seen and not older than the open bucket: it is the open bucket.
            if let Some(open) = state.open.as_mut() {
                open.fold(tick.price, tick.volume);
            }
            return IngestOutcome::Updated;
        }

        // Boundaries older than the open bucket can never be accepted again.
        state.seen = state.seen.split_off(&boundary);

        let fresh = Candle::seed(symbol, boundary, tick.price, tick.volume);
        match state.open.replace(fresh) {
            Some(mut closing) => {
                if self.policy == RolloverPolicy::FoldCrossingTick {
                    closing.fold(tick.price, tick.volume);
                }
                debug!(%symbol, start = %closing.start, next = %boundary, "bucket finalized");
                IngestOutcome::Rolled(closing)
            }
            None => {
                debug!(%symbol, start = %boundary, "first bucket opened");
                IngestOutcome::Opened
            }
        }
    }

    pub fn open_candle(&self, symbol: &str) -> Option<&Candle> {
        self.instruments.get(symbol).and_then(|s| s.open.as_ref())
    }

    /// Buckets still open, e.g. for reporting at shutdown. They are never
    /// finalized without a following tick.
    pub fn open_candles(&self) -> impl Iterator<Item = &Candle> {
        self.instruments.values().filter_map(|s| s.open.as_ref())
    }
}

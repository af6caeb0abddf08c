use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Sub-minute price/volume update delivered by a live subscription.
///
/// Timestamps are exchange-local wall clock; the feed adapter is responsible
/// for any timezone conversion before ticks reach the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub ts: NaiveDateTime,
    pub price: f64,
    /// Volume traded since the previous tick (not cumulative).
    pub volume: f64,
}

/// Historical OHLCV bar as returned by the upstream history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Fixed-width OHLCV bucket.
///
/// Mutable only while it is the open bucket of the aggregator; once
/// finalized it is handed off by value and never touched again.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub start: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Opens a bucket from its first tick (open = high = low = close).
    pub fn seed(symbol: &str, start: NaiveDateTime, price: f64, volume: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    pub fn fold(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }
}

/// Finalized candle plus derived indicators, one per (symbol, date, time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: f64,
    pub ema: f64,
    /// `None` when no usable ATR snapshot exists for the instrument.
    pub relatr: Option<f64>,
}

impl HistoricalRow {
    pub fn from_candle(candle: &Candle, vwap: f64, ema: f64, relatr: Option<f64>) -> Self {
        Self {
            symbol: candle.symbol.clone(),
            date: candle.start.date(),
            time: candle.start.time(),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            vwap,
            ema,
            relatr,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// Persisted alert. The timestamp is the bar time that produced it, which
/// is also the anchor of the recency dedup window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub symbol: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub message: String,
}

impl Alarm {
    pub fn new(symbol: &str, ts: NaiveDateTime, message: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            date: ts.date(),
            time: ts.time(),
            message: message.into(),
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// Read access to OHLCV fields, shared by bars, candles and stored rows so
/// the indicator functions work on any of them.
pub trait Ohlcv {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Typical price, (O + H + L + C) / 4.
    fn ohlc4(&self) -> f64 {
        (self.open() + self.high() + self.low() + self.close()) / 4.0
    }
}

macro_rules! impl_ohlcv {
    ($($t:ty),*) => {
        $(
            impl Ohlcv for $t {
                fn open(&self) -> f64 { self.open }
                fn high(&self) -> f64 { self.high }
                fn low(&self) -> f64 { self.low }
                fn close(&self) -> f64 { self.close }
                fn volume(&self) -> f64 { self.volume }
            }
        )*
    };
}

impl_ohlcv!(Bar, Candle, HistoricalRow);

pub mod candle;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod symbols;
pub mod types;

pub use error::{ComputationError, FeedError};
pub use types::{Alarm, Bar, Candle, HistoricalRow, Ohlcv, Tick};

use thiserror::Error;

/// Upstream feed failure. Scoped to a single instrument unless it is a
/// connection failure, which ends the run.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed connection failed: {0}")]
    Connection(String),

    #[error("history request for {symbol} failed: {reason}")]
    History { symbol: String, reason: String },

    #[error("no history returned for {symbol}")]
    EmptyHistory { symbol: String },

    #[error("tick subscription for {symbol} failed: {reason}")]
    Subscription { symbol: String, reason: String },
}

/// Malformed or missing indicator input. Always recovered where it is raised
/// by substituting a null or default value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    #[error("ATR snapshot missing")]
    MissingAtr,

    #[error("ATR snapshot is zero")]
    ZeroAtr,

    #[error("non-finite input: {0}")]
    NonFinite(&'static str),
}

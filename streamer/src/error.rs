use market::FeedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Run-ending failures. Everything else is scoped to one instrument or
/// one candle and reported through [`PipelineFailure`].
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("upstream feed unavailable: {0}")]
    Connect(#[source] FeedError),
}

/// A failure inside a detached pipeline task, delivered to the collector
/// instead of being dropped with the task.
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    pub symbol: String,
    pub stage: &'static str,
    pub error: String,
}

impl PipelineFailure {
    pub fn new(symbol: &str, stage: &'static str, error: impl ToString) -> Self {
        Self {
            symbol: symbol.to_string(),
            stage,
            error: error.to_string(),
        }
    }
}

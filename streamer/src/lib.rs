pub mod config;
pub mod error;
pub mod metrics;
pub mod supervisor;
pub mod worker;

pub use config::{AppConfig, TelegramConfig};
pub use error::{ConfigError, PipelineFailure, SupervisorError};
pub use metrics::counters::Counters;
pub use supervisor::{Phase, PipelineSettings, RunSummary, Supervisor};
pub use worker::FinalizationWorker;

pub mod detectors;
pub mod engine;
pub mod error;
pub mod notifier;
pub mod runner;
pub mod strategy;

pub use detectors::DetectorSettings;
pub use engine::{AlarmEngine, AlarmOutcome, DEFAULT_DEDUP_MINUTES};
pub use error::{AlarmError, NotificationError};
pub use notifier::{LogNotifier, Notifier, TelegramNotifier, format_notification};
pub use runner::{StrategyReport, StrategyRunner};
pub use strategy::{Signal, Strategy, StrategyKind};

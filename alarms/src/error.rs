use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum AlarmError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

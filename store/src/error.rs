use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed {column} in stored row for {symbol}: {value}")]
    Malformed {
        symbol: String,
        column: &'static str,
        value: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

use sqlx::SqlitePool;

/// Stored date/time text formats. Both sort lexicographically in time order.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Candle history, one row per finalized bucket
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS candles (
  symbol TEXT NOT NULL,
  date TEXT NOT NULL,
  time TEXT NOT NULL,
  open REAL NOT NULL,
  high REAL NOT NULL,
  low REAL NOT NULL,
  close REAL NOT NULL,
  volume REAL NOT NULL,
  vwap REAL NOT NULL,
  ema REAL NOT NULL,
  relatr REAL
);
"#,
    )
    .execute(pool)
    .await?;

    // Alarm log
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS alarms (
  symbol TEXT NOT NULL,
  time TEXT NOT NULL,
  alarm TEXT NOT NULL,
  date TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_candles_key ON candles(symbol, date, time);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_alarms_symbol ON alarms(symbol, date, time);"#)
        .execute(pool)
        .await?;

    Ok(())
}

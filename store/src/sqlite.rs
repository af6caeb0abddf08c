//! SQLite-backed [`HistoryStore`].
//!
//! Dates and times are stored as ISO text so that `ORDER BY date, time`
//! is chronological and the recency query can compare them directly.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use market::{Alarm, HistoricalRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::schema::{self, DATE_FORMAT, TIME_FORMAT};
use crate::{AppendOutcome, HistoryStore, StoreError};

const ROW_COLUMNS: &str =
    "symbol, date, time, open, high, low, close, volume, vwap, ema, relatr";

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Wraps an existing pool. The schema must already exist; see [`migrate`](Self::migrate).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `url` and ensures the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(%url, "history store ready");
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        schema::migrate(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Existence check then insert, on one connection so it can run inside a
/// transaction. A unique-index violation from a concurrent writer counts as
/// a duplicate as well.
async fn insert_if_absent(
    conn: &mut SqliteConnection,
    row: &HistoricalRow,
) -> Result<AppendOutcome, StoreError> {
    let date = row.date.format(DATE_FORMAT).to_string();
    let time = row.time.format(TIME_FORMAT).to_string();

    let exists = sqlx::query("SELECT 1 FROM candles WHERE symbol = ? AND date = ? AND time = ? LIMIT 1")
        .bind(&row.symbol)
        .bind(&date)
        .bind(&time)
        .fetch_optional(&mut *conn)
        .await?
        .is_some();

    if exists {
        return Ok(AppendOutcome::Duplicate);
    }

    let inserted = sqlx::query(&format!(
        "INSERT INTO candles ({ROW_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&row.symbol)
    .bind(&date)
    .bind(&time)
    .bind(row.open)
    .bind(row.high)
    .bind(row.low)
    .bind(row.close)
    .bind(row.volume)
    .bind(row.vwap)
    .bind(row.ema)
    .bind(row.relatr)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => Ok(AppendOutcome::Inserted),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(AppendOutcome::Duplicate),
        Err(e) => Err(e.into()),
    }
}

fn row_to_historical(r: &SqliteRow) -> Result<HistoricalRow, StoreError> {
    let symbol: String = r.try_get("symbol")?;
    let date_str: String = r.try_get("date")?;
    let time_str: String = r.try_get("time")?;

    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|_| StoreError::Malformed {
        symbol: symbol.clone(),
        column: "date",
        value: date_str.clone(),
    })?;
    let time = NaiveTime::parse_from_str(&time_str, TIME_FORMAT).map_err(|_| StoreError::Malformed {
        symbol: symbol.clone(),
        column: "time",
        value: time_str.clone(),
    })?;

    Ok(HistoricalRow {
        date,
        time,
        open: r.try_get("open")?,
        high: r.try_get("high")?,
        low: r.try_get("low")?,
        close: r.try_get("close")?,
        volume: r.try_get("volume")?,
        vwap: r.try_get("vwap")?,
        ema: r.try_get("ema")?,
        relatr: r.try_get("relatr")?,
        symbol,
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn reset(&self) -> Result<(), StoreError> {
        let deleted = sqlx::query("DELETE FROM candles").execute(&self.pool).await?;
        info!(rows = deleted.rows_affected(), "candle history cleared");
        Ok(())
    }

    async fn fetch_all(&self, symbol: &str) -> Result<Vec<HistoricalRow>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM candles WHERE symbol = ? ORDER BY date ASC, time ASC"
        ))
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_historical).collect()
    }

    async fn fetch_last(&self, symbol: &str, n: usize) -> Result<Vec<HistoricalRow>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM candles WHERE symbol = ? ORDER BY date DESC, time DESC LIMIT ?"
        ))
        .bind(symbol)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = rows.iter().map(row_to_historical).collect::<Result<Vec<_>, _>>()?;
        out.reverse();
        Ok(out)
    }

    async fn append(&self, row: &HistoricalRow) -> Result<AppendOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let outcome = insert_if_absent(&mut *conn, row).await?;
        if outcome == AppendOutcome::Duplicate {
            debug!(symbol = %row.symbol, date = %row.date, time = %row.time, "row already stored");
        }
        Ok(outcome)
    }

    async fn append_many(&self, rows: &[HistoricalRow]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for row in rows {
            if insert_if_absent(&mut *tx, row).await? == AppendOutcome::Inserted {
                inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn append_alarm(&self, alarm: &Alarm) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO alarms (symbol, time, alarm, date) VALUES (?, ?, ?, ?)")
            .bind(&alarm.symbol)
            .bind(alarm.time.format(TIME_FORMAT).to_string())
            .bind(&alarm.message)
            .bind(alarm.date.format(DATE_FORMAT).to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn alarm_exists_since(&self, symbol: &str, cutoff: NaiveDateTime) -> Result<bool, StoreError> {
        let date = cutoff.date().format(DATE_FORMAT).to_string();
        let time = cutoff.time().format(TIME_FORMAT).to_string();

        let found = sqlx::query(
            r#"
SELECT 1 FROM alarms
WHERE symbol = ?
  AND (date > ? OR (date = ? AND time >= ?))
LIMIT 1;
"#,
        )
        .bind(symbol)
        .bind(&date)
        .bind(&date)
        .bind(&time)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }
}

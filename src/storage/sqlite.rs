use chrono::{DateTime, SecondsFormat, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;
use crate::model::{PriceBar, Timeframe};
use crate::storage::{BarCache, CachedBars};

type BarRow = (String, f64, f64, f64, f64, Option<f64>, f64);

pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

impl BarCache for SqliteCache {
    fn store_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: &[PriceBar],
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let symbol = symbol.to_string();
        let bars = bars.to_vec();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .change_context(StorageError::Insert)?;

            // Provider history can be revised, so the stored range is replaced wholesale.
            sqlx::query("DELETE FROM bars WHERE symbol = ? AND timeframe = ?")
                .bind(&symbol)
                .bind(timeframe.as_str())
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Insert)?;

            for b in &bars {
                sqlx::query(
                    "INSERT OR REPLACE INTO bars \
                     (symbol, timeframe, date, open, high, low, close, adj_close, volume) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&symbol)
                .bind(timeframe.as_str())
                .bind(format_time(b.date))
                .bind(b.open)
                .bind(b.high)
                .bind(b.low)
                .bind(b.close)
                .bind(b.adj_close)
                .bind(b.volume)
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Insert)?;
            }

            sqlx::query(
                "INSERT OR REPLACE INTO fetches (symbol, timeframe, fetched_at) VALUES (?, ?, ?)",
            )
            .bind(&symbol)
            .bind(timeframe.as_str())
            .bind(format_time(Utc::now()))
            .execute(&mut *tx)
            .await
            .change_context(StorageError::Insert)?;

            tx.commit().await.change_context(StorageError::Insert)?;
            Ok(())
        })
    }

    fn cached_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> BoxFuture<'_, Result<Option<CachedBars>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let fetched: Option<(String,)> = sqlx::query_as(
                "SELECT fetched_at FROM fetches WHERE symbol = ? AND timeframe = ? LIMIT 1",
            )
            .bind(&symbol)
            .bind(timeframe.as_str())
            .fetch_optional(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            let Some((fetched_at,)) = fetched else {
                return Ok(None);
            };
            let fetched_at = parse_time_utc(&fetched_at)?;

            let rows: Vec<BarRow> = sqlx::query_as(
                "SELECT date, open, high, low, close, adj_close, volume \
                 FROM bars \
                 WHERE symbol = ? AND timeframe = ? \
                 ORDER BY date ASC",
            )
            .bind(&symbol)
            .bind(timeframe.as_str())
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            let bars = rows
                .into_iter()
                .map(map_bar_row)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some(CachedBars { fetched_at, bars }))
        })
    }
}

fn map_bar_row(
    (date, open, high, low, close, adj_close, volume): BarRow,
) -> Result<PriceBar, Report<StorageError>> {
    Ok(PriceBar {
        date: parse_time_utc(&date)?,
        open,
        high,
        low,
        close,
        adj_close,
        volume,
    })
}

/// Fixed-width UTC timestamps keep `ORDER BY date` chronological.
fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time_utc(value: &str) -> Result<DateTime<Utc>, Report<StorageError>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .change_context(StorageError::Query)
        .attach_with(|| format!("stored timestamp: {value}"))
}

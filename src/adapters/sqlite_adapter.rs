//! SQLite adapter: price supplier, derived-value cache and aggregate store.

use crate::domain::breadth::AggregateRecord;
use crate::domain::cache::MetricCacheEntry;
use crate::domain::error::BreadthscanError;
use crate::domain::price::PricePoint;
use crate::domain::universe::{canonicalize, set_hash, SecuritySet};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::store_port::StorePort;
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::time::Duration;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS prices (
    ticker TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL,
    high REAL,
    low REAL,
    close REAL,
    volume REAL,
    PRIMARY KEY (ticker, date)
);
CREATE TABLE IF NOT EXISTS security_sets (
    set_hash TEXT PRIMARY KEY,
    tickers TEXT NOT NULL,
    ticker_count INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS metric_cache (
    ticker TEXT NOT NULL,
    as_of_date TEXT NOT NULL,
    interval TEXT NOT NULL,
    metric_key TEXT NOT NULL,
    value REAL NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (ticker, as_of_date, interval, metric_key)
);
CREATE TABLE IF NOT EXISTS aggregate_series (
    set_hash TEXT NOT NULL,
    as_of_date TEXT NOT NULL,
    interval TEXT NOT NULL,
    metric_key TEXT NOT NULL,
    value REAL,
    valid_count INTEGER NOT NULL,
    missing_count INTEGER NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (set_hash, as_of_date, interval, metric_key)
);
CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date);
CREATE INDEX IF NOT EXISTS idx_aggregate_series_key ON aggregate_series(set_hash, interval, metric_key);";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> BreadthscanError {
    BreadthscanError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> BreadthscanError {
    BreadthscanError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(column: usize, text: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(column: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BreadthscanError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| BreadthscanError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        let timeout = config.get_int("sqlite", "connect_timeout", 5).max(1) as u64;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(timeout))
            .build(manager)
            .map_err(pool_err)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, BreadthscanError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, BreadthscanError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), BreadthscanError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    pub fn insert_prices(&self, ticker: &str, rows: &[PricePoint]) -> Result<(), BreadthscanError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO prices (ticker, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    ticker,
                    format_date(row.date),
                    row.open,
                    row.high,
                    row.low,
                    row.close,
                    row.volume
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, BreadthscanError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, open, high, low, close, volume
                 FROM prices
                 WHERE ticker = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![ticker, format_date(start_date), format_date(end_date)],
                |row| {
                    let date_str: String = row.get(0)?;
                    Ok(PricePoint {
                        date: parse_date(0, &date_str)?,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn list_tickers(&self) -> Result<Vec<String>, BreadthscanError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT ticker FROM prices ORDER BY ticker")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_err)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BreadthscanError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM prices WHERE ticker = ?1",
                params![ticker],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let min = parse_date(0, &min_str).map_err(query_err)?;
                let max = parse_date(1, &max_str).map_err(query_err)?;
                Ok(Some((min, max, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl StorePort for SqliteAdapter {
    fn get_or_create_security_set(&self, tickers: &[String]) -> Result<String, BreadthscanError> {
        let canonical = canonicalize(tickers);
        let hash = set_hash(&canonical);
        self.conn()?
            .execute(
                "INSERT INTO security_sets (set_hash, tickers, ticker_count, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(set_hash) DO NOTHING",
                params![
                    hash,
                    canonical.join(","),
                    canonical.len() as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(query_err)?;
        Ok(hash)
    }

    fn fetch_security_set(&self, set_hash: &str) -> Result<Option<SecuritySet>, BreadthscanError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT set_hash, tickers, created_at FROM security_sets WHERE set_hash = ?1")
            .map_err(query_err)?;
        let mut rows = stmt
            .query_map(params![set_hash], |row| {
                let tickers: String = row.get(1)?;
                let created_at: String = row.get(2)?;
                Ok(SecuritySet {
                    set_hash: row.get(0)?,
                    tickers: tickers.split(',').map(str::to_string).collect(),
                    created_at: parse_timestamp(2, &created_at)?,
                })
            })
            .map_err(query_err)?;
        rows.next().transpose().map_err(query_err)
    }

    fn upsert_metric_values(&self, entries: &[MetricCacheEntry]) -> Result<usize, BreadthscanError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for entry in entries {
            tx.execute(
                "INSERT INTO metric_cache (ticker, as_of_date, interval, metric_key, value, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(ticker, as_of_date, interval, metric_key)
                 DO UPDATE SET value = excluded.value, computed_at = excluded.computed_at",
                params![
                    entry.ticker,
                    format_date(entry.as_of_date),
                    entry.interval,
                    entry.metric_key,
                    entry.value,
                    entry.computed_at.to_rfc3339()
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(entries.len())
    }

    fn fetch_metric_values(
        &self,
        ticker: &str,
        interval: &str,
        metric_key: Option<&str>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<MetricCacheEntry>, BreadthscanError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ticker, as_of_date, interval, metric_key, value, computed_at
                 FROM metric_cache
                 WHERE ticker = ?1 AND interval = ?2 AND (?3 IS NULL OR metric_key = ?3)
                   AND as_of_date >= ?4 AND as_of_date <= ?5
                 ORDER BY as_of_date ASC, metric_key ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    ticker,
                    interval,
                    metric_key,
                    format_date(start_date),
                    format_date(end_date)
                ],
                |row| {
                    let date_str: String = row.get(1)?;
                    let computed_at: String = row.get(5)?;
                    Ok(MetricCacheEntry {
                        ticker: row.get(0)?,
                        as_of_date: parse_date(1, &date_str)?,
                        interval: row.get(2)?,
                        metric_key: row.get(3)?,
                        value: row.get(4)?,
                        computed_at: parse_timestamp(5, &computed_at)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn upsert_aggregate_values(&self, records: &[AggregateRecord]) -> Result<usize, BreadthscanError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let computed_at = Utc::now().to_rfc3339();

        for record in records {
            tx.execute(
                "INSERT INTO aggregate_series
                    (set_hash, as_of_date, interval, metric_key, value, valid_count, missing_count, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(set_hash, as_of_date, interval, metric_key)
                 DO UPDATE SET value = excluded.value,
                               valid_count = excluded.valid_count,
                               missing_count = excluded.missing_count,
                               computed_at = excluded.computed_at",
                params![
                    record.set_hash,
                    format_date(record.as_of_date),
                    record.interval,
                    record.metric_key,
                    record.value,
                    record.valid_count as i64,
                    record.missing_count as i64,
                    computed_at
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(records.len())
    }

    fn fetch_aggregate_series(
        &self,
        set_hash: &str,
        interval: &str,
        metric_key: Option<&str>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<AggregateRecord>, BreadthscanError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT set_hash, as_of_date, interval, metric_key, value, valid_count, missing_count
                 FROM aggregate_series
                 WHERE set_hash = ?1 AND interval = ?2 AND (?3 IS NULL OR metric_key = ?3)
                   AND as_of_date >= ?4 AND as_of_date <= ?5
                 ORDER BY as_of_date ASC, metric_key ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    set_hash,
                    interval,
                    metric_key,
                    format_date(start_date),
                    format_date(end_date)
                ],
                |row| {
                    let date_str: String = row.get(1)?;
                    Ok(AggregateRecord {
                        set_hash: row.get(0)?,
                        as_of_date: parse_date(1, &date_str)?,
                        interval: row.get(2)?,
                        metric_key: row.get(3)?,
                        value: row.get(4)?,
                        valid_count: row.get::<_, i64>(5)? as usize,
                        missing_count: row.get::<_, i64>(6)? as usize,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

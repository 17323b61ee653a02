//! Derived-value cache and aggregate store port trait.
//!
//! Writes are insert-or-update on each record's unique key, so repeating a
//! write with the same values leaves the store unchanged.

use crate::domain::breadth::AggregateRecord;
use crate::domain::cache::MetricCacheEntry;
use crate::domain::error::BreadthscanError;
use crate::domain::universe::SecuritySet;
use chrono::NaiveDate;

pub trait StorePort {
    /// Persist the canonical form of `tickers` if new and return its hash.
    fn get_or_create_security_set(&self, tickers: &[String]) -> Result<String, BreadthscanError>;

    fn fetch_security_set(&self, set_hash: &str) -> Result<Option<SecuritySet>, BreadthscanError>;

    fn upsert_metric_values(&self, entries: &[MetricCacheEntry]) -> Result<usize, BreadthscanError>;

    /// Entries ordered by date then metric key. `metric_key = None` matches all keys.
    fn fetch_metric_values(
        &self,
        ticker: &str,
        interval: &str,
        metric_key: Option<&str>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<MetricCacheEntry>, BreadthscanError>;

    fn upsert_aggregate_values(&self, records: &[AggregateRecord]) -> Result<usize, BreadthscanError>;

    /// Records ordered by date then metric key. `metric_key = None` matches all keys.
    fn fetch_aggregate_series(
        &self,
        set_hash: &str,
        interval: &str,
        metric_key: Option<&str>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<AggregateRecord>, BreadthscanError>;
}

//! Per-ticker derived-value cache.
//!
//! Moving averages and ROC values feeding breadth are keyed by
//! `(ticker, as_of_date, interval, metric_key)`. The resolver serves values
//! preloaded from the store and remembers what it had to compute so the
//! caller can persist only the new entries. Absent values are never cached.

use crate::domain::series_math::{roc, sma};
use crate::domain::summary::TickerSummary;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DerivedMetric {
    Sma { window: usize, shift: usize },
    Roc { lookback: usize, shift: usize },
}

impl DerivedMetric {
    /// `sma:{W}`, `sma:{W}:{S}`, `roc:{L}` or `roc:{L}:{S}`.
    pub fn cache_key(&self) -> String {
        let (name, n, shift) = match *self {
            DerivedMetric::Sma { window, shift } => ("sma", window, shift),
            DerivedMetric::Roc { lookback, shift } => ("roc", lookback, shift),
        };
        if shift == 0 {
            format!("{}:{}", name, n)
        } else {
            format!("{}:{}:{}", name, n, shift)
        }
    }

    pub fn compute(&self, closes: &[Option<f64>]) -> Option<f64> {
        match *self {
            DerivedMetric::Sma { window, shift } => sma(closes, window, shift),
            DerivedMetric::Roc { lookback, shift } => roc(closes, lookback, shift),
        }
    }
}

impl fmt::Display for DerivedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCacheEntry {
    pub ticker: String,
    pub as_of_date: NaiveDate,
    pub interval: String,
    pub metric_key: String,
    pub value: f64,
    pub computed_at: DateTime<Utc>,
}

type CacheKey = (String, NaiveDate, String);

#[derive(Debug, Default)]
pub struct MetricResolver {
    interval: String,
    known: HashMap<CacheKey, f64>,
    fresh: Vec<MetricCacheEntry>,
    hits: usize,
}

impl MetricResolver {
    pub fn new(interval: impl Into<String>) -> Self {
        Self {
            interval: interval.into(),
            ..Self::default()
        }
    }

    pub fn preload<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = MetricCacheEntry>,
    {
        for entry in entries {
            if entry.interval == self.interval {
                self.known
                    .insert((entry.ticker, entry.as_of_date, entry.metric_key), entry.value);
            }
        }
    }

    /// Value of `metric` at the summary's last bar, from cache when known.
    pub fn resolve(&mut self, summary: &TickerSummary, metric: DerivedMetric) -> Option<f64> {
        let key = (
            summary.ticker.clone(),
            summary.last_date,
            metric.cache_key(),
        );
        if let Some(&value) = self.known.get(&key) {
            self.hits += 1;
            return Some(value);
        }

        let value = metric.compute(&summary.closes)?;
        self.fresh.push(MetricCacheEntry {
            ticker: key.0.clone(),
            as_of_date: key.1,
            interval: self.interval.clone(),
            metric_key: key.2.clone(),
            value,
            computed_at: Utc::now(),
        });
        self.known.insert(key, value);
        Some(value)
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Entries computed since the last call, for persisting.
    pub fn take_fresh(&mut self) -> Vec<MetricCacheEntry> {
        std::mem::take(&mut self.fresh)
    }
}

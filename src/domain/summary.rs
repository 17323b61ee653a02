//! Per-ticker snapshot the aggregation engine reads.

use crate::domain::issue::Issue;
use crate::domain::price::{closes, PricePoint};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSummary {
    pub ticker: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub last_close: Option<f64>,
    pub prior_close: Option<f64>,
    /// Close `n` bars before the last bar, keyed by `n`.
    pub close_by_offset: BTreeMap<usize, Option<f64>>,
    pub series_length: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(skip)]
    pub closes: Vec<Option<f64>>,
}

impl TickerSummary {
    pub fn close_at_offset(&self, offset: usize) -> Option<f64> {
        match self.close_by_offset.get(&offset) {
            Some(close) => *close,
            None => self.lookup_close(offset),
        }
    }

    fn lookup_close(&self, offset: usize) -> Option<f64> {
        let index = self.closes.len().checked_sub(offset + 1)?;
        self.closes[index]
    }
}

/// Summarise `rows` (already cut at the evaluation date). `None` when there
/// are no rows at all.
pub fn build_summary(ticker: &str, rows: &[PricePoint], offsets: &[usize]) -> Option<TickerSummary> {
    let first = rows.first()?;
    let last = rows.last()?;

    let mut summary = TickerSummary {
        ticker: ticker.to_string(),
        first_date: first.date,
        last_date: last.date,
        last_close: None,
        prior_close: None,
        close_by_offset: BTreeMap::new(),
        series_length: rows.len(),
        issues: Vec::new(),
        closes: closes(rows),
    };

    summary.last_close = summary.lookup_close(0);
    summary.prior_close = summary.lookup_close(1);
    for &offset in offsets {
        let close = summary.lookup_close(offset);
        summary.close_by_offset.insert(offset, close);
    }

    if summary.last_close.is_none() {
        summary.issues.push(Issue::data(
            ticker,
            format!("no valid close on {}", last.date),
        ));
    }

    Some(summary)
}

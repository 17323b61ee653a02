#![allow(dead_code)]

use breadthscan::domain::error::BreadthscanError;
use breadthscan::domain::price::PricePoint;
use breadthscan::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_rows(mut self, ticker: &str, rows: Vec<PricePoint>) -> Self {
        self.data.insert(ticker.to_string(), rows);
        self
    }

    pub fn with_closes(self, ticker: &str, closes: &[f64]) -> Self {
        self.with_rows(ticker, make_points(closes))
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, BreadthscanError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(BreadthscanError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(ticker)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.date >= start_date && r.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_tickers(&self) -> Result<Vec<String>, BreadthscanError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BreadthscanError> {
        Ok(self.data.get(ticker).and_then(|rows| {
            let first = rows.first()?.date;
            let last = rows.last()?.date;
            Some((first, last, rows.len()))
        }))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// First bar date used by every fixture.
pub fn base_date() -> NaiveDate {
    date(2024, 1, 1)
}

pub fn nth_date(n: usize) -> NaiveDate {
    base_date() + chrono::Duration::days(n as i64)
}

pub fn make_point(n: usize, close: f64) -> PricePoint {
    PricePoint {
        date: nth_date(n),
        open: Some(close),
        high: Some(close + 1.0),
        low: Some(close - 1.0),
        close: Some(close),
        volume: Some(1_000.0),
    }
}

/// Consecutive daily rows from `base_date()`.
pub fn make_points(closes: &[f64]) -> Vec<PricePoint> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_point(i, c))
        .collect()
}

/// Linear price path of `count` bars.
pub fn generate_points(count: usize, start: f64, step: f64) -> Vec<f64> {
    (0..count).map(|i| start + step * i as f64).collect()
}

/// CSV body in the layout the CSV adapter reads.
pub fn csv_body(closes: &[f64]) -> String {
    let mut body = String::from("date,open,high,low,close,volume\n");
    for point in make_points(closes) {
        let close = point.close.unwrap_or_default();
        body.push_str(&format!(
            "{},{},{},{},{},1000\n",
            point.date,
            close,
            close + 1.0,
            close - 1.0,
            close
        ));
    }
    body
}

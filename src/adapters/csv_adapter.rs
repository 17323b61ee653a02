//! CSV directory price adapter.
//!
//! One file per ticker named `{TICKER}.csv` with a `date` column and any of
//! `open,high,low,close,volume`. Blank cells and absent columns are nulls.

use crate::domain::error::BreadthscanError;
use crate::domain::price::PricePoint;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }

    fn read_all(&self, ticker: &str) -> Result<Vec<PricePoint>, BreadthscanError> {
        let path = self.csv_path(ticker);
        if !path.exists() {
            return Err(BreadthscanError::NoData {
                ticker: ticker.to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut rows = Vec::new();

        for result in rdr.deserialize::<CsvRow>() {
            let row = result.map_err(|e| BreadthscanError::Database {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            rows.push(PricePoint {
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);
        Ok(rows)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, BreadthscanError> {
        let mut rows = self.read_all(ticker)?;
        rows.retain(|r| r.date >= start_date && r.date <= end_date);
        Ok(rows)
    }

    fn list_tickers(&self) -> Result<Vec<String>, BreadthscanError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| BreadthscanError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    tickers.push(stem.to_string_lossy().to_uppercase());
                }
            }
        }

        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BreadthscanError> {
        let rows = match self.read_all(ticker) {
            Ok(rows) => rows,
            Err(BreadthscanError::NoData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, rows.len())),
            _ => None,
        })
    }
}

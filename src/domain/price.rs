//! Price rows as delivered by the price supplier.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One dated OHLCV row. Every numeric field may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl PricePoint {
    /// A row carrying only a close, the common shape for breadth inputs.
    pub fn from_close(date: NaiveDate, close: Option<f64>) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: None,
        }
    }

    /// Close if present and finite.
    pub fn valid_close(&self) -> Option<f64> {
        self.close.filter(|c| c.is_finite())
    }
}

/// Closes of `rows`, position for position, with non-finite values dropped.
pub fn closes(rows: &[PricePoint]) -> Vec<Option<f64>> {
    rows.iter().map(PricePoint::valid_close).collect()
}

/// Rows dated on or before `as_of`. Rows must be ascending by date.
pub fn rows_through(rows: &[PricePoint], as_of: NaiveDate) -> &[PricePoint] {
    let end = rows.partition_point(|row| row.date <= as_of);
    &rows[..end]
}

/// True when dates strictly increase.
pub fn is_ordered(rows: &[PricePoint]) -> bool {
    rows.windows(2).all(|pair| pair[0].date < pair[1].date)
}

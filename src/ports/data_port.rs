//! Price supplier port trait.

use crate::domain::error::BreadthscanError;
use crate::domain::price::PricePoint;
use chrono::NaiveDate;

pub trait DataPort {
    /// Rows for `ticker` within `[start_date, end_date]`, ascending by date.
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, BreadthscanError>;

    fn list_tickers(&self) -> Result<Vec<String>, BreadthscanError>;

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BreadthscanError>;
}

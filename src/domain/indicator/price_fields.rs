//! Raw OHLCV fields exposed as series.

use crate::domain::error::BreadthscanError;
use crate::domain::indicator::{Computation, ComputeContext, ComputeError, IndicatorSettings};
use crate::domain::price::{is_ordered, PricePoint};
use crate::domain::series::{to_points, SeriesBundle};

pub const SERIES: &[&str] = &["open", "high", "low", "close", "volume"];

#[derive(Debug, Clone, PartialEq)]
pub struct PriceFields;

pub fn from_settings(
    _settings: &IndicatorSettings,
) -> Result<Box<dyn Computation>, BreadthscanError> {
    Ok(Box::new(PriceFields))
}

impl Computation for PriceFields {
    fn type_name(&self) -> &'static str {
        "price"
    }

    fn series_names(&self) -> &'static [&'static str] {
        SERIES
    }

    fn warmup(&self) -> usize {
        0
    }

    fn label(&self) -> String {
        "PRICE".to_string()
    }

    fn compute_series(
        &self,
        rows: &[PricePoint],
        _ctx: &ComputeContext<'_>,
    ) -> Result<SeriesBundle, ComputeError> {
        if !is_ordered(rows) {
            return Err(ComputeError::Unordered);
        }
        let dates: Vec<_> = rows.iter().map(|r| r.date).collect();

        Ok(SeriesBundle::new(0)
            .with_series("open", to_points(&dates, &field(rows, |r| r.open)))
            .with_series("high", to_points(&dates, &field(rows, |r| r.high)))
            .with_series("low", to_points(&dates, &field(rows, |r| r.low)))
            .with_series("close", to_points(&dates, &field(rows, |r| r.close)))
            .with_series("volume", to_points(&dates, &field(rows, |r| r.volume))))
    }
}

fn field(rows: &[PricePoint], get: impl Fn(&PricePoint) -> Option<f64>) -> Vec<Option<f64>> {
    rows.iter().map(get).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn exposes_each_field() {
        let rows = vec![PricePoint {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            open: Some(1.0),
            high: Some(2.0),
            low: None,
            close: Some(1.5),
            volume: Some(900.0),
        }];
        let bundle = PriceFields
            .compute_series(&rows, &ComputeContext::default())
            .unwrap();

        assert_eq!(bundle.get("high").unwrap()[0].value, Some(2.0));
        assert_eq!(bundle.get("low").unwrap()[0].value, None);
        assert_eq!(bundle.get("volume").unwrap()[0].value, Some(900.0));
        assert_eq!(bundle.len(), SERIES.len());
    }
}

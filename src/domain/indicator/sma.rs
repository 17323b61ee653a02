//! SMA (Simple Moving Average) of closes, optionally shifted back.
//!
//! SMA(n, s)[i] = mean(C[i-s-n+1 ..= i-s])
//! Warmup: first n + s - 1 bars absent.
//!
//! Also emits the close itself so rules can cross price against its average.

use crate::domain::error::BreadthscanError;
use crate::domain::indicator::{Computation, ComputeContext, ComputeError, IndicatorSettings};
use crate::domain::price::{closes, is_ordered, PricePoint};
use crate::domain::series::{to_points, SeriesBundle};
use crate::domain::series_math::sma_series;

pub const SERIES: &[&str] = &["close", "sma"];

#[derive(Debug, Clone, PartialEq)]
pub struct SmaIndicator {
    pub window: usize,
    pub shift: usize,
}

pub fn from_settings(
    settings: &IndicatorSettings,
) -> Result<Box<dyn Computation>, BreadthscanError> {
    Ok(Box::new(SmaIndicator {
        window: settings.positive("window", 13)?,
        shift: settings.non_negative("shift", 0)?,
    }))
}

impl Computation for SmaIndicator {
    fn type_name(&self) -> &'static str {
        "sma"
    }

    fn series_names(&self) -> &'static [&'static str] {
        SERIES
    }

    fn warmup(&self) -> usize {
        self.window + self.shift - 1
    }

    fn label(&self) -> String {
        if self.shift == 0 {
            format!("SMA({})", self.window)
        } else {
            format!("SMA({}, shift {})", self.window, self.shift)
        }
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
        let close = closes(rows);
        let sma = sma_series(&close, self.window, self.shift);

        Ok(SeriesBundle::new(self.warmup())
            .with_series("close", to_points(&dates, &close))
            .with_series("sma", to_points(&dates, &sma)))
    }
}

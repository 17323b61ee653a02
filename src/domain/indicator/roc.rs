//! ROC (Rate of Change) with two moving averages of the ROC line.
//!
//! roc[i] = (C[i] - C[i-n]) / C[i-n]
//! MA1[i] = SMA(roc, ma1)[i], MA2[i] = SMA(roc, ma2)[i]
//! If C[i-n] is zero or missing: roc absent.
//! Warmup: n + max(ma1, ma2) - 1 bars.

use crate::domain::error::BreadthscanError;
use crate::domain::indicator::{Computation, ComputeContext, ComputeError, IndicatorSettings};
use crate::domain::price::{closes, is_ordered, PricePoint};
use crate::domain::series::{to_points, SeriesBundle};
use crate::domain::series_math::{roc_series, sma_series};

pub const SERIES: &[&str] = &["roc", "MA1", "MA2"];

#[derive(Debug, Clone, PartialEq)]
pub struct RocIndicator {
    pub lookback: usize,
    pub ma1: usize,
    pub ma2: usize,
}

pub fn from_settings(
    settings: &IndicatorSettings,
) -> Result<Box<dyn Computation>, BreadthscanError> {
    Ok(Box::new(RocIndicator {
        lookback: settings.positive("lookback", 17)?,
        ma1: settings.positive("ma1", 10)?,
        ma2: settings.positive("ma2", 20)?,
    }))
}

impl Computation for RocIndicator {
    fn type_name(&self) -> &'static str {
        "roc"
    }

    fn series_names(&self) -> &'static [&'static str] {
        SERIES
    }

    fn warmup(&self) -> usize {
        self.lookback + self.ma1.max(self.ma2) - 1
    }

    fn label(&self) -> String {
        format!("ROC({}; MA {}/{})", self.lookback, self.ma1, self.ma2)
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
        let roc = roc_series(&closes(rows), self.lookback, 0);
        let ma1 = sma_series(&roc, self.ma1, 0);
        let ma2 = sma_series(&roc, self.ma2, 0);

        Ok(SeriesBundle::new(self.warmup())
            .with_series("roc", to_points(&dates, &roc))
            .with_series("MA1", to_points(&dates, &ma1))
            .with_series("MA2", to_points(&dates, &ma2)))
    }
}

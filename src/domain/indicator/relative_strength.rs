//! Relative strength against a benchmark supplied through the compute context.
//!
//! ratio[i] = C[i] / B[i] on dates both carry a close
//! roc[i]   = ROC(ratio, n)[i]

use crate::domain::error::BreadthscanError;
use crate::domain::indicator::{Computation, ComputeContext, ComputeError, IndicatorSettings};
use crate::domain::price::{is_ordered, PricePoint};
use crate::domain::series::{to_points, SeriesBundle};
use crate::domain::series_math::roc_series;
use std::collections::HashMap;

pub const SERIES: &[&str] = &["ratio", "roc"];

#[derive(Debug, Clone, PartialEq)]
pub struct RelativeStrength {
    pub lookback: usize,
}

pub fn from_settings(
    settings: &IndicatorSettings,
) -> Result<Box<dyn Computation>, BreadthscanError> {
    Ok(Box::new(RelativeStrength {
        lookback: settings.positive("lookback", 17)?,
    }))
}

impl Computation for RelativeStrength {
    fn type_name(&self) -> &'static str {
        "relative_strength"
    }

    fn series_names(&self) -> &'static [&'static str] {
        SERIES
    }

    fn warmup(&self) -> usize {
        self.lookback
    }

    fn label(&self) -> String {
        format!("RS({})", self.lookback)
    }

    fn compute_series(
        &self,
        rows: &[PricePoint],
        ctx: &ComputeContext<'_>,
    ) -> Result<SeriesBundle, ComputeError> {
        let benchmark = ctx.benchmark.ok_or(ComputeError::MissingBenchmark)?;
        if !is_ordered(rows) {
            return Err(ComputeError::Unordered);
        }
        let bench_close: HashMap<_, _> = benchmark
            .iter()
            .filter_map(|row| row.valid_close().map(|c| (row.date, c)))
            .collect();

        let dates: Vec<_> = rows.iter().map(|r| r.date).collect();
        let ratio: Vec<Option<f64>> = rows
            .iter()
            .map(|row| {
                let close = row.valid_close()?;
                let bench = *bench_close.get(&row.date)?;
                (bench != 0.0).then(|| close / bench)
            })
            .collect();
        let roc = roc_series(&ratio, self.lookback, 0);

        Ok(SeriesBundle::new(self.warmup())
            .with_series("ratio", to_points(&dates, &ratio))
            .with_series("roc", to_points(&dates, &roc)))
    }
}

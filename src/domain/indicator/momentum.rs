//! Composite momentum score: weighted average of ROC over several lookbacks.
//!
//! score[i] = Σ w_k · roc(n_k)[i] / Σ w_k
//! Absent whenever any component ROC is absent.

use crate::domain::error::BreadthscanError;
use crate::domain::indicator::{Computation, ComputeContext, ComputeError, IndicatorSettings};
use crate::domain::price::{closes, is_ordered, PricePoint};
use crate::domain::series::{to_points, SeriesBundle};
use crate::domain::series_math::roc_series;

pub const SERIES: &[&str] = &["score"];

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumScore {
    pub lookbacks: Vec<usize>,
    pub weights: Vec<f64>,
}

pub fn from_settings(
    settings: &IndicatorSettings,
) -> Result<Box<dyn Computation>, BreadthscanError> {
    let lookbacks = settings.positive_list("lookbacks", &[21, 63, 126])?;
    if lookbacks.is_empty() {
        return Err(settings.invalid("lookbacks", "at least one lookback required"));
    }
    let weights = match settings.number_list("weights")? {
        Some(w) => w,
        None => vec![1.0; lookbacks.len()],
    };
    if weights.len() != lookbacks.len() {
        return Err(settings.invalid(
            "weights",
            format!(
                "{} weights given for {} lookbacks",
                weights.len(),
                lookbacks.len()
            ),
        ));
    }
    if weights.iter().any(|w| *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
        return Err(settings.invalid("weights", "weights must be non-negative with a positive sum"));
    }
    Ok(Box::new(MomentumScore { lookbacks, weights }))
}

impl Computation for MomentumScore {
    fn type_name(&self) -> &'static str {
        "momentum"
    }

    fn series_names(&self) -> &'static [&'static str] {
        SERIES
    }

    fn warmup(&self) -> usize {
        self.lookbacks.iter().copied().max().unwrap_or(0)
    }

    fn label(&self) -> String {
        let parts: Vec<String> = self
            .lookbacks
            .iter()
            .zip(&self.weights)
            .map(|(n, w)| format!("{}x{}", n, w))
            .collect();
        format!("MOMENTUM({})", parts.join(","))
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
        let components: Vec<Vec<Option<f64>>> = self
            .lookbacks
            .iter()
            .map(|&n| roc_series(&close, n, 0))
            .collect();
        let total_weight: f64 = self.weights.iter().sum();

        let score: Vec<Option<f64>> = (0..rows.len())
            .map(|i| {
                let mut acc = 0.0;
                for (component, weight) in components.iter().zip(&self.weights) {
                    acc += component[i]? * weight;
                }
                Some(acc / total_weight)
            })
            .collect();

        Ok(SeriesBundle::new(self.warmup()).with_series("score", to_points(&dates, &score)))
    }
}

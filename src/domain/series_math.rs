//! Pure numeric primitives shared by indicators, rules and breadth.
//!
//! Missing data never raises: every primitive returns `None` when the
//! required closes are unavailable or a denominator is zero.
//!
//! sma(n, s)[t] = mean(C[t-s-n+1 ..= t-s])
//! roc(n, s)[t] = (C[t-s] - C[t-s-n]) / C[t-s-n]

use crate::domain::series::SeriesPoint;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Simple moving average of the `window` values ending `shift` bars before
/// the last element of `values`.
pub fn sma(values: &[Option<f64>], window: usize, shift: usize) -> Option<f64> {
    if window == 0 || values.len() < window + shift {
        return None;
    }
    let end = values.len() - shift;
    let mut sum = 0.0;
    for value in &values[end - window..end] {
        sum += value.filter(|v| v.is_finite())?;
    }
    Some(sum / window as f64)
}

/// Rate of change over `lookback` bars, ending `shift` bars before the last
/// element of `values`. Expressed as a fraction.
pub fn roc(values: &[Option<f64>], lookback: usize, shift: usize) -> Option<f64> {
    if lookback == 0 || values.len() < lookback + shift + 1 {
        return None;
    }
    let t = values.len() - 1 - shift;
    let current = values[t].filter(|v| v.is_finite())?;
    let base = values[t - lookback].filter(|v| v.is_finite())?;
    if base == 0.0 {
        return None;
    }
    Some((current - base) / base)
}

/// `sma` evaluated at every position of `values`.
pub fn sma_series(values: &[Option<f64>], window: usize, shift: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| sma(&values[..=i], window, shift))
        .collect()
}

/// `roc` evaluated at every position of `values`.
pub fn roc_series(values: &[Option<f64>], lookback: usize, shift: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| roc(&values[..=i], lookback, shift))
        .collect()
}

/// Series values restricted to the dates on which every input is valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedFrame {
    pub dates: Vec<NaiveDate>,
    /// One column per input series, in input order.
    pub columns: Vec<Vec<f64>>,
}

impl AlignedFrame {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }
}

/// Intersect `inputs` on dates where every series carries a valid value.
///
/// Date order follows the first input, which must be ascending.
pub fn align(inputs: &[&[SeriesPoint]]) -> AlignedFrame {
    let Some((first, rest)) = inputs.split_first() else {
        return AlignedFrame::default();
    };

    let lookups: Vec<HashMap<NaiveDate, f64>> = rest
        .iter()
        .map(|points| {
            points
                .iter()
                .filter_map(|p| p.valid().map(|v| (p.date, v)))
                .collect()
        })
        .collect();

    let mut frame = AlignedFrame {
        dates: Vec::new(),
        columns: vec![Vec::new(); inputs.len()],
    };

    'dates: for point in first.iter() {
        let Some(head) = point.valid() else {
            continue;
        };
        let mut row = Vec::with_capacity(inputs.len());
        row.push(head);
        for lookup in &lookups {
            match lookup.get(&point.date) {
                Some(&v) => row.push(v),
                None => continue 'dates,
            }
        }
        frame.dates.push(point.date);
        for (column, value) in frame.columns.iter_mut().zip(row) {
            column.push(value);
        }
    }

    frame
}

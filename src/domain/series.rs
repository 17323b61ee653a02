//! Named, dated series produced by indicators.
//!
//! - `SeriesPoint`: one dated value, absent while history is insufficient
//! - `SeriesBundle`: every series one indicator instance emits for one ticker
//! - `SeriesRef`: the `instance_id.series_name` address rules read through

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self { date, value }
    }

    /// Value if present and finite.
    pub fn valid(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SeriesRef {
    pub instance_id: String,
    pub series_name: String,
}

impl SeriesRef {
    pub fn new(instance_id: impl Into<String>, series_name: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            series_name: series_name.into(),
        }
    }
}

impl fmt::Display for SeriesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.instance_id, self.series_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesBundle {
    series: BTreeMap<String, Vec<SeriesPoint>>,
    /// Bars consumed before the first guaranteed value.
    pub warmup: usize,
}

impl SeriesBundle {
    pub fn new(warmup: usize) -> Self {
        Self {
            series: BTreeMap::new(),
            warmup,
        }
    }

    pub fn with_series(mut self, name: &str, points: Vec<SeriesPoint>) -> Self {
        self.series.insert(name.to_string(), points);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[SeriesPoint]> {
        self.series.get(name).map(|points| points.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Zip `dates` with `values` into series points.
pub fn to_points(dates: &[NaiveDate], values: &[Option<f64>]) -> Vec<SeriesPoint> {
    dates
        .iter()
        .zip(values)
        .map(|(&date, &value)| SeriesPoint::new(date, value.filter(|v| v.is_finite())))
        .collect()
}

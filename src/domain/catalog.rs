//! Per-ticker series catalog and unified timeline.
//!
//! The catalog maps `instance_id` to the bundle that instance produced for
//! one ticker. Rules only ever reach series through [`SeriesCatalog::lookup`].

use crate::domain::indicator::{ComputeContext, ComputeError, IndicatorInstance};
use crate::domain::issue::Issue;
use crate::domain::price::PricePoint;
use crate::domain::series::{SeriesBundle, SeriesPoint, SeriesRef};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogMiss {
    #[error("no series for instance '{0}'")]
    UnknownInstance(String),

    #[error("instance '{}' has no series '{}'", .0.instance_id, .0.series_name)]
    UnknownSeries(SeriesRef),
}

#[derive(Debug, Clone, Default)]
pub struct SeriesCatalog {
    pub ticker: String,
    entries: BTreeMap<String, SeriesBundle>,
}

impl SeriesCatalog {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, instance_id: impl Into<String>, bundle: SeriesBundle) {
        self.entries.insert(instance_id.into(), bundle);
    }

    pub fn contains_instance(&self, instance_id: &str) -> bool {
        self.entries.contains_key(instance_id)
    }

    pub fn lookup(&self, series_ref: &SeriesRef) -> Result<&[SeriesPoint], CatalogMiss> {
        let bundle = self
            .entries
            .get(&series_ref.instance_id)
            .ok_or_else(|| CatalogMiss::UnknownInstance(series_ref.instance_id.clone()))?;
        bundle
            .get(&series_ref.series_name)
            .ok_or_else(|| CatalogMiss::UnknownSeries(series_ref.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run every instance over `rows`, keeping the bundles that succeed and
/// honour their declared series. Failures become computation issues.
pub fn build_catalog(
    ticker: &str,
    rows: &[PricePoint],
    instances: &[IndicatorInstance],
    ctx: &ComputeContext<'_>,
) -> (SeriesCatalog, Vec<Issue>) {
    let mut catalog = SeriesCatalog::new(ticker);
    let mut issues = Vec::new();

    for instance in instances {
        let result = instance.unit.compute_series(rows, ctx).and_then(|bundle| {
            match instance
                .unit
                .series_names()
                .iter()
                .find(|name| !bundle.contains(name))
            {
                Some(missing) => Err(ComputeError::MissingSeries(missing.to_string())),
                None => Ok(bundle),
            }
        });

        match result {
            Ok(bundle) => {
                debug!(
                    ticker,
                    instance = %instance.instance_id,
                    series = bundle.len(),
                    "computed indicator"
                );
                catalog.insert(instance.instance_id.clone(), bundle);
            }
            Err(e) => issues.push(Issue::computation(
                ticker,
                &instance.instance_id,
                format!("{} failed: {}", instance.unit.label(), e),
            )),
        }
    }

    (catalog, issues)
}

/// Every distinct date across the supplied row sets, ascending.
pub fn build_unified_timeline<'a, I>(row_sets: I) -> Vec<NaiveDate>
where
    I: IntoIterator<Item = &'a [PricePoint]>,
{
    let unique_dates: BTreeSet<NaiveDate> = row_sets
        .into_iter()
        .flat_map(|rows| rows.iter().map(|row| row.date))
        .collect();
    unique_dates.into_iter().collect()
}

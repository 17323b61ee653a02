//! Indicator (computation unit) contract and registration table.
//!
//! An indicator turns one ticker's price rows into a [`SeriesBundle`] of named
//! series. The names an indicator declares through
//! [`Computation::series_names`] are its public contract: rules address them
//! as `instance_id.series_name`, so renaming one breaks configurations.
//!
//! Indicator types are looked up in a [`Registry`] built once at startup and
//! passed by reference. Each configured instance gets a stable id, either the
//! explicit `id` setting or `{type}_{index}` from its position in the config.

pub mod momentum;
pub mod price_fields;
pub mod relative_strength;
pub mod roc;
pub mod sma;

use crate::domain::error::BreadthscanError;
use crate::domain::issue::Issue;
use crate::domain::price::PricePoint;
use crate::domain::series::SeriesBundle;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Explicit context for computations that look beyond the ticker's own rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeContext<'a> {
    pub benchmark: Option<&'a [PricePoint]>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputeError {
    #[error("benchmark series required but not supplied")]
    MissingBenchmark,

    #[error("price rows are not in ascending date order")]
    Unordered,

    #[error("declared series '{0}' missing from output")]
    MissingSeries(String),

    #[error("{0}")]
    Failed(String),
}

pub trait Computation: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Series this computation always emits.
    fn series_names(&self) -> &'static [&'static str];

    /// Bars needed before every declared series carries values.
    fn warmup(&self) -> usize;

    /// Short human-readable form, e.g. `ROC(17; MA 10/20)`.
    fn label(&self) -> String;

    /// Pure: identical rows and context always yield an identical bundle.
    fn compute_series(
        &self,
        rows: &[PricePoint],
        ctx: &ComputeContext<'_>,
    ) -> Result<SeriesBundle, ComputeError>;
}

/// Raw key/value settings from one indicator config section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSettings {
    pub section: String,
    values: BTreeMap<String, String>,
}

impl IndicatorSettings {
    pub fn new(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Positive integer setting, `default` when absent.
    pub fn positive(&self, key: &str, default: usize) -> Result<usize, BreadthscanError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.parse::<usize>() {
                Ok(v) if v >= 1 => Ok(v),
                _ => Err(self.invalid(key, format!("expected a positive integer, got '{raw}'"))),
            },
        }
    }

    /// Non-negative integer setting, `default` when absent.
    pub fn non_negative(&self, key: &str, default: usize) -> Result<usize, BreadthscanError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| self.invalid(key, format!("expected an integer, got '{raw}'"))),
        }
    }

    pub fn positive_list(
        &self,
        key: &str,
        default: &[usize],
    ) -> Result<Vec<usize>, BreadthscanError> {
        let Some(raw) = self.get(key) else {
            return Ok(default.to_vec());
        };
        raw.split(',')
            .map(|token| match token.trim().parse::<usize>() {
                Ok(v) if v >= 1 => Ok(v),
                _ => Err(self.invalid(key, format!("invalid list entry '{}'", token.trim()))),
            })
            .collect()
    }

    pub fn number_list(&self, key: &str) -> Result<Option<Vec<f64>>, BreadthscanError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.split(',')
            .map(|token| {
                token
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        self.invalid(key, format!("invalid number '{}'", token.trim()))
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    pub fn invalid(&self, key: &str, reason: impl Into<String>) -> BreadthscanError {
        BreadthscanError::config_invalid(&self.section, key, reason)
    }
}

pub type Factory = fn(&IndicatorSettings) -> Result<Box<dyn Computation>, BreadthscanError>;

/// Immutable table of indicator types, keyed by the config `type` value.
#[derive(Clone)]
pub struct Registry {
    factories: BTreeMap<&'static str, Factory>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::empty()
            .register("price", price_fields::from_settings)
            .register("sma", sma::from_settings)
            .register("roc", roc::from_settings)
            .register("momentum", momentum::from_settings)
            .register("relative_strength", relative_strength::from_settings)
    }

    pub fn register(mut self, type_name: &'static str, factory: Factory) -> Self {
        self.factories.insert(type_name, factory);
        self
    }

    pub fn create(
        &self,
        type_name: &str,
        settings: &IndicatorSettings,
    ) -> Result<Box<dyn Computation>, BreadthscanError> {
        let factory =
            self.factories
                .get(type_name)
                .ok_or_else(|| BreadthscanError::UnknownIndicator {
                    type_name: type_name.to_string(),
                })?;
        factory(settings)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

/// One indicator section as read from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub type_name: String,
    pub instance_id: Option<String>,
    pub settings: IndicatorSettings,
}

#[derive(Debug)]
pub struct IndicatorInstance {
    pub instance_id: String,
    pub unit: Box<dyn Computation>,
}

pub fn derive_instance_id(type_name: &str, index: usize) -> String {
    format!("{}_{}", type_name, index)
}

/// Build every configured instance. Unknown types, bad settings and
/// duplicate ids become configuration issues; the offending entry is skipped.
pub fn build_instances(
    registry: &Registry,
    configs: &[IndicatorConfig],
) -> (Vec<IndicatorInstance>, Vec<Issue>) {
    let mut instances = Vec::with_capacity(configs.len());
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for (index, config) in configs.iter().enumerate() {
        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| derive_instance_id(&config.type_name, index));

        if config.type_name.is_empty() {
            issues.push(
                Issue::configuration(format!(
                    "missing 'type' in [{}]",
                    config.settings.section
                ))
                .with_instance(&instance_id),
            );
            continue;
        }

        if !seen.insert(instance_id.clone()) {
            issues.push(
                Issue::configuration(format!(
                    "duplicate indicator id in [{}]",
                    config.settings.section
                ))
                .with_instance(&instance_id),
            );
            continue;
        }

        match registry.create(&config.type_name, &config.settings) {
            Ok(unit) => instances.push(IndicatorInstance { instance_id, unit }),
            Err(e) => issues.push(Issue::configuration(e.to_string()).with_instance(&instance_id)),
        }
    }

    (instances, issues)
}

/// Declared series names per instance id.
pub fn declared_series(instances: &[IndicatorInstance]) -> BTreeMap<String, Vec<&'static str>> {
    instances
        .iter()
        .map(|inst| (inst.instance_id.clone(), inst.unit.series_names().to_vec()))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::price::PricePoint;
    use chrono::NaiveDate;

    pub fn make_rows(closes: &[f64]) -> Vec<PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64);
                PricePoint::from_close(date, Some(close))
            })
            .collect()
    }
}

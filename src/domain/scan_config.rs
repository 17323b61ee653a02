//! Scan definition read from configuration.
//!
//! Problems that leave no run to define (tickers, date window, aggregate
//! lists) are fatal and surface as [`BreadthscanError`]. Individual
//! indicators and rules are resolved in [`build_plan`], where a bad entry
//! becomes an [`Issue`] and is skipped.

use crate::domain::breadth::{BreadthSettings, MaWindow, RocCompare};
use crate::domain::config_validation::validate_scan_config;
use crate::domain::error::BreadthscanError;
use crate::domain::indicator::{
    build_instances, declared_series, IndicatorConfig, IndicatorInstance, IndicatorSettings,
    Registry,
};
use crate::domain::issue::Issue;
use crate::domain::rule::NamedRule;
use crate::domain::rule_parser;
use crate::domain::universe::{parse_tickers, Universe};
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, Utc};
use tracing::warn;

pub const SCAN_SECTION: &str = "scan";
pub const RULES_SECTION: &str = "rules";
pub const AGGREGATES_SECTION: &str = "aggregates";
pub const INDICATOR_PREFIX: &str = "indicator.";
pub const DEFAULT_INTERVAL: &str = "1d";

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub universe: Universe,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub interval: String,
    pub benchmark: Option<String>,
    pub signals_since: Option<NaiveDate>,
    pub indicators: Vec<IndicatorConfig>,
    /// `(name, expression)` pairs in file order.
    pub rules: Vec<(String, String)>,
    pub breadth: BreadthSettings,
}

impl ScanConfig {
    /// Replace the configured universe, e.g. from a command-line override.
    pub fn with_tickers(mut self, tickers: &str) -> Result<Self, BreadthscanError> {
        let parsed = parse_tickers(tickers)
            .map_err(|e| BreadthscanError::config_invalid(SCAN_SECTION, "tickers", e.to_string()))?;
        self.universe = Universe::new(parsed)
            .map_err(|e| BreadthscanError::config_invalid(SCAN_SECTION, "tickers", e.to_string()))?;
        Ok(self)
    }
}

pub fn parse_date(section: &str, key: &str, raw: &str) -> Result<NaiveDate, BreadthscanError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        BreadthscanError::config_invalid(
            section,
            key,
            format!("invalid {} format, expected YYYY-MM-DD", key),
        )
    })
}

fn parse_count(key: &str, token: &str) -> Result<usize, BreadthscanError> {
    match token.trim().parse::<usize>() {
        Ok(v) if v >= 1 => Ok(v),
        _ => Err(BreadthscanError::config_invalid(
            AGGREGATES_SECTION,
            key,
            format!("expected a positive integer, got '{}'", token.trim()),
        )),
    }
}

fn parse_shift(key: &str, token: &str) -> Result<usize, BreadthscanError> {
    token.trim().parse::<usize>().map_err(|_| {
        BreadthscanError::config_invalid(
            AGGREGATES_SECTION,
            key,
            format!("expected a non-negative shift, got '{}'", token.trim()),
        )
    })
}

fn tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Drop repeats, keeping first-seen order. Each entry yields distinct metric keys.
fn dedup_first_seen<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}

/// `1, 5, 20` lookbacks for advance/decline.
pub fn parse_ad_lookbacks(raw: &str) -> Result<Vec<usize>, BreadthscanError> {
    tokens(raw)
        .map(|t| parse_count("ad_lookbacks", t))
        .collect::<Result<Vec<_>, _>>()
        .map(dedup_first_seen)
}

/// `13, 50:5`: window with an optional shift.
pub fn parse_ma_windows(raw: &str) -> Result<Vec<MaWindow>, BreadthscanError> {
    tokens(raw)
        .map(|t| {
            let (window, shift) = match t.split_once(':') {
                Some((w, s)) => (parse_count("ma_windows", w)?, parse_shift("ma_windows", s)?),
                None => (parse_count("ma_windows", t)?, 0),
            };
            Ok(MaWindow { window, shift })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(dedup_first_seen)
}

/// `17:5`: lookback and the shift of the prior ROC compared against.
pub fn parse_roc_compare(raw: &str) -> Result<Vec<RocCompare>, BreadthscanError> {
    tokens(raw)
        .map(|t| {
            let (lookback, shift) = t.split_once(':').ok_or_else(|| {
                BreadthscanError::config_invalid(
                    AGGREGATES_SECTION,
                    "roc_compare",
                    format!("expected lookback:shift, got '{}'", t),
                )
            })?;
            let compare = RocCompare {
                lookback: parse_count("roc_compare", lookback)?,
                shift: parse_count("roc_compare", shift)?,
            };
            Ok(compare)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(dedup_first_seen)
}

pub fn load_breadth_settings(config: &dyn ConfigPort) -> Result<BreadthSettings, BreadthscanError> {
    let mut settings = BreadthSettings::default();
    if let Some(raw) = config.get_string(AGGREGATES_SECTION, "ad_lookbacks") {
        settings.ad_lookbacks = parse_ad_lookbacks(&raw)?;
    }
    if let Some(raw) = config.get_string(AGGREGATES_SECTION, "ma_windows") {
        settings.ma_windows = parse_ma_windows(&raw)?;
    }
    if let Some(raw) = config.get_string(AGGREGATES_SECTION, "roc_compare") {
        settings.roc_compare = parse_roc_compare(&raw)?;
    }
    if let Some(raw) = config.get_string(AGGREGATES_SECTION, "history_dates") {
        settings.history_dates = parse_count("history_dates", &raw)?;
    }
    Ok(settings)
}

/// Indicator sections in file order.
pub fn load_indicator_configs(config: &dyn ConfigPort) -> Vec<IndicatorConfig> {
    config
        .sections()
        .into_iter()
        .filter(|section| section.starts_with(INDICATOR_PREFIX))
        .map(|section| {
            let mut type_name = String::new();
            let mut instance_id = None;
            let mut settings = IndicatorSettings::new(section.clone());
            for (key, value) in config.section_entries(&section) {
                match key.as_str() {
                    "type" => type_name = value.trim().to_lowercase(),
                    "id" => instance_id = Some(value.trim().to_string()).filter(|v| !v.is_empty()),
                    _ => settings = settings.with(&key, &value),
                }
            }
            IndicatorConfig {
                type_name,
                instance_id,
                settings,
            }
        })
        .collect()
}

pub fn load_scan_config(config: &dyn ConfigPort) -> Result<ScanConfig, BreadthscanError> {
    validate_scan_config(config)?;

    let raw_tickers = config
        .get_string(SCAN_SECTION, "tickers")
        .unwrap_or_default();
    let tickers = parse_tickers(&raw_tickers)
        .map_err(|e| BreadthscanError::config_invalid(SCAN_SECTION, "tickers", e.to_string()))?;
    let universe = Universe::new(tickers)
        .map_err(|e| BreadthscanError::config_invalid(SCAN_SECTION, "tickers", e.to_string()))?;

    let start_date = match config.get_string(SCAN_SECTION, "start_date") {
        Some(raw) => parse_date(SCAN_SECTION, "start_date", &raw)?,
        None => {
            return Err(BreadthscanError::ConfigMissing {
                section: SCAN_SECTION.into(),
                key: "start_date".into(),
            });
        }
    };
    let end_date = match config.get_string(SCAN_SECTION, "end_date") {
        Some(raw) => parse_date(SCAN_SECTION, "end_date", &raw)?,
        None => Utc::now().date_naive(),
    };
    let signals_since = config
        .get_string(SCAN_SECTION, "signals_since")
        .map(|raw| parse_date(SCAN_SECTION, "signals_since", &raw))
        .transpose()?;

    let interval = config
        .get_string(SCAN_SECTION, "interval")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_INTERVAL.to_string());
    let benchmark = config
        .get_string(SCAN_SECTION, "benchmark")
        .map(|v| v.trim().to_uppercase())
        .filter(|v| !v.is_empty());

    Ok(ScanConfig {
        universe,
        start_date,
        end_date,
        interval,
        benchmark,
        signals_since,
        indicators: load_indicator_configs(config),
        rules: config.section_entries(RULES_SECTION),
        breadth: load_breadth_settings(config)?,
    })
}

/// Resolved indicators and rules for one run.
#[derive(Debug)]
pub struct ScanPlan {
    pub instances: Vec<IndicatorInstance>,
    pub rules: Vec<NamedRule>,
    pub issues: Vec<Issue>,
}

/// Parse rules and check their references against the built instances.
pub fn parse_rules(
    entries: &[(String, String)],
    instances: &[IndicatorInstance],
) -> (Vec<NamedRule>, Vec<Issue>) {
    let declared = declared_series(instances);
    let mut rules = Vec::new();
    let mut issues = Vec::new();

    for (name, text) in entries {
        let checked = rule_parser::parse(text)
            .map_err(|e| e.display_with_context(text))
            .and_then(|spec| {
                spec.validate_refs(&declared)
                    .map(|()| spec)
                    .map_err(|e| e.to_string())
            });
        match checked {
            Ok(spec) => rules.push(NamedRule {
                name: name.clone(),
                spec,
            }),
            Err(message) => {
                warn!(rule = %name, "skipping rule: {}", message);
                issues.push(Issue::configuration(message).with_rule(name));
            }
        }
    }

    (rules, issues)
}

pub fn build_plan(config: &ScanConfig, registry: &Registry) -> ScanPlan {
    let (instances, mut issues) = build_instances(registry, &config.indicators);
    for issue in &issues {
        warn!("{}", issue);
    }
    let (rules, rule_issues) = parse_rules(&config.rules, &instances);
    issues.extend(rule_issues);
    ScanPlan {
        instances,
        rules,
        issues,
    }
}

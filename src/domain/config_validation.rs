//! Fatal configuration checks.
//!
//! Only problems that leave no run to define fail here. Per-indicator and
//! per-rule problems are reported later as issues.

use crate::domain::error::BreadthscanError;
use crate::domain::scan_config::{
    parse_ad_lookbacks, parse_date, parse_ma_windows, parse_roc_compare, AGGREGATES_SECTION,
    SCAN_SECTION,
};
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, Utc};

pub fn validate_scan_config(config: &dyn ConfigPort) -> Result<(), BreadthscanError> {
    validate_tickers(config)?;
    validate_dates(config)?;
    validate_pool_size(config)?;
    validate_aggregates(config)?;
    Ok(())
}

fn validate_tickers(config: &dyn ConfigPort) -> Result<(), BreadthscanError> {
    match config.get_string(SCAN_SECTION, "tickers") {
        Some(s) if s.split(',').any(|t| !t.trim().is_empty()) => Ok(()),
        _ => Err(BreadthscanError::ConfigMissing {
            section: SCAN_SECTION.to_string(),
            key: "tickers".to_string(),
        }),
    }
}

fn required_date(config: &dyn ConfigPort, key: &str) -> Result<NaiveDate, BreadthscanError> {
    match config.get_string(SCAN_SECTION, key) {
        None => Err(BreadthscanError::ConfigMissing {
            section: SCAN_SECTION.to_string(),
            key: key.to_string(),
        }),
        Some(s) => parse_date(SCAN_SECTION, key, &s),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), BreadthscanError> {
    let start_date = required_date(config, "start_date")?;

    // end_date defaults to today
    let end_date = match config.get_string(SCAN_SECTION, "end_date") {
        Some(_) => required_date(config, "end_date")?,
        None => Utc::now().date_naive(),
    };
    if start_date >= end_date {
        return Err(BreadthscanError::config_invalid(
            SCAN_SECTION,
            "start_date",
            format!("start_date must be before end_date ({})", end_date),
        ));
    }

    if let Some(s) = config.get_string(SCAN_SECTION, "signals_since") {
        parse_date(SCAN_SECTION, "signals_since", &s)?;
    }
    Ok(())
}

fn validate_pool_size(config: &dyn ConfigPort) -> Result<(), BreadthscanError> {
    if config.get_string("sqlite", "pool_size").is_none() {
        return Ok(());
    }
    let value = config.get_int("sqlite", "pool_size", 0);
    if value < 1 {
        return Err(BreadthscanError::config_invalid(
            "sqlite",
            "pool_size",
            "pool_size must be at least 1",
        ));
    }
    Ok(())
}

fn validate_aggregates(config: &dyn ConfigPort) -> Result<(), BreadthscanError> {
    if let Some(raw) = config.get_string(AGGREGATES_SECTION, "ad_lookbacks") {
        parse_ad_lookbacks(&raw)?;
    }
    if let Some(raw) = config.get_string(AGGREGATES_SECTION, "ma_windows") {
        parse_ma_windows(&raw)?;
    }
    if let Some(raw) = config.get_string(AGGREGATES_SECTION, "roc_compare") {
        parse_roc_compare(&raw)?;
    }
    if config.get_string(AGGREGATES_SECTION, "history_dates").is_some()
        && config.get_int(AGGREGATES_SECTION, "history_dates", 0) < 1
    {
        return Err(BreadthscanError::config_invalid(
            AGGREGATES_SECTION,
            "history_dates",
            "history_dates must be at least 1",
        ));
    }
    Ok(())
}

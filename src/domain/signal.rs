//! Dated signal events emitted by configured rules.

use crate::domain::catalog::SeriesCatalog;
use crate::domain::rule::NamedRule;
use crate::domain::rule_eval::evaluate;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub ticker: String,
    pub rule: String,
    /// Instance of the first series the rule references.
    pub instance_id: String,
    pub signal_date: NaiveDate,
    pub signal_type: String,
    pub metadata: Map<String, Value>,
}

/// Evaluate every rule for one ticker, ordered by date then rule order.
///
/// A rule whose series are missing from the catalog (its instance failed
/// for this ticker) contributes nothing. Signals dated before `since` are
/// dropped after evaluation.
pub fn evaluate_rules(
    catalog: &SeriesCatalog,
    rules: &[NamedRule],
    since: Option<NaiveDate>,
) -> Vec<Signal> {
    let mut signals = Vec::new();

    for rule in rules {
        let hits = match evaluate(&rule.spec, catalog) {
            Ok(hits) => hits,
            Err(miss) => {
                debug!(ticker = %catalog.ticker, rule = %rule.name, "rule skipped: {}", miss);
                continue;
            }
        };
        let instance_id = rule.spec.primary_instance().unwrap_or_default();

        for (date, hit) in hits {
            if since.is_some_and(|since| date < since) {
                continue;
            }
            signals.push(Signal {
                ticker: catalog.ticker.clone(),
                rule: rule.name.clone(),
                instance_id: instance_id.to_string(),
                signal_date: date,
                signal_type: hit.signal_type,
                metadata: hit.metadata,
            });
        }
    }

    signals.sort_by_key(|signal| signal.signal_date);
    signals
}

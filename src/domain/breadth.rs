//! Cross-sectional breadth statistics for one evaluation date.
//!
//! Every metric carries its own `valid_count` / `missing_count`. A ticker
//! lacking the history a metric needs is missing for that metric and never
//! enters its numerator or denominator.

use crate::domain::cache::{DerivedMetric, MetricResolver};
use crate::domain::summary::TickerSummary;
use chrono::NaiveDate;
use serde::Serialize;

/// Absolute tolerance for "unchanged" and "equal" comparisons.
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaWindow {
    pub window: usize,
    pub shift: usize,
}

impl MaWindow {
    pub fn prefix(&self) -> String {
        if self.shift == 0 {
            format!("ma{}", self.window)
        } else {
            format!("ma{}s{}", self.window, self.shift)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RocCompare {
    pub lookback: usize,
    pub shift: usize,
}

impl RocCompare {
    pub fn prefix(&self) -> String {
        format!("roc{}s{}", self.lookback, self.shift)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreadthSettings {
    pub ad_lookbacks: Vec<usize>,
    pub ma_windows: Vec<MaWindow>,
    pub roc_compare: Vec<RocCompare>,
    /// Most recent timeline dates to evaluate.
    pub history_dates: usize,
}

impl Default for BreadthSettings {
    fn default() -> Self {
        Self {
            ad_lookbacks: vec![1],
            ma_windows: Vec::new(),
            roc_compare: Vec::new(),
            history_dates: 1,
        }
    }
}

const AD_SUFFIXES: &[&str] = &[
    "advances",
    "declines",
    "unchanged",
    "valid_ticker_count",
    "advance_pct",
    "decline_pct",
    "net_advances",
    "advance_decline_ratio",
];
const MA_SUFFIXES: &[&str] = &["above", "below", "equal", "above_pct", "below_pct"];
const ROC_SUFFIXES: &[&str] = &["gt", "lt", "eq", "gt_pct", "lt_pct"];

fn ad_prefix(lookback: usize) -> String {
    if lookback == 1 {
        String::new()
    } else {
        format!("ad{}_", lookback)
    }
}

impl BreadthSettings {
    /// Every metric key one evaluation date produces.
    pub fn metric_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for &n in &self.ad_lookbacks {
            let prefix = ad_prefix(n);
            keys.extend(AD_SUFFIXES.iter().map(|s| format!("{}{}", prefix, s)));
        }
        for ma in &self.ma_windows {
            let prefix = ma.prefix();
            keys.extend(MA_SUFFIXES.iter().map(|s| format!("{}_{}", prefix, s)));
        }
        for rc in &self.roc_compare {
            let prefix = rc.prefix();
            keys.extend(ROC_SUFFIXES.iter().map(|s| format!("{}_{}", prefix, s)));
        }
        keys
    }

    /// Bar offsets ticker summaries must expose.
    pub fn close_offsets(&self) -> Vec<usize> {
        let mut offsets = self.ad_lookbacks.clone();
        offsets.push(1);
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub metric_key: String,
    pub value: Option<f64>,
    pub valid_count: usize,
    pub missing_count: usize,
}

impl MetricValue {
    pub fn into_record(self, set_hash: &str, as_of_date: NaiveDate, interval: &str) -> AggregateRecord {
        AggregateRecord {
            set_hash: set_hash.to_string(),
            as_of_date,
            interval: interval.to_string(),
            metric_key: self.metric_key,
            value: self.value,
            valid_count: self.valid_count,
            missing_count: self.missing_count,
        }
    }
}

/// One stored point of an aggregate series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRecord {
    pub set_hash: String,
    pub as_of_date: NaiveDate,
    pub interval: String,
    pub metric_key: String,
    pub value: Option<f64>,
    pub valid_count: usize,
    pub missing_count: usize,
}

/// Counts of a three-way classification over the valid tickers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    above: usize,
    below: usize,
    equal: usize,
    missing: usize,
}

impl Tally {
    fn record(&mut self, pair: Option<(f64, f64)>) {
        match pair {
            None => self.missing += 1,
            Some((value, reference)) if (value - reference).abs() <= EPSILON => self.equal += 1,
            Some((value, reference)) if value > reference => self.above += 1,
            Some(_) => self.below += 1,
        }
    }

    fn valid(&self) -> usize {
        self.above + self.below + self.equal
    }

    fn pct(&self, count: usize) -> Option<f64> {
        let valid = self.valid();
        (valid > 0).then(|| count as f64 / valid as f64)
    }

    fn metric(&self, key: String, value: Option<f64>) -> MetricValue {
        MetricValue {
            metric_key: key,
            value,
            valid_count: self.valid(),
            missing_count: self.missing,
        }
    }

    fn count(&self, key: String, count: usize) -> MetricValue {
        self.metric(key, Some(count as f64))
    }
}

/// Advances, declines and unchanged comparing the last close with the close
/// `lookback` bars earlier.
pub fn advance_decline(summaries: &[TickerSummary], lookback: usize) -> Vec<MetricValue> {
    let mut tally = Tally::default();
    for summary in summaries {
        let pair = summary
            .close_at_offset(0)
            .zip(summary.close_at_offset(lookback));
        tally.record(pair);
    }

    let prefix = ad_prefix(lookback);
    let key = |suffix: &str| format!("{}{}", prefix, suffix);
    let ratio = (tally.below > 0).then(|| tally.above as f64 / tally.below as f64);

    vec![
        tally.count(key("advances"), tally.above),
        tally.count(key("declines"), tally.below),
        tally.count(key("unchanged"), tally.equal),
        tally.count(key("valid_ticker_count"), tally.valid()),
        tally.metric(key("advance_pct"), tally.pct(tally.above)),
        tally.metric(key("decline_pct"), tally.pct(tally.below)),
        tally.metric(
            key("net_advances"),
            Some(tally.above as f64 - tally.below as f64),
        ),
        tally.metric(key("advance_decline_ratio"), ratio),
    ]
}

/// Tickers whose last close is above, below or equal to their moving average.
pub fn ma_breadth(
    summaries: &[TickerSummary],
    ma: MaWindow,
    resolver: &mut MetricResolver,
) -> Vec<MetricValue> {
    let metric = DerivedMetric::Sma {
        window: ma.window,
        shift: ma.shift,
    };
    let mut tally = Tally::default();
    for summary in summaries {
        let average = resolver.resolve(summary, metric);
        tally.record(summary.last_close.zip(average));
    }

    let prefix = ma.prefix();
    let key = |suffix: &str| format!("{}_{}", prefix, suffix);
    vec![
        tally.count(key("above"), tally.above),
        tally.count(key("below"), tally.below),
        tally.count(key("equal"), tally.equal),
        tally.metric(key("above_pct"), tally.pct(tally.above)),
        tally.metric(key("below_pct"), tally.pct(tally.below)),
    ]
}

/// Tickers whose current ROC is greater than, less than or equal to the ROC
/// `shift` bars earlier.
pub fn roc_comparison(
    summaries: &[TickerSummary],
    compare: RocCompare,
    resolver: &mut MetricResolver,
) -> Vec<MetricValue> {
    let current = DerivedMetric::Roc {
        lookback: compare.lookback,
        shift: 0,
    };
    let prior = DerivedMetric::Roc {
        lookback: compare.lookback,
        shift: compare.shift,
    };
    let mut tally = Tally::default();
    for summary in summaries {
        let now = resolver.resolve(summary, current);
        let then = resolver.resolve(summary, prior);
        tally.record(now.zip(then));
    }

    let prefix = compare.prefix();
    let key = |suffix: &str| format!("{}_{}", prefix, suffix);
    vec![
        tally.count(key("gt"), tally.above),
        tally.count(key("lt"), tally.below),
        tally.count(key("eq"), tally.equal),
        tally.metric(key("gt_pct"), tally.pct(tally.above)),
        tally.metric(key("lt_pct"), tally.pct(tally.below)),
    ]
}

/// Every configured breadth metric over `summaries`, in `metric_keys` order.
pub fn compute_breadth(
    summaries: &[TickerSummary],
    settings: &BreadthSettings,
    resolver: &mut MetricResolver,
) -> Vec<MetricValue> {
    let mut values = Vec::new();
    for &n in &settings.ad_lookbacks {
        values.extend(advance_decline(summaries, n));
    }
    for &ma in &settings.ma_windows {
        values.extend(ma_breadth(summaries, ma, resolver));
    }
    for &rc in &settings.roc_compare {
        values.extend(roc_comparison(summaries, rc, resolver));
    }
    values
}

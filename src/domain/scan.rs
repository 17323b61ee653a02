//! Scan pipeline.
//!
//! Tickers are processed sequentially: fetch prices, compute every indicator
//! instance, evaluate rules, summarise. Breadth aggregates are then computed
//! over the most recent dates of the unified timeline, reusing dates whose
//! full metric set the store already holds. A failure for one ticker or a
//! store error is recorded as an issue and never aborts the run.

use crate::domain::breadth::{compute_breadth, AggregateRecord, BreadthSettings};
use crate::domain::cache::MetricResolver;
use crate::domain::catalog::{build_catalog, build_unified_timeline};
use crate::domain::indicator::ComputeContext;
use crate::domain::issue::Issue;
use crate::domain::price::{rows_through, PricePoint};
use crate::domain::scan_config::{ScanConfig, ScanPlan};
use crate::domain::signal::{evaluate_rules, Signal};
use crate::domain::summary::{build_summary, TickerSummary};
use crate::ports::data_port::DataPort;
use crate::ports::store_port::StorePort;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub set_hash: String,
    pub tickers: Vec<String>,
    pub interval: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub indicators: Vec<String>,
    pub rules: Vec<String>,
    pub evaluation_dates: Vec<NaiveDate>,
    pub tickers_processed: usize,
    pub tickers_skipped: usize,
    pub store_enabled: bool,
    pub cache_hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub run_metadata: RunMetadata,
    pub ticker_summaries: Vec<TickerSummary>,
    pub signals: Vec<Signal>,
    pub aggregates: Vec<AggregateRecord>,
    pub issues: Vec<Issue>,
}

pub struct Scanner<'a> {
    data: &'a dyn DataPort,
    store: Option<&'a dyn StorePort>,
    seed_issues: Vec<Issue>,
}

struct Aggregation {
    records: Vec<AggregateRecord>,
    dates: Vec<NaiveDate>,
    cache_hits: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(data: &'a dyn DataPort, store: Option<&'a dyn StorePort>) -> Self {
        Self {
            data,
            store,
            seed_issues: Vec::new(),
        }
    }

    /// Issues raised before the scan started, such as a store that could
    /// not be opened. They lead the report's issue list.
    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.seed_issues = issues;
        self
    }

    pub fn run(&self, config: &ScanConfig, plan: &ScanPlan) -> ScanReport {
        let started_at = Utc::now();
        let tickers = &config.universe.tickers;
        let mut issues = self.seed_issues.clone();
        issues.extend(plan.issues.iter().cloned());

        info!(
            tickers = tickers.len(),
            indicators = plan.instances.len(),
            rules = plan.rules.len(),
            "starting scan"
        );

        let set_hash = self.resolve_set_hash(config, &mut issues);
        let benchmark = self.fetch_benchmark(config, &mut issues);
        let ctx = ComputeContext {
            benchmark: benchmark.as_deref(),
        };
        let offsets = config.breadth.close_offsets();

        let mut histories: Vec<(String, Vec<PricePoint>)> = Vec::new();
        let mut ticker_summaries = Vec::new();
        let mut signals = Vec::new();
        let mut skipped = 0;

        for ticker in tickers {
            let rows = match self.fetch_rows(config, ticker) {
                Ok(rows) => rows,
                Err(issue) => {
                    warn!(ticker = %ticker, "skipping ticker: {}", issue.message);
                    issues.push(issue);
                    skipped += 1;
                    continue;
                }
            };

            let (catalog, compute_issues) = build_catalog(ticker, &rows, &plan.instances, &ctx);
            for issue in &compute_issues {
                warn!("{}", issue);
            }
            issues.extend(compute_issues);

            let ticker_signals = evaluate_rules(&catalog, &plan.rules, config.signals_since);
            debug!(
                ticker = %ticker,
                bars = rows.len(),
                signals = ticker_signals.len(),
                "ticker evaluated"
            );
            signals.extend(ticker_signals);

            if let Some(summary) = build_summary(ticker, &rows, &offsets) {
                issues.extend(summary.issues.iter().cloned());
                ticker_summaries.push(summary);
            }
            histories.push((ticker.clone(), rows));
        }

        signals.sort_by_key(|s| s.signal_date);

        let aggregation = self.aggregate(config, &set_hash, &histories, &mut issues);

        info!(
            processed = histories.len(),
            skipped,
            signals = signals.len(),
            aggregates = aggregation.records.len(),
            issues = issues.len(),
            "scan complete"
        );

        ScanReport {
            run_metadata: RunMetadata {
                started_at,
                finished_at: Utc::now(),
                set_hash,
                tickers: tickers.clone(),
                interval: config.interval.clone(),
                start_date: config.start_date,
                end_date: config.end_date,
                indicators: plan
                    .instances
                    .iter()
                    .map(|i| format!("{} {}", i.instance_id, i.unit.label()))
                    .collect(),
                rules: plan.rules.iter().map(|r| r.name.clone()).collect(),
                evaluation_dates: aggregation.dates,
                tickers_processed: histories.len(),
                tickers_skipped: skipped,
                store_enabled: self.store.is_some(),
                cache_hits: aggregation.cache_hits,
            },
            ticker_summaries,
            signals,
            aggregates: aggregation.records,
            issues,
        }
    }

    fn resolve_set_hash(&self, config: &ScanConfig, issues: &mut Vec<Issue>) -> String {
        let Some(store) = self.store else {
            return config.universe.set_hash.clone();
        };
        match store.get_or_create_security_set(&config.universe.tickers) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("security set not stored: {}", e);
                issues.push(Issue::store(format!("security set not stored: {}", e)));
                config.universe.set_hash.clone()
            }
        }
    }

    fn fetch_benchmark(&self, config: &ScanConfig, issues: &mut Vec<Issue>) -> Option<Vec<PricePoint>> {
        let ticker = config.benchmark.as_deref()?;
        match self.fetch_rows(config, ticker) {
            Ok(rows) => Some(rows),
            Err(issue) => {
                warn!(benchmark = %ticker, "benchmark unavailable: {}", issue.message);
                issues.push(issue);
                None
            }
        }
    }

    fn fetch_rows(&self, config: &ScanConfig, ticker: &str) -> Result<Vec<PricePoint>, Issue> {
        let rows = self
            .data
            .fetch_prices(ticker, config.start_date, config.end_date)
            .map_err(|e| Issue::data(ticker, e.to_string()))?;
        if rows.is_empty() {
            return Err(Issue::data(
                ticker,
                format!(
                    "no price rows between {} and {}",
                    config.start_date, config.end_date
                ),
            ));
        }
        Ok(rows)
    }

    fn aggregate(
        &self,
        config: &ScanConfig,
        set_hash: &str,
        histories: &[(String, Vec<PricePoint>)],
        issues: &mut Vec<Issue>,
    ) -> Aggregation {
        let settings = &config.breadth;
        let timeline = build_unified_timeline(histories.iter().map(|(_, rows)| rows.as_slice()));
        let dates = evaluation_dates(&timeline, settings);
        let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
            return Aggregation {
                records: Vec::new(),
                dates,
                cache_hits: 0,
            };
        };

        let stored = self.load_stored(config, set_hash, first, last, issues);
        let mut resolver = MetricResolver::new(&config.interval);
        let mut records = Vec::new();
        let mut to_write = Vec::new();
        let expected: BTreeSet<String> = settings.metric_keys().into_iter().collect();
        let offsets = settings.close_offsets();
        let mut preloaded = false;

        for &date in &dates {
            let existing = stored.get(&date);
            if let Some(existing) = existing {
                if expected.iter().all(|key| existing.contains_key(key)) {
                    debug!(%date, "aggregates loaded from store");
                    records.extend(
                        existing
                            .values()
                            .filter(|r| expected.contains(&r.metric_key))
                            .cloned(),
                    );
                    continue;
                }
            }

            if !preloaded {
                self.preload_cache(config, histories, last, &mut resolver, issues);
                preloaded = true;
            }

            let summaries: Vec<TickerSummary> = histories
                .iter()
                .filter_map(|(ticker, rows)| build_summary(ticker, rows_through(rows, date), &offsets))
                .collect();

            for value in compute_breadth(&summaries, settings, &mut resolver) {
                let record = value.into_record(set_hash, date, &config.interval);
                if !existing.is_some_and(|e| e.contains_key(&record.metric_key)) {
                    to_write.push(record.clone());
                }
                records.push(record);
            }
        }

        if let Some(store) = self.store {
            let fresh = resolver.take_fresh();
            if let Err(e) = store.upsert_metric_values(&fresh) {
                warn!("metric cache not written: {}", e);
                issues.push(Issue::store(format!("metric cache not written: {}", e)));
            }
            if let Err(e) = store.upsert_aggregate_values(&to_write) {
                warn!("aggregates not written: {}", e);
                issues.push(Issue::store(format!("aggregates not written: {}", e)));
            }
            debug!(cached = fresh.len(), aggregates = to_write.len(), "store updated");
        }

        records.sort_by(|a, b| {
            a.as_of_date
                .cmp(&b.as_of_date)
                .then_with(|| a.metric_key.cmp(&b.metric_key))
        });

        Aggregation {
            records,
            dates,
            cache_hits: resolver.hits(),
        }
    }

    fn load_stored(
        &self,
        config: &ScanConfig,
        set_hash: &str,
        first: NaiveDate,
        last: NaiveDate,
        issues: &mut Vec<Issue>,
    ) -> BTreeMap<NaiveDate, BTreeMap<String, AggregateRecord>> {
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, AggregateRecord>> = BTreeMap::new();
        let Some(store) = self.store else {
            return by_date;
        };
        match store.fetch_aggregate_series(set_hash, &config.interval, None, first, last) {
            Ok(records) => {
                for record in records {
                    by_date
                        .entry(record.as_of_date)
                        .or_default()
                        .insert(record.metric_key.clone(), record);
                }
            }
            Err(e) => {
                warn!("stored aggregates unavailable: {}", e);
                issues.push(Issue::store(format!("stored aggregates unavailable: {}", e)));
            }
        }
        by_date
    }

    fn preload_cache(
        &self,
        config: &ScanConfig,
        histories: &[(String, Vec<PricePoint>)],
        last: NaiveDate,
        resolver: &mut MetricResolver,
        issues: &mut Vec<Issue>,
    ) {
        let Some(store) = self.store else {
            return;
        };
        for (ticker, _) in histories {
            match store.fetch_metric_values(ticker, &config.interval, None, config.start_date, last) {
                Ok(entries) => resolver.preload(entries),
                Err(e) => {
                    issues.push(Issue::store(format!("metric cache unavailable: {}", e)).with_ticker(ticker));
                }
            }
        }
    }
}

/// The `history_dates` most recent timeline dates, ascending.
pub fn evaluation_dates(timeline: &[NaiveDate], settings: &BreadthSettings) -> Vec<NaiveDate> {
    let skip = timeline.len().saturating_sub(settings.history_dates);
    timeline[skip..].to_vec()
}

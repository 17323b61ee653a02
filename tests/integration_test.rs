//! End-to-end scan tests against the mock price supplier and an in-memory
//! SQLite store.

mod common;

use approx::assert_relative_eq;
use breadthscan::adapters::file_config_adapter::FileConfigAdapter;
use breadthscan::domain::breadth::AggregateRecord;
use breadthscan::domain::indicator::Registry;
use breadthscan::domain::issue::IssueKind;
use breadthscan::domain::scan::{ScanReport, Scanner};
use breadthscan::domain::scan_config::{build_plan, load_scan_config, ScanConfig, ScanPlan};
use breadthscan::domain::universe::set_hash;
use common::*;

fn scan_ini(tickers: &str, extra: &str) -> String {
    format!(
        "[scan]\ntickers = {}\nstart_date = 2024-01-01\nend_date = 2024-12-31\n\n{}",
        tickers, extra
    )
}

fn load(ini: &str) -> (ScanConfig, ScanPlan) {
    let adapter = FileConfigAdapter::from_string(ini).unwrap();
    let config = load_scan_config(&adapter).unwrap();
    let plan = build_plan(&config, &Registry::builtin());
    (config, plan)
}

fn scan(data: &MockDataPort, ini: &str) -> ScanReport {
    let (config, plan) = load(ini);
    Scanner::new(data, None).run(&config, &plan)
}

fn latest<'a>(report: &'a ScanReport, key: &str) -> &'a AggregateRecord {
    let last = report.run_metadata.evaluation_dates.last().unwrap();
    report
        .aggregates
        .iter()
        .find(|r| r.as_of_date == *last && r.metric_key == key)
        .unwrap_or_else(|| panic!("no aggregate {}", key))
}

mod signals {
    use super::*;

    const ROC_RULES: &str = r#"
[indicator.roc]
type = roc
id = r
lookback = 1
ma1 = 1
ma2 = 1

[rules]
zero_cross = crossover_level(r.roc, 0, both)
"#;

    #[test]
    fn roc_zero_crossover_fires_down_then_up() {
        let data = MockDataPort::new().with_closes("AAA", &[10.0, 10.0, 10.0, 10.0, 5.0, 15.0]);
        let report = scan(&data, &scan_ini("AAA", ROC_RULES));

        assert_eq!(report.signals.len(), 2);
        let down = &report.signals[0];
        assert_eq!(down.signal_date, nth_date(4));
        assert_eq!(down.signal_type, "crossover_level_down");
        assert_eq!(down.rule, "zero_cross");
        assert_eq!(down.instance_id, "r");
        assert_relative_eq!(down.metadata["value"].as_f64().unwrap(), -0.5);

        let up = &report.signals[1];
        assert_eq!(up.signal_date, nth_date(5));
        assert_eq!(up.signal_type, "crossover_level_up");
        assert_relative_eq!(up.metadata["value"].as_f64().unwrap(), 2.0);
        assert_relative_eq!(up.metadata["previous"].as_f64().unwrap(), -0.5);
    }

    #[test]
    fn signals_since_drops_earlier_events() {
        let ini = scan_ini("AAA", ROC_RULES).replace(
            "end_date = 2024-12-31\n",
            "end_date = 2024-12-31\nsignals_since = 2024-01-06\n",
        );
        let data = MockDataPort::new().with_closes("AAA", &[10.0, 10.0, 10.0, 10.0, 5.0, 15.0]);
        let report = scan(&data, &ini);

        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].signal_type, "crossover_level_up");
    }

    #[test]
    fn signals_ordered_by_date_across_tickers() {
        let data = MockDataPort::new()
            .with_closes("AAA", &[10.0, 10.0, 10.0, 10.0, 5.0, 15.0])
            .with_closes("BBB", &[10.0, 9.0, 11.0, 11.0, 11.0, 11.0]);
        let report = scan(&data, &scan_ini("AAA, BBB", ROC_RULES));

        let dates: Vec<_> = report.signals.iter().map(|s| s.signal_date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(report.signals[0].ticker, "BBB");
    }

    #[test]
    fn bad_rule_is_reported_and_others_still_fire() {
        let extra = format!(
            "{}broken = crossover_level(r.nope, 0, both)\nunparsable = threshold(r.roc >, 0)\n",
            ROC_RULES
        );
        let data = MockDataPort::new().with_closes("AAA", &[10.0, 10.0, 10.0, 10.0, 5.0, 15.0]);
        let report = scan(&data, &scan_ini("AAA", &extra));

        assert_eq!(report.signals.len(), 2);
        let rule_issues: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::Configuration)
            .filter_map(|i| i.rule.as_deref())
            .collect();
        assert_eq!(rule_issues, vec!["broken", "unparsable"]);
        assert_eq!(report.run_metadata.rules, vec!["zero_cross"]);
    }

    #[test]
    fn composite_rule_carries_children() {
        let extra = r#"
[indicator.px]
type = price
id = px

[indicator.avg]
type = sma
id = avg
window = 2

[rules]
strong = all_of(threshold(px.close, >, 10), crossover_series(avg.close, avg.sma, up))
"#;
        let data = MockDataPort::new().with_closes("AAA", &[12.0, 11.0, 10.0, 13.0, 14.0]);
        let report = scan(&data, &scan_ini("AAA", extra));

        assert_eq!(report.signals.len(), 1);
        let signal = &report.signals[0];
        assert_eq!(signal.signal_date, nth_date(3));
        assert_eq!(signal.signal_type, "all_of");
        assert_eq!(signal.instance_id, "px");
        assert_eq!(signal.metadata["children"].as_array().unwrap().len(), 2);
    }
}

mod breadth {
    use super::*;

    #[test]
    fn advance_decline_three_one_one() {
        let data = MockDataPort::new()
            .with_closes("A", &[10.0, 11.0])
            .with_closes("B", &[10.0, 12.0])
            .with_closes("C", &[5.0, 6.0])
            .with_closes("D", &[10.0, 9.0])
            .with_closes("E", &[10.0, 10.0]);
        let report = scan(&data, &scan_ini("A, B, C, D, E", ""));

        assert_eq!(report.run_metadata.evaluation_dates, vec![nth_date(1)]);
        assert_eq!(latest(&report, "advances").value, Some(3.0));
        assert_eq!(latest(&report, "declines").value, Some(1.0));
        assert_eq!(latest(&report, "unchanged").value, Some(1.0));
        assert_eq!(latest(&report, "valid_ticker_count").value, Some(5.0));
        assert_eq!(latest(&report, "net_advances").value, Some(2.0));
        assert_relative_eq!(latest(&report, "advance_pct").value.unwrap(), 0.6);
        assert_relative_eq!(latest(&report, "decline_pct").value.unwrap(), 0.2);
        assert_relative_eq!(latest(&report, "advance_decline_ratio").value.unwrap(), 3.0);
        assert_eq!(latest(&report, "advances").missing_count, 0);
    }

    #[test]
    fn sma_equality_counted_separately() {
        let data = MockDataPort::new()
            .with_closes("FLAT", &[50.0; 13])
            .with_closes("SHORT", &[50.0; 12]);
        let report = scan(
            &data,
            &scan_ini("FLAT, SHORT", "[aggregates]\nma_windows = 13\n"),
        );

        let equal = latest(&report, "ma13_equal");
        assert_eq!(equal.value, Some(1.0));
        assert_eq!(equal.valid_count, 1);
        assert_eq!(equal.missing_count, 1);
        assert_eq!(latest(&report, "ma13_above").value, Some(0.0));
        assert_eq!(latest(&report, "ma13_below").value, Some(0.0));
        assert_eq!(latest(&report, "ma13_above_pct").value, Some(0.0));
    }

    #[test]
    fn history_dates_evaluates_recent_dates() {
        let data = MockDataPort::new()
            .with_closes("A", &generate_points(6, 10.0, 1.0))
            .with_closes("B", &generate_points(6, 20.0, -1.0));
        let report = scan(
            &data,
            &scan_ini("A, B", "[aggregates]\nhistory_dates = 3\nroc_compare = 1:1\n"),
        );

        assert_eq!(
            report.run_metadata.evaluation_dates,
            vec![nth_date(3), nth_date(4), nth_date(5)]
        );
        let per_date = report
            .aggregates
            .iter()
            .filter(|r| r.as_of_date == nth_date(3))
            .count();
        assert_eq!(per_date, 8 + 5);
        assert_eq!(latest(&report, "advances").value, Some(1.0));
        assert_eq!(latest(&report, "declines").value, Some(1.0));
    }

    #[test]
    fn ticker_without_data_on_date_is_missing() {
        let data = MockDataPort::new()
            .with_closes("LONG", &[10.0, 11.0, 12.0])
            .with_closes("ONE", &[7.0]);
        let report = scan(&data, &scan_ini("LONG, ONE", ""));

        let advances = latest(&report, "advances");
        assert_eq!(advances.value, Some(1.0));
        assert_eq!(advances.valid_count, 1);
        assert_eq!(advances.missing_count, 1);
        assert!(latest(&report, "advance_decline_ratio").value.is_none());
    }
}

mod failures {
    use super::*;

    #[test]
    fn fetch_error_and_empty_data_are_isolated() {
        let data = MockDataPort::new()
            .with_closes("GOOD", &[10.0, 11.0])
            .with_error("BAD", "connection reset")
            .with_rows("EMPTY", Vec::new());
        let report = scan(&data, &scan_ini("GOOD, BAD, EMPTY, MISSING", ""));

        assert_eq!(report.run_metadata.tickers_processed, 1);
        assert_eq!(report.run_metadata.tickers_skipped, 3);
        assert_eq!(report.ticker_summaries.len(), 1);
        assert_eq!(report.ticker_summaries[0].ticker, "GOOD");

        let data_issues: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::Data)
            .filter_map(|i| i.ticker.as_deref())
            .collect();
        assert_eq!(data_issues, vec!["BAD", "EMPTY", "MISSING"]);
        assert_eq!(latest(&report, "advances").value, Some(1.0));
    }

    #[test]
    fn missing_benchmark_is_computation_issue_only_for_dependent_instance() {
        let extra = r#"
[indicator.rs]
type = relative_strength
id = rs
lookback = 1

[indicator.roc]
type = roc
lookback = 1
ma1 = 1
ma2 = 1

[rules]
rs_up = threshold(rs.roc, >, 0)
roc_up = threshold(roc_1.roc, >, 0)
"#;
        let ini = scan_ini("AAA", extra).replace(
            "end_date = 2024-12-31\n",
            "end_date = 2024-12-31\nbenchmark = spy\n",
        );
        let data = MockDataPort::new().with_closes("AAA", &[10.0, 11.0, 12.0]);
        let report = scan(&data, &ini);

        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::Data && i.ticker.as_deref() == Some("SPY")));
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::Computation
            && i.instance_id.as_deref() == Some("rs")));
        assert!(report.signals.iter().all(|s| s.rule == "roc_up"));
        assert_eq!(report.signals.len(), 2);
    }

    #[test]
    fn benchmark_feeds_relative_strength() {
        let extra = r#"
[indicator.rs]
type = relative_strength
id = rs
lookback = 1

[rules]
outperforming = threshold(rs.roc, >, 0)
"#;
        let ini = scan_ini("AAA", extra).replace(
            "end_date = 2024-12-31\n",
            "end_date = 2024-12-31\nbenchmark = SPY\n",
        );
        let data = MockDataPort::new()
            .with_closes("AAA", &[10.0, 12.0, 15.0])
            .with_closes("SPY", &[100.0, 101.0, 102.0]);
        let report = scan(&data, &ini);

        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.signals.len(), 2);
        assert!(report.ticker_summaries.iter().all(|s| s.ticker != "SPY"));
    }
}

mod universe {
    use super::*;

    #[test]
    fn set_hash_ignores_order_case_and_duplicates() {
        let data = MockDataPort::new()
            .with_closes("A", &[1.0, 2.0])
            .with_closes("B", &[1.0, 2.0]);
        let first = scan(&data, &scan_ini("B, a, A", ""));
        let second = scan(&data, &scan_ini("A,B", ""));

        assert_eq!(first.run_metadata.set_hash, second.run_metadata.set_hash);
        assert_eq!(first.run_metadata.set_hash, set_hash(&["A", "B"]));
        assert_eq!(first.run_metadata.tickers, vec!["B", "A"]);
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_store {
    use super::*;
    use breadthscan::adapters::sqlite_adapter::SqliteAdapter;
    use breadthscan::ports::store_port::StorePort;

    fn store() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn fixture() -> MockDataPort {
        MockDataPort::new()
            .with_closes("T1", &generate_points(10, 10.0, 1.0))
            .with_closes("T2", &generate_points(10, 30.0, -1.0))
    }

    fn stored(store: &SqliteAdapter, hash: &str) -> Vec<AggregateRecord> {
        store
            .fetch_aggregate_series(hash, "1d", None, nth_date(0), nth_date(30))
            .unwrap()
    }

    const AGGREGATES: &str = "[aggregates]\nma_windows = 3\nhistory_dates = 2\n";

    #[test]
    fn repeated_scan_is_idempotent() {
        let store = store();
        let data = fixture();
        let (config, plan) = load(&scan_ini("T1, T2", AGGREGATES));

        let first = Scanner::new(&data, Some(&store)).run(&config, &plan);
        let hash = first.run_metadata.set_hash.clone();
        let after_first = stored(&store, &hash);
        assert_eq!(after_first.len(), (8 + 5) * 2);
        assert!(first.run_metadata.store_enabled);

        let second = Scanner::new(&data, Some(&store)).run(&config, &plan);
        assert_eq!(second.aggregates, first.aggregates);
        assert_eq!(stored(&store, &hash), after_first);
        assert_eq!(second.run_metadata.cache_hits, 0);
        assert!(second.issues.is_empty(), "{:?}", second.issues);
    }

    #[test]
    fn security_set_is_persisted() {
        let store = store();
        let data = fixture();
        let (config, plan) = load(&scan_ini("t2, T1, T2", AGGREGATES));

        let report = Scanner::new(&data, Some(&store)).run(&config, &plan);
        let set = store
            .fetch_security_set(&report.run_metadata.set_hash)
            .unwrap()
            .unwrap();
        assert_eq!(set.tickers, vec!["T1", "T2"]);
    }

    #[test]
    fn new_metric_reuses_cached_moving_averages() {
        let store = store();
        let data = fixture();
        let (config, plan) = load(&scan_ini("T1, T2", AGGREGATES));
        Scanner::new(&data, Some(&store)).run(&config, &plan);

        let widened = AGGREGATES.replace("ma_windows = 3", "ma_windows = 3, 5");
        let (config, plan) = load(&scan_ini("T1, T2", &widened));
        let report = Scanner::new(&data, Some(&store)).run(&config, &plan);

        assert_eq!(report.run_metadata.cache_hits, 4);
        let hash = &report.run_metadata.set_hash;
        assert_eq!(stored(&store, hash).len(), (8 + 5 + 5) * 2);
        assert_eq!(latest(&report, "ma5_above").value, Some(1.0));
        assert_eq!(latest(&report, "ma5_below").value, Some(1.0));
    }

    #[test]
    fn cached_values_match_fresh_computation() {
        let store = store();
        let data = fixture();
        let (config, plan) = load(&scan_ini("T1, T2", AGGREGATES));
        let cold = Scanner::new(&data, None).run(&config, &plan);
        Scanner::new(&data, Some(&store)).run(&config, &plan);
        let warm = Scanner::new(&data, Some(&store)).run(&config, &plan);

        assert_eq!(cold.aggregates, warm.aggregates);

        let cached = store
            .fetch_metric_values("T1", "1d", Some("sma:3"), nth_date(0), nth_date(30))
            .unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].as_of_date, nth_date(8));
        assert_relative_eq!(cached[0].value, 17.0);
        assert_relative_eq!(cached[1].value, 18.0);
    }
}

//! CLI integration tests.
//!
//! Tests cover:
//! - Scan config resolution and ticker overrides
//! - Price source and store selection
//! - Dry-run and validate with real INI files on disk
//! - Scan pipeline with MockDataPort writing a JSON report
//! - End-to-end runs over a CSV directory and a SQLite file

mod common;

use breadthscan::adapters::file_config_adapter::FileConfigAdapter;
use breadthscan::adapters::json_report_adapter::JsonReportAdapter;
use breadthscan::cli::{self, Cli};
use breadthscan::domain::error::BreadthscanError;
use breadthscan::domain::indicator::Registry;
use breadthscan::domain::scan_config::build_plan;
use clap::Parser;
use common::*;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn code_of(code: ExitCode) -> String {
    format!("{:?}", code)
}

fn assert_exit(code: ExitCode, expected: u8) {
    assert_eq!(code_of(code), code_of(ExitCode::from(expected)));
}

fn read_report(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

const VALID_INI: &str = r#"
[scan]
tickers = AAA, BBB
start_date = 2024-01-01
end_date = 2024-12-31

[indicator.momo]
type = roc
id = r
lookback = 1
ma1 = 1
ma2 = 1

[rules]
zero_cross = crossover_level(r.roc, 0, both)

[aggregates]
ma_windows = 3
"#;

/// INI for a CSV directory holding AAA and BBB fixtures.
fn csv_fixture(dir: &Path, extra: &str) -> PathBuf {
    fs::write(
        dir.join("AAA.csv"),
        csv_body(&[10.0, 10.0, 10.0, 10.0, 5.0, 15.0]),
    )
    .unwrap();
    fs::write(dir.join("BBB.csv"), csv_body(&[20.0, 21.0, 22.0, 23.0, 24.0, 25.0])).unwrap();

    let ini = format!(
        "{}\n[csv]\npath = {}\n\n{}",
        VALID_INI,
        dir.display(),
        extra
    );
    let path = dir.join("scan.ini");
    fs::write(&path, ini).unwrap();
    path
}

mod config_resolution {
    use super::*;

    #[test]
    fn resolve_scan_config_reads_universe() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::resolve_scan_config(&adapter, None).unwrap();

        assert_eq!(config.universe.tickers, vec!["AAA", "BBB"]);
        assert_eq!(config.interval, "1d");
        assert_eq!(config.start_date, date(2024, 1, 1));
        assert_eq!(config.end_date, date(2024, 12, 31));
    }

    #[test]
    fn tickers_override_replaces_universe() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::resolve_scan_config(&adapter, Some("zzz, yyy")).unwrap();

        assert_eq!(config.universe.tickers, vec!["ZZZ", "YYY"]);
        assert_ne!(
            config.universe.set_hash,
            cli::resolve_scan_config(&adapter, None)
                .unwrap()
                .universe
                .set_hash
        );
    }

    #[test]
    fn blank_tickers_override_is_invalid() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let err = cli::resolve_scan_config(&adapter, Some(" , ")).unwrap_err();
        assert!(matches!(err, BreadthscanError::ConfigInvalid { key, .. } if key == "tickers"));
    }

    #[test]
    fn inverted_window_is_fatal() {
        let ini = VALID_INI.replace("end_date = 2024-12-31", "end_date = 2023-12-31");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let err = cli::resolve_scan_config(&adapter, None).unwrap_err();
        assert!(matches!(err, BreadthscanError::ConfigInvalid { .. }));
    }
}

mod port_selection {
    use super::*;
    use breadthscan::ports::data_port::DataPort;

    #[test]
    fn csv_path_selects_csv_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ini_path = csv_fixture(dir.path(), "");
        let adapter = FileConfigAdapter::from_file(&ini_path).unwrap();

        let port = cli::open_data_port(&adapter).unwrap();
        assert_eq!(port.list_tickers().unwrap(), vec!["AAA", "BBB"]);
        assert_eq!(
            port.fetch_prices("AAA", date(2024, 1, 1), date(2024, 12, 31))
                .unwrap()
                .len(),
            6
        );
    }

    #[test]
    fn ticker_ranges_over_csv_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ini_path = csv_fixture(dir.path(), "");
        let adapter = FileConfigAdapter::from_file(&ini_path).unwrap();
        let port = cli::open_data_port(&adapter).unwrap();

        let listing = cli::ticker_ranges(&*port).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].0, "AAA");
        assert_eq!(listing[0].1, Some((nth_date(0), nth_date(5), 6)));
    }

    #[test]
    fn unopenable_store_becomes_issue() {
        let dir = tempfile::tempdir().unwrap();
        let ini = format!(
            "{}\n[sqlite]\npath = {}\nconnect_timeout = 1\n",
            VALID_INI,
            dir.path().join("missing/sub/store.db").display()
        );
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();

        let (store, issues) = cli::open_store_or_issue(&adapter);
        assert!(store.is_none());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.starts_with("store unavailable"));
    }

    #[test]
    fn store_disabled_without_sqlite_section() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        assert!(cli::open_store(&adapter).unwrap().is_none());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_path_enables_store() {
        let dir = tempfile::tempdir().unwrap();
        let ini = format!(
            "{}\n[sqlite]\npath = {}\n",
            VALID_INI,
            dir.path().join("scan.db").display()
        );
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        assert!(cli::open_store(&adapter).unwrap().is_some());
    }
}

mod dry_run {
    use super::*;

    #[test]
    fn dry_run_valid_config_succeeds() {
        let file = write_temp_ini(VALID_INI);
        assert_exit(cli::run_dry_run(&file.path().to_path_buf(), None), 0);
    }

    #[test]
    fn dry_run_missing_file_fails() {
        let code = cli::run_dry_run(&PathBuf::from("/nonexistent/scan.ini"), None);
        assert_exit(code, 2);
    }

    #[test]
    fn dry_run_missing_tickers_fails() {
        let file = write_temp_ini("[scan]\nstart_date = 2024-01-01\n");
        assert_exit(cli::run_dry_run(&file.path().to_path_buf(), None), 2);
    }

    #[test]
    fn dry_run_reports_bad_rule_without_failing() {
        let ini = format!("{}\n[rules]\nbroken = golden_cross(r.roc)\n", VALID_INI);
        let file = write_temp_ini(&ini);
        assert_exit(cli::run_dry_run(&file.path().to_path_buf(), None), 0);
    }
}

mod validation {
    use super::*;

    fn plan_for(ini: &str) -> breadthscan::domain::scan_config::ScanPlan {
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let config = cli::resolve_scan_config(&adapter, None).unwrap();
        build_plan(&config, &Registry::builtin())
    }

    #[test]
    fn clean_plan_is_valid() {
        assert_exit(cli::validation_exit_code(&plan_for(VALID_INI)), 0);
    }

    #[test]
    fn rule_issue_exits_with_rule_code() {
        let ini = VALID_INI.replace(
            "zero_cross = crossover_level(r.roc, 0, both)",
            "zero_cross = crossover_level(r.roc, 0, sideways)",
        );
        assert_exit(cli::validation_exit_code(&plan_for(&ini)), 4);
    }

    #[test]
    fn unknown_indicator_exits_with_config_code() {
        let ini = format!("{}\n[indicator.odd]\ntype = ichimoku\n", VALID_INI);
        assert_exit(cli::validation_exit_code(&plan_for(&ini)), 2);
    }

    #[test]
    fn validate_command_on_disk() {
        let file = write_temp_ini(VALID_INI);
        let args = Cli::try_parse_from([
            "breadthscan",
            "validate",
            "--config",
            file.path().to_str().unwrap(),
        ])
        .unwrap();
        assert_exit(cli::run(args), 0);
    }
}

mod pipeline {
    use super::*;

    fn run_with(data: &MockDataPort, output: &Path) -> ExitCode {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::resolve_scan_config(&adapter, None).unwrap();
        let plan = build_plan(&config, &Registry::builtin());
        cli::run_scan_pipeline(
            data,
            None,
            Vec::new(),
            &config,
            &plan,
            &JsonReportAdapter::new(),
            &output.to_path_buf(),
        )
    }

    #[test]
    fn pipeline_writes_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out/report.json");
        let data = MockDataPort::new()
            .with_closes("AAA", &[10.0, 10.0, 10.0, 10.0, 5.0, 15.0])
            .with_closes("BBB", &generate_points(6, 20.0, 1.0));

        assert_exit(run_with(&data, &output), 0);

        let report = read_report(&output);
        assert_eq!(report["run_metadata"]["tickers_processed"], 2);
        assert_eq!(report["signals"].as_array().unwrap().len(), 2);
        assert_eq!(report["signals"][0]["signal_type"], "crossover_level_down");
        assert_eq!(report["ticker_summaries"].as_array().unwrap().len(), 2);
        assert!(report["aggregates"]
            .as_array()
            .unwrap()
            .iter()
            .any(|a| a["metric_key"] == "ma3_above"));
    }

    #[test]
    fn pipeline_partial_universe_continues() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.json");
        let data = MockDataPort::new()
            .with_closes("AAA", &[10.0, 10.0, 10.0, 10.0, 5.0, 15.0])
            .with_error("BBB", "timeout");

        assert_exit(run_with(&data, &output), 0);

        let report = read_report(&output);
        assert_eq!(report["run_metadata"]["tickers_skipped"], 1);
        assert_eq!(report["issues"][0]["kind"], "data");
        assert_eq!(report["issues"][0]["ticker"], "BBB");
    }

    #[test]
    fn pipeline_without_any_data_writes_report_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.json");

        assert_exit(run_with(&MockDataPort::new(), &output), 5);

        let report = read_report(&output);
        assert_eq!(report["issues"].as_array().unwrap().len(), 2);
        assert!(report["aggregates"].as_array().unwrap().is_empty());
    }
}

mod end_to_end {
    use super::*;

    #[test]
    fn scan_over_csv_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ini_path = csv_fixture(dir.path(), "");
        let output = dir.path().join("report.json");

        let args = Cli::try_parse_from([
            "breadthscan",
            "scan",
            "--config",
            ini_path.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap();
        assert_exit(cli::run(args), 0);

        let report = read_report(&output);
        assert_eq!(report["run_metadata"]["tickers"][0], "AAA");
        let types: Vec<_> = report["signals"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["signal_type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(types, vec!["crossover_level_down", "crossover_level_up"]);
    }

    #[test]
    fn scan_with_tickers_override() {
        let dir = tempfile::tempdir().unwrap();
        let ini_path = csv_fixture(dir.path(), "");
        let output = dir.path().join("report.json");

        let args = Cli::try_parse_from([
            "breadthscan",
            "scan",
            "-c",
            ini_path.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--tickers",
            "bbb",
        ])
        .unwrap();
        assert_exit(cli::run(args), 0);

        let report = read_report(&output);
        assert_eq!(report["run_metadata"]["tickers"], serde_json::json!(["BBB"]));
        assert!(report["signals"].as_array().unwrap().is_empty());
    }

    #[test]
    fn list_tickers_over_csv_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ini_path = csv_fixture(dir.path(), "");
        let args = Cli::try_parse_from([
            "breadthscan",
            "list-tickers",
            "--config",
            ini_path.to_str().unwrap(),
        ])
        .unwrap();
        assert_exit(cli::run(args), 0);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn scan_survives_unopenable_store() {
        let dir = tempfile::tempdir().unwrap();
        let extra = format!(
            "[sqlite]\npath = {}\nconnect_timeout = 1\n",
            dir.path().join("missing/sub/store.db").display()
        );
        let ini_path = csv_fixture(dir.path(), &extra);
        let output = dir.path().join("report.json");

        let args = Cli::try_parse_from([
            "breadthscan",
            "scan",
            "--config",
            ini_path.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap();
        assert_exit(cli::run(args), 0);

        assert!(output.exists());
        let report = read_report(&output);
        assert_eq!(report["issues"][0]["kind"], "store");
        assert_eq!(report["run_metadata"]["store_enabled"], false);
        assert_eq!(report["run_metadata"]["tickers_processed"], 2);
        assert_eq!(report["signals"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["breadthscan", "backtest"]).is_err());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn scan_then_print_stored_aggregates() {
        use breadthscan::adapters::sqlite_adapter::SqliteAdapter;
        use breadthscan::domain::universe::set_hash;
        use breadthscan::ports::store_port::StorePort;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("scan.db");
        let extra = format!("[sqlite]\npath = {}\n", db_path.display());
        let ini_path = csv_fixture(dir.path(), &extra);
        let output = dir.path().join("report.json");
        let config = ini_path.to_str().unwrap();

        let scan = Cli::try_parse_from([
            "breadthscan",
            "scan",
            "--config",
            config,
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap();
        assert_exit(cli::run(scan), 0);

        let aggregates = Cli::try_parse_from([
            "breadthscan",
            "aggregates",
            "--config",
            config,
            "--metric",
            "advances",
        ])
        .unwrap();
        assert_exit(cli::run(aggregates), 0);

        let adapter = FileConfigAdapter::from_file(&ini_path).unwrap();
        let store = SqliteAdapter::from_config(&adapter).unwrap();
        let records = store
            .fetch_aggregate_series(
                &set_hash(&["AAA", "BBB"]),
                "1d",
                Some("advances"),
                date(2024, 1, 1),
                date(2024, 12, 31),
            )
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_of_date, nth_date(5));
        assert_eq!(records[0].value, Some(2.0));
    }

    #[test]
    fn aggregates_without_store_fails() {
        let file = write_temp_ini(VALID_INI);
        let args = Cli::try_parse_from([
            "breadthscan",
            "aggregates",
            "--config",
            file.path().to_str().unwrap(),
        ])
        .unwrap();
        assert_exit(cli::run(args), 2);
    }
}

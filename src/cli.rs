//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::error::BreadthscanError;
use crate::domain::indicator::Registry;
use crate::domain::issue::{Issue, IssueKind};
use crate::domain::scan::{ScanReport, Scanner};
use crate::domain::scan_config::{build_plan, load_scan_config, parse_date, ScanConfig, ScanPlan};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;
use crate::ports::store_port::StorePort;

pub const DEFAULT_REPORT_PATH: &str = "breadthscan_report.json";

#[derive(Parser, Debug)]
#[command(name = "breadthscan", about = "Technical signal and market breadth scanner")]
pub struct Cli {
    /// Log per-ticker detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scan over the configured universe
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated tickers replacing `[scan] tickers`
        #[arg(long)]
        tickers: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Check indicators and rules without fetching prices
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print a stored aggregate series for the configured universe
    Aggregates {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        tickers: Option<String>,
        #[arg(long)]
        metric: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// List tickers available from the price source
    ListTickers {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing(cli.verbose);

    match cli.command {
        Command::Scan {
            config,
            output,
            tickers,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, tickers.as_deref())
            } else {
                run_scan(&config, output.as_ref(), tickers.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Aggregates {
            config,
            tickers,
            metric,
            start,
            end,
        } => run_aggregates(
            &config,
            tickers.as_deref(),
            metric.as_deref(),
            start.as_deref(),
            end.as_deref(),
        ),
        Command::ListTickers { config } => run_list_tickers(&config),
    }
}

/// Install the stderr subscriber once; later calls are no-ops.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn fail(err: BreadthscanError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        fail(BreadthscanError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    })
}

/// Scan definition with an optional ticker override applied.
pub fn resolve_scan_config(
    adapter: &dyn ConfigPort,
    tickers_override: Option<&str>,
) -> Result<ScanConfig, BreadthscanError> {
    let config = load_scan_config(adapter)?;
    match tickers_override {
        Some(tickers) => config.with_tickers(tickers),
        None => Ok(config),
    }
}

/// `[csv] path` selects the CSV directory; otherwise prices come from SQLite.
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, BreadthscanError> {
    if let Some(path) = config.get_string("csv", "path") {
        return Ok(Box::new(CsvAdapter::new(PathBuf::from(path.trim()))));
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        Ok(Box::new(SqliteAdapter::from_config(config)?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        Err(BreadthscanError::ConfigMissing {
            section: "csv".into(),
            key: "path".into(),
        })
    }
}

/// The store is enabled when `[sqlite] path` is configured.
pub fn open_store(config: &dyn ConfigPort) -> Result<Option<Box<dyn StorePort>>, BreadthscanError> {
    if config.get_string("sqlite", "path").is_none() {
        return Ok(None);
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        Ok(Some(Box::new(SqliteAdapter::from_config(config)?)))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        Err(BreadthscanError::Database {
            reason: "sqlite feature is required for [sqlite]".into(),
        })
    }
}

fn run_scan(
    config_path: &PathBuf,
    output_path: Option<&PathBuf>,
    tickers_override: Option<&str>,
) -> ExitCode {
    info!(config = %config_path.display(), "loading config");
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let scan_config = match resolve_scan_config(&adapter, tickers_override) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let plan = build_plan(&scan_config, &Registry::builtin());

    let data_port = match open_data_port(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    let (store, store_issues) = open_store_or_issue(&adapter);

    let output = output_path
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH));

    run_scan_pipeline(
        &*data_port,
        store.as_deref(),
        store_issues,
        &scan_config,
        &plan,
        &JsonReportAdapter::new(),
        &output,
    )
}

/// Like [`open_store`], but a store that cannot be opened disables caching
/// for this run and becomes a store issue instead of an error.
pub fn open_store_or_issue(config: &dyn ConfigPort) -> (Option<Box<dyn StorePort>>, Vec<Issue>) {
    match open_store(config) {
        Ok(store) => (store, Vec::new()),
        Err(e) => {
            warn!("store unavailable, scanning without it: {}", e);
            (None, vec![Issue::store(format!("store unavailable: {}", e))])
        }
    }
}

/// Scan, print a console summary and write the report.
///
/// The report is written even when no ticker had data; that case still
/// exits with the no-data code.
pub fn run_scan_pipeline(
    data_port: &dyn DataPort,
    store: Option<&dyn StorePort>,
    prior_issues: Vec<Issue>,
    scan_config: &ScanConfig,
    plan: &ScanPlan,
    report_port: &dyn ReportPort,
    output: &PathBuf,
) -> ExitCode {
    let report = Scanner::new(data_port, store)
        .with_issues(prior_issues)
        .run(scan_config, plan);
    print_summary(&report);

    if let Err(e) = report_port.write(&report, &output.display().to_string()) {
        return fail(e);
    }
    eprintln!("\nReport written to: {}", output.display());

    if report.run_metadata.tickers_processed == 0 {
        eprintln!("error: no tickers with price data in the configured window");
        return ExitCode::from(5);
    }
    ExitCode::SUCCESS
}

fn print_summary(report: &ScanReport) {
    let meta = &report.run_metadata;
    eprintln!("\n=== Scan Results ===");
    eprintln!("Universe:         {} tickers ({})", meta.tickers.len(), meta.set_hash);
    eprintln!("Window:           {} to {}", meta.start_date, meta.end_date);
    eprintln!("Processed:        {}", meta.tickers_processed);
    eprintln!("Skipped:          {}", meta.tickers_skipped);
    eprintln!("Signals:          {}", report.signals.len());
    eprintln!("Aggregates:       {}", report.aggregates.len());
    eprintln!("Issues:           {}", report.issues.len());

    if !report.signals.is_empty() {
        eprintln!("\n=== Signals ===");
        for signal in &report.signals {
            eprintln!(
                "  {}  {:<8} {:<24} {}",
                signal.signal_date, signal.ticker, signal.rule, signal.signal_type
            );
        }
    }

    if let Some(last) = meta.evaluation_dates.last() {
        eprintln!("\n=== Breadth as of {} ===", last);
        for record in report.aggregates.iter().filter(|r| r.as_of_date == *last) {
            let value = record
                .value
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "-".to_string());
            eprintln!(
                "  {:<28} {:>12}  (valid {}, missing {})",
                record.metric_key, value, record.valid_count, record.missing_count
            );
        }
    }
}

pub fn run_dry_run(config_path: &PathBuf, tickers_override: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let scan_config = match resolve_scan_config(&adapter, tickers_override) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    eprintln!("Config validated successfully");

    let plan = build_plan(&scan_config, &Registry::builtin());
    print_plan(&scan_config, &plan);

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn print_plan(scan_config: &ScanConfig, plan: &ScanPlan) {
    eprintln!("\nUniverse:");
    eprintln!("  tickers:  {}", scan_config.universe.tickers.join(", "));
    eprintln!("  set_hash: {}", scan_config.universe.set_hash);
    eprintln!(
        "  window:   {} to {} ({})",
        scan_config.start_date, scan_config.end_date, scan_config.interval
    );
    if let Some(benchmark) = &scan_config.benchmark {
        eprintln!("  benchmark: {}", benchmark);
    }

    eprintln!("\nIndicators:");
    for instance in &plan.instances {
        eprintln!(
            "  {:<16} {}  [{}]",
            instance.instance_id,
            instance.unit.label(),
            instance.unit.series_names().join(", ")
        );
    }

    eprintln!("\nRules:");
    for rule in &plan.rules {
        eprintln!("  {:<16} {}", rule.name, rule.spec.kind());
    }

    eprintln!("\nAggregates:");
    eprintln!("  {}", scan_config.breadth.metric_keys().join(", "));

    if !plan.issues.is_empty() {
        eprintln!("\nIssues:");
        for issue in &plan.issues {
            eprintln!("  {}", issue);
        }
    }
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let scan_config = match load_scan_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let plan = build_plan(&scan_config, &Registry::builtin());
    print_plan(&scan_config, &plan);

    validation_exit_code(&plan)
}

/// Rule problems take precedence over indicator problems.
pub fn validation_exit_code(plan: &ScanPlan) -> ExitCode {
    let config_issues: Vec<_> = plan
        .issues
        .iter()
        .filter(|i| i.kind == IssueKind::Configuration)
        .collect();
    if config_issues.is_empty() {
        eprintln!("\nConfiguration is valid.");
        return ExitCode::SUCCESS;
    }
    if config_issues.iter().any(|i| i.rule.is_some()) {
        ExitCode::from(4)
    } else {
        ExitCode::from(2)
    }
}

fn parse_cli_date(key: &str, raw: Option<&str>, default: NaiveDate) -> Result<NaiveDate, BreadthscanError> {
    match raw {
        Some(raw) => parse_date("cli", key, raw),
        None => Ok(default),
    }
}

fn run_aggregates(
    config_path: &PathBuf,
    tickers_override: Option<&str>,
    metric: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let scan_config = match resolve_scan_config(&adapter, tickers_override) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let (start_date, end_date) = match (
        parse_cli_date("start", start, scan_config.start_date),
        parse_cli_date("end", end, scan_config.end_date),
    ) {
        (Ok(s), Ok(e)) => (s, e),
        (Err(e), _) | (_, Err(e)) => return fail(e),
    };

    let store = match open_store(&adapter) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return fail(BreadthscanError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            });
        }
        Err(e) => return fail(e),
    };

    print_aggregate_series(&*store, &scan_config, metric, start_date, end_date)
}

pub fn print_aggregate_series(
    store: &dyn StorePort,
    scan_config: &ScanConfig,
    metric: Option<&str>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> ExitCode {
    let set_hash = &scan_config.universe.set_hash;
    let records = match store.fetch_aggregate_series(
        set_hash,
        &scan_config.interval,
        metric,
        start_date,
        end_date,
    ) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    if records.is_empty() {
        eprintln!(
            "No stored aggregates for set {} between {} and {}",
            set_hash, start_date, end_date
        );
        return ExitCode::SUCCESS;
    }

    for record in &records {
        let value = record
            .value
            .map(|v| v.to_string())
            .unwrap_or_default();
        println!(
            "{},{},{},{},{}",
            record.as_of_date, record.metric_key, value, record.valid_count, record.missing_count
        );
    }
    eprintln!("{} records for set {}", records.len(), set_hash);
    ExitCode::SUCCESS
}

fn run_list_tickers(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data_port = match open_data_port(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let listing = match ticker_ranges(&*data_port) {
        Ok(l) => l,
        Err(e) => return fail(e),
    };

    if listing.is_empty() {
        eprintln!("No tickers found");
        return ExitCode::SUCCESS;
    }
    for (ticker, range) in &listing {
        match range {
            Some((first, last, rows)) => println!("{},{},{},{}", ticker, first, last, rows),
            None => println!("{},,,0", ticker),
        }
    }
    eprintln!("{} tickers found", listing.len());
    ExitCode::SUCCESS
}

/// Every available ticker with its first date, last date and row count.
pub fn ticker_ranges(
    data_port: &dyn DataPort,
) -> Result<Vec<(String, Option<(NaiveDate, NaiveDate, usize)>)>, BreadthscanError> {
    data_port
        .list_tickers()?
        .into_iter()
        .map(|ticker| {
            let range = data_port.get_data_range(&ticker)?;
            Ok((ticker, range))
        })
        .collect()
}

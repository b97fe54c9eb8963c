//! Civiscan main entry point
//!
//! This is the command-line interface for the Civiscan URL validation scanner.

use civiscan::batch::{run_batch, BatchCoordinator, BatchOptions};
use civiscan::config::{load_settings, validate_settings, Settings};
use civiscan::scanner::Scanner;
use civiscan::{country, storage::CountryStatus};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Civiscan: a government website URL validation scanner
///
/// Civiscan re-validates government website URLs grouped by country, records
/// reachability and redirect outcomes, and prunes URLs whose recorded
/// failure count reaches two. Countries are processed in resumable batch cycles
/// bounded by a wall-clock budget.
#[derive(Parser, Debug)]
#[command(name = "civiscan")]
#[command(version = "1.0.0")]
#[command(about = "Government website URL validation scanner", long_about = None)]
struct Cli {
    /// Scan a single country by code (e.g. ICELAND)
    #[arg(long, value_name = "CODE", conflicts_with_all = ["all", "batch_mode", "progress"])]
    country: Option<String>,

    /// Scan every country dataset sequentially
    #[arg(long, conflicts_with_all = ["country", "batch_mode", "progress"])]
    all: bool,

    /// Run one budgeted slice of the active batch cycle
    #[arg(long, conflicts_with_all = ["country", "all", "progress"])]
    batch_mode: bool,

    /// Show progress of the active batch cycle and exit
    #[arg(long, conflicts_with_all = ["country", "all", "batch_mode"])]
    progress: bool,

    /// Directory holding per-country dataset files
    #[arg(long, value_name = "DIR", default_value = "data/countries")]
    dataset_dir: PathBuf,

    /// Countries claimed per batch run
    #[arg(long, value_name = "N", default_value_t = 5)]
    batch_size: usize,

    /// Requests per second, overriding the configured rate limit
    #[arg(long, value_name = "RATE")]
    rate_limit: Option<f64>,

    /// Attach an existing tracking issue to the batch cycle
    #[arg(long, value_name = "ISSUE", conflicts_with = "create_issue")]
    tracking_issue: Option<i64>,

    /// Open a tracking issue for the batch cycle if it has none
    #[arg(long, conflicts_with = "tracking_issue")]
    create_issue: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load settings: {}", e);
            return Err(e.into());
        }
    };
    validate_settings(&settings)?;

    // Handle different modes
    if let Some(country_code) = &cli.country {
        handle_scan_country(&settings, &cli, country_code).await?;
    } else if cli.all {
        handle_scan_all(&settings, &cli).await?;
    } else if cli.progress {
        handle_progress(&settings, &cli)?;
    } else if cli.batch_mode {
        handle_batch(&settings, &cli).await?;
    } else {
        eprintln!("Nothing to do: pass --country, --all, --batch-mode, or --progress");
        std::process::exit(2);
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("civiscan=info,warn"),
            1 => EnvFilter::new("civiscan=debug,info"),
            2 => EnvFilter::new("civiscan=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --country: scans one country dataset
async fn handle_scan_country(
    settings: &Settings,
    cli: &Cli,
    country_code: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let country_code = country_code.to_uppercase();
    let rate = cli.rate_limit.unwrap_or(settings.crawl_rate_limit_per_host);
    let path = country::dataset_path(&cli.dataset_dir, &country_code);

    let mut scanner = Scanner::new(settings)?;
    let stats = scanner.scan_country(&country_code, &path, rate).await?;

    println!("Scan {} finished", stats.scan_id);
    println!("  URLs in dataset:  {}", stats.total_urls);
    println!("  Validated:        {}", stats.urls_validated);
    println!("  Skipped:          {}", stats.urls_skipped);
    println!("  Valid:            {}", stats.valid_urls);
    println!("  Invalid:          {}", stats.invalid_urls);
    println!("  Redirected:       {}", stats.redirected_urls);
    println!("  Removed:          {}", stats.urls_removed);
    println!("  Output:           {}", stats.output_path.display());

    Ok(())
}

/// Handles --all: scans every country dataset in the directory
async fn handle_scan_all(settings: &Settings, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let rate = cli.rate_limit.unwrap_or(settings.crawl_rate_limit_per_host);

    let mut scanner = Scanner::new(settings)?;
    let outcomes = scanner.scan_all_countries(&cli.dataset_dir, rate).await?;

    let mut failures = 0;
    for (country_code, outcome) in &outcomes {
        match outcome {
            Ok(stats) => println!(
                "{}: {} validated, {} removed -> {}",
                country_code,
                stats.urls_validated,
                stats.urls_removed,
                stats.output_path.display()
            ),
            Err(e) => {
                failures += 1;
                println!("{}: FAILED ({})", country_code, e);
            }
        }
    }

    println!(
        "\n{} countries scanned, {} failed",
        outcomes.len(),
        failures
    );
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Handles --progress: prints the active cycle's state
fn handle_progress(settings: &Settings, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = BatchCoordinator::new(&settings.metadata_db_url, &cli.dataset_dir)?;

    let cycle_id = match coordinator.active_cycle()? {
        Some(cycle_id) => cycle_id,
        None => {
            println!("No active validation cycle");
            return Ok(());
        }
    };

    let progress = coordinator.progress(&cycle_id)?;
    println!("Cycle {}", progress.cycle_id);
    if let Some(issue) = progress.tracking_issue {
        println!("Tracking issue: #{}", issue);
    }
    println!(
        "  {} total: {} completed, {} failed, {} processing, {} pending\n",
        progress.total, progress.completed, progress.failed, progress.processing, progress.pending
    );

    for state in coordinator.details(&cycle_id)? {
        let marker = match state.status {
            CountryStatus::Completed => "done",
            CountryStatus::Failed => "FAIL",
            CountryStatus::Processing => "....",
            CountryStatus::Pending => "    ",
        };
        match &state.error_message {
            Some(message) => println!("  [{}] {} ({})", marker, state.country_code, message),
            None => println!("  [{}] {}", marker, state.country_code),
        }
    }

    Ok(())
}

/// Handles --batch-mode: runs one budgeted batch slice
async fn handle_batch(settings: &Settings, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = BatchOptions::new(&cli.dataset_dir);
    options.batch_size = cli.batch_size;
    options.rate_limit_per_second = cli.rate_limit;
    options.tracking_issue = cli.tracking_issue;
    options.create_issue = cli.create_issue;

    let outcome = run_batch(settings, &options).await?;

    if outcome.stopped_early {
        tracing::info!(
            "Stopped on budget; cycle {} has {} countries pending",
            outcome.cycle_id,
            outcome.progress.pending
        );
    } else if outcome.progress.is_complete() {
        tracing::info!("Cycle {} is complete", outcome.cycle_id);
    }

    Ok(())
}

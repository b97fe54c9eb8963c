//! Budgeted batch runs

use crate::batch::BatchCoordinator;
use crate::config::Settings;
use crate::country;
use crate::scanner::Scanner;
use crate::storage::CycleProgress;
use crate::tracker::{GithubTracker, TicketingClient};
use crate::Result;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Default number of countries claimed per run
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default wall-clock budget for one run
pub const DEFAULT_MAX_RUNTIME: Duration = Duration::from_secs(100 * 60);

/// Minimum time that must remain before starting another country
pub const STOP_THRESHOLD: Duration = Duration::from_secs(300);

/// Options for a single batch run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dataset_dir: PathBuf,
    pub batch_size: usize,
    /// Overrides the configured per-host rate limit when set
    pub rate_limit_per_second: Option<f64>,
    /// Pre-existing tracking issue to attach to the cycle
    pub tracking_issue: Option<i64>,
    /// Open a tracking issue when the cycle has none
    pub create_issue: bool,
    pub max_runtime: Duration,
}

impl BatchOptions {
    pub fn new(dataset_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            rate_limit_per_second: None,
            tracking_issue: None,
            create_issue: false,
            max_runtime: DEFAULT_MAX_RUNTIME,
        }
    }
}

/// Outcome of one batch run
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub cycle_id: String,
    /// True when the run stopped on its wall-clock budget with work remaining
    pub stopped_early: bool,
    pub progress: CycleProgress,
}

/// Runs one budgeted slice of the active validation cycle
///
/// Claims pending countries in batches and scans each in turn. Before each
/// country the remaining budget is checked; once less than [`STOP_THRESHOLD`]
/// remains, unscanned claims are returned to the pending queue and the run
/// stops cleanly. Per-country failures are recorded in the cycle state and do
/// not abort the run.
pub async fn run_batch(settings: &Settings, options: &BatchOptions) -> Result<BatchOutcome> {
    let started = Instant::now();
    let deadline = started + options.max_runtime;
    let rate = options
        .rate_limit_per_second
        .unwrap_or(settings.crawl_rate_limit_per_host);

    let mut coordinator = BatchCoordinator::new(&settings.metadata_db_url, &options.dataset_dir)?;
    let cycle_id = coordinator.get_or_create_cycle(options.tracking_issue)?;

    let tracker = GithubTracker::new();
    let mut issue = coordinator.progress(&cycle_id)?.tracking_issue;
    if issue.is_none() && options.create_issue {
        let total = coordinator.progress(&cycle_id)?.total;
        if let Some(created) = tracker.create_cycle_issue(&cycle_id, total) {
            coordinator.attach_tracking_issue(&cycle_id, created)?;
            issue = Some(created);
        }
    }

    let mut scanner = Scanner::new(settings)?;
    let mut stopped_early = false;

    'runs: loop {
        if remaining(deadline) < STOP_THRESHOLD {
            stopped_early = !coordinator.progress(&cycle_id)?.is_complete();
            break;
        }

        let batch = coordinator.claim_batch(&cycle_id, options.batch_size)?;
        if batch.is_empty() {
            break;
        }
        tracing::info!("Claimed batch of {}: {:?}", batch.len(), batch);

        for (idx, country_code) in batch.iter().enumerate() {
            if remaining(deadline) < STOP_THRESHOLD {
                tracing::info!(
                    "Budget nearly exhausted, returning {} countries to the queue",
                    batch.len() - idx
                );
                for unprocessed in &batch[idx..] {
                    coordinator.release_country(&cycle_id, unprocessed)?;
                }
                stopped_early = true;
                break 'runs;
            }

            let path = country::dataset_path(&options.dataset_dir, country_code);
            if !path.exists() {
                tracing::warn!("No dataset for {}, marking failed", country_code);
                coordinator.fail_country(&cycle_id, country_code, "dataset file not found")?;
                continue;
            }

            match scanner.scan_country(country_code, &path, rate).await {
                Ok(stats) => {
                    tracing::info!(
                        "{}: {} validated, {} removed",
                        country_code,
                        stats.urls_validated,
                        stats.urls_removed
                    );
                    coordinator.complete_country(&cycle_id, country_code)?;
                }
                Err(e) => {
                    tracing::error!("Scan failed for {}: {}", country_code, e);
                    coordinator.fail_country(&cycle_id, country_code, &e.to_string())?;
                }
            }
        }

        if let Some(issue) = issue {
            tracker.update_progress(issue, &coordinator.progress(&cycle_id)?);
        }
    }

    let progress = coordinator.progress(&cycle_id)?;
    if progress.is_complete() {
        tracing::info!(
            "Cycle {} complete: {} completed, {} failed",
            cycle_id,
            progress.completed,
            progress.failed
        );
        if let Some(issue) = issue {
            tracker.close_cycle_issue(issue, &progress);
        }
    } else {
        tracing::info!(
            "Run finished after {:?}: {} pending, {} completed",
            started.elapsed(),
            progress.pending,
            progress.completed
        );
    }

    Ok(BatchOutcome {
        cycle_id,
        stopped_early,
        progress,
    })
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

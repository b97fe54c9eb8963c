//! Cycle tracking issues
//!
//! Batch cycles can mirror their progress into a GitHub issue so operators
//! can watch long-running validation from the issue tracker. The integration
//! shells out to the `gh` CLI; when `gh` is missing or unauthenticated the
//! tracker degrades to doing nothing rather than failing the cycle.

use crate::storage::CycleProgress;
use std::process::Command;

/// Label applied to cycle tracking issues
pub const ISSUE_LABEL: &str = "url-validation";

/// Posts cycle progress to an external issue tracker
pub trait TicketingClient {
    /// Opens a tracking issue for a cycle, returning its number
    fn create_cycle_issue(&self, cycle_id: &str, total_countries: u64) -> Option<i64>;

    /// Finds an already-open tracking issue for a cycle, if any
    fn find_open_cycle_issue(&self, cycle_id: &str) -> Option<i64>;

    /// Posts a progress update comment to an open tracking issue
    fn update_progress(&self, issue: i64, progress: &CycleProgress);

    /// Posts a final summary and closes the tracking issue
    fn close_cycle_issue(&self, issue: i64, progress: &CycleProgress);
}

/// Tracker backed by the `gh` CLI
pub struct GithubTracker;

impl GithubTracker {
    pub fn new() -> Self {
        Self
    }

    fn run_gh(args: &[&str]) -> Option<String> {
        let output = match Command::new("gh").args(args).output() {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("gh CLI unavailable, skipping issue tracking: {}", e);
                return None;
            }
        };

        if !output.status.success() {
            tracing::warn!(
                "gh {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for GithubTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketingClient for GithubTracker {
    fn create_cycle_issue(&self, cycle_id: &str, total_countries: u64) -> Option<i64> {
        let title = format!("URL validation cycle {}", cycle_id);
        let body = format!(
            "Validation cycle `{}` covering {} countries.\n\n\
             Progress updates are posted below as batches complete.",
            cycle_id, total_countries
        );

        let url = Self::run_gh(&[
            "issue", "create", "--title", &title, "--body", &body, "--label", ISSUE_LABEL,
        ])?;

        // `gh issue create` prints the issue URL; the number is the last path
        // segment.
        let issue = url.rsplit('/').next()?.parse::<i64>().ok()?;
        tracing::info!("Opened tracking issue #{} for cycle {}", issue, cycle_id);
        Some(issue)
    }

    fn find_open_cycle_issue(&self, cycle_id: &str) -> Option<i64> {
        let title = format!("URL validation cycle {}", cycle_id);
        let listed = Self::run_gh(&[
            "issue",
            "list",
            "--state",
            "open",
            "--label",
            ISSUE_LABEL,
            "--search",
            &title,
            "--json",
            "number",
            "--jq",
            ".[0].number",
        ])?;
        listed.parse::<i64>().ok()
    }

    fn update_progress(&self, issue: i64, progress: &CycleProgress) {
        let body = render_progress(progress);
        let issue_arg = issue.to_string();
        Self::run_gh(&["issue", "comment", &issue_arg, "--body", &body]);
    }

    fn close_cycle_issue(&self, issue: i64, progress: &CycleProgress) {
        let body = format!("Cycle complete.\n\n{}", render_progress(progress));
        let issue_arg = issue.to_string();
        Self::run_gh(&["issue", "close", &issue_arg, "--comment", &body]);
        tracing::info!("Closed tracking issue #{}", issue);
    }
}

/// Renders cycle progress as an issue comment body
fn render_progress(progress: &CycleProgress) -> String {
    let done = progress.completed + progress.failed;
    let percent = if progress.total > 0 {
        done * 100 / progress.total
    } else {
        100
    };

    format!(
        "**Cycle `{}`**\n\n\
         `{}` {}% processed\n\n\
         | Completed | Failed | Processing | Pending |\n\
         |---|---|---|---|\n\
         | {} | {} | {} | {} |",
        progress.cycle_id,
        progress_bar(percent),
        percent,
        progress.completed,
        progress.failed,
        progress.processing,
        progress.pending
    )
}

/// Renders a fixed-width text progress bar for a 0..=100 percentage
fn progress_bar(percent: u64) -> String {
    const WIDTH: u64 = 20;
    let filled = (percent.min(100) * WIDTH) / 100;
    let mut bar = String::with_capacity(WIDTH as usize);
    for i in 0..WIDTH {
        bar.push(if i < filled { '█' } else { '░' });
    }
    bar
}

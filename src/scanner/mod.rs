//! Per-country URL validation scans
//!
//! A scan loads a country's dataset, checks every page URL against the store's
//! failure history, validates the remainder over HTTP, persists one record per
//! URL, and rewrites the dataset with outcomes stamped and twice-failed URLs
//! pruned. The input dataset file is never modified.

use crate::config::Settings;
use crate::country;
use crate::dataset::{validated_output_path, Dataset};
use crate::storage::{open_storage, SqliteStorage, Storage, ValidationRecord};
use crate::validator::{ValidationResult, Validator};
use crate::Result;
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Recorded failure count at which a URL is skipped and pruned
pub const FAILURE_THRESHOLD: u32 = 2;

/// Summary of a completed country scan
#[derive(Debug, Clone)]
pub struct ScanStats {
    pub scan_id: String,
    pub country_code: String,
    pub total_urls: usize,
    pub urls_validated: usize,
    pub urls_skipped: usize,
    pub valid_urls: usize,
    pub invalid_urls: usize,
    pub redirected_urls: usize,
    pub urls_removed: usize,
    pub output_path: PathBuf,
}

/// Runs validation scans over country datasets
pub struct Scanner {
    validator: Validator,
    storage: SqliteStorage,
}

impl Scanner {
    /// Creates a scanner from settings, opening the metadata store
    pub fn new(settings: &Settings) -> Result<Self> {
        let validator = Validator::new(settings.crawl_timeout_seconds)?;
        let storage = open_storage(&settings.metadata_db_url)?;
        Ok(Self { validator, storage })
    }

    /// Scans a single country dataset
    ///
    /// URLs whose maximum recorded failure count is at or above
    /// [`FAILURE_THRESHOLD`]
    /// are skipped and pruned without a request. Every validated URL gets one
    /// persisted record under a fresh scan id; the rewritten dataset lands
    /// beside the input with a `_validated` stem suffix.
    pub async fn scan_country(
        &mut self,
        country_code: &str,
        dataset_path: &Path,
        rate_limit_per_second: f64,
    ) -> Result<ScanStats> {
        let scan_id = new_scan_id(country_code);
        tracing::info!("Starting scan {} for {}", scan_id, country_code);

        let dataset = Dataset::load(dataset_path)?;
        let all_urls = dataset.page_urls();
        let total_urls = all_urls.len();

        let previous_failures = self.storage.get_previous_failures(country_code)?;

        let mut to_validate: Vec<String> = Vec::new();
        let mut skipped: HashSet<String> = HashSet::new();
        for url in &all_urls {
            let prior = previous_failures.get(url).copied().unwrap_or(0);
            if prior >= FAILURE_THRESHOLD {
                tracing::info!("Skipping {} (failure count {})", url, prior);
                skipped.insert(url.clone());
            } else {
                to_validate.push(url.clone());
            }
        }

        let results = self
            .validator
            .validate_batch(&to_validate, rate_limit_per_second)
            .await;

        let mut urls_to_remove = skipped.clone();
        let mut valid_urls = 0;
        let mut invalid_urls = 0;
        let mut redirected_urls = 0;

        // One record per distinct URL; the dataset may list the same URL
        // under more than one domain.
        let mut persisted: HashSet<&str> = HashSet::new();
        for url in &to_validate {
            if !persisted.insert(url) {
                continue;
            }
            let result = match results.get(url) {
                Some(result) => result,
                None => continue,
            };

            let failure_count = if result.is_valid {
                0
            } else {
                previous_failures.get(url).copied().unwrap_or(0) + 1
            };

            if result.is_valid {
                valid_urls += 1;
            } else {
                invalid_urls += 1;
            }
            if result.redirected_to.is_some() {
                redirected_urls += 1;
            }

            if failure_count >= FAILURE_THRESHOLD {
                tracing::info!(
                    "Pruning {} at failure count {}",
                    url,
                    failure_count
                );
                urls_to_remove.insert(url.clone());
            }

            self.storage.insert_validation_record(&make_record(
                country_code,
                &scan_id,
                result,
                failure_count,
            ))?;
        }

        let urls_removed = urls_to_remove.len();
        let updated = dataset.apply_validation(&results, &urls_to_remove);
        let output_path = validated_output_path(dataset_path);
        updated.save(&output_path)?;

        let stats = ScanStats {
            scan_id,
            country_code: country_code.to_string(),
            total_urls,
            urls_validated: to_validate.len(),
            urls_skipped: skipped.len(),
            valid_urls,
            invalid_urls,
            redirected_urls,
            urls_removed,
            output_path,
        };

        tracing::info!(
            "Scan {} done: {} validated, {} skipped, {} valid, {} invalid, {} removed",
            stats.scan_id,
            stats.urls_validated,
            stats.urls_skipped,
            stats.valid_urls,
            stats.invalid_urls,
            stats.urls_removed
        );

        Ok(stats)
    }

    /// Scans every country dataset found in a directory
    ///
    /// Countries are processed in sorted order. A failure in one country is
    /// reported in its outcome and does not stop the others.
    pub async fn scan_all_countries(
        &mut self,
        dataset_dir: &Path,
        rate_limit_per_second: f64,
    ) -> Result<Vec<(String, Result<ScanStats>)>> {
        let countries = country::known_countries(dataset_dir)?;
        tracing::info!("Scanning {} countries from {:?}", countries.len(), dataset_dir);

        let mut outcomes = Vec::new();
        for country_code in countries {
            let path = country::dataset_path(dataset_dir, &country_code);
            let outcome = self
                .scan_country(&country_code, &path, rate_limit_per_second)
                .await;
            if let Err(e) = &outcome {
                tracing::error!("Scan failed for {}: {}", country_code, e);
            }
            outcomes.push((country_code, outcome));
        }

        Ok(outcomes)
    }
}

/// Generates a unique scan id: `{COUNTRY}-{timestamp}-{8 hex chars}`
fn new_scan_id(country_code: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-{}-{:08x}", country_code, timestamp, suffix)
}

fn make_record(
    country_code: &str,
    scan_id: &str,
    result: &ValidationResult,
    failure_count: u32,
) -> ValidationRecord {
    let redirect_chain = if result.redirect_chain.is_empty() {
        None
    } else {
        serde_json::to_string(&result.redirect_chain).ok()
    };

    ValidationRecord {
        url: result.url.clone(),
        country_code: country_code.to_string(),
        scan_id: scan_id.to_string(),
        status_code: result.status_code,
        error_message: result.error_message.clone(),
        redirected_to: result.redirected_to.clone(),
        redirect_chain,
        is_valid: result.is_valid,
        failure_count,
        validated_at: Some(result.validated_at.clone()),
    }
}

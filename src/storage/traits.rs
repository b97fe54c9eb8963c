//! Storage traits and error types

use crate::storage::{ActiveCycle, CountryCycleState, CycleProgress, ValidationRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for the durable metadata store
///
/// Two logical tables live behind this trait: per-URL validation records
/// (owned by the scanner) and per-country batch cycle state (owned by the
/// batch coordinator). Neither component holds cross-run state in memory;
/// everything durable goes through here.
pub trait Storage {
    // ===== Validation Records =====

    /// Inserts one validation record, keyed by `(url, scan_id)`
    fn insert_validation_record(&mut self, record: &ValidationRecord) -> StorageResult<()>;

    /// Returns the maximum recorded failure count per URL across all previous
    /// scans of a country
    fn get_previous_failures(&self, country_code: &str) -> StorageResult<HashMap<String, u32>>;

    /// Returns all records persisted under a scan id
    fn get_scan_records(&self, scan_id: &str) -> StorageResult<Vec<ValidationRecord>>;

    // ===== Batch Cycle State =====

    /// Finds the most recent cycle that still has pending or processing
    /// countries
    fn find_active_cycle(&self) -> StorageResult<Option<ActiveCycle>>;

    /// Seeds a cycle with every given country as pending
    ///
    /// Re-seeding an existing `(cycle_id, country)` row resets it to pending.
    fn create_cycle(
        &mut self,
        cycle_id: &str,
        countries: &[String],
        tracking_issue: Option<i64>,
    ) -> StorageResult<()>;

    /// Attaches a tracking issue to every row of a cycle
    fn attach_tracking_issue(&mut self, cycle_id: &str, issue: i64) -> StorageResult<()>;

    /// Returns up to `limit` pending countries of a cycle, ordered by code
    fn get_pending_countries(&self, cycle_id: &str, limit: usize) -> StorageResult<Vec<String>>;

    /// Marks countries as currently being processed
    fn mark_processing(&mut self, cycle_id: &str, country_codes: &[String]) -> StorageResult<()>;

    /// Marks countries as successfully completed
    fn mark_completed(&mut self, cycle_id: &str, country_codes: &[String]) -> StorageResult<()>;

    /// Marks a country as failed with an error message
    fn mark_failed(
        &mut self,
        cycle_id: &str,
        country_code: &str,
        error_message: &str,
    ) -> StorageResult<()>;

    /// Returns a claimed country to the pending queue (timeout preemption)
    fn mark_pending(&mut self, cycle_id: &str, country_code: &str) -> StorageResult<()>;

    /// Returns aggregate progress counts for a cycle
    fn get_cycle_progress(&self, cycle_id: &str) -> StorageResult<CycleProgress>;

    /// Returns per-country state for a cycle, actionable items first
    ///
    /// Ordered by status priority (processing, pending, failed, completed),
    /// then by country code.
    fn get_cycle_details(&self, cycle_id: &str) -> StorageResult<Vec<CountryCycleState>>;
}

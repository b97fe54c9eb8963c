//! Storage module for the durable metadata store
//!
//! This module handles all database operations, including:
//! - SQLite initialization and idempotent schema creation
//! - Per-URL validation records with failure-count tracking
//! - Batch cycle state for resumable country processing

mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::Result;
use std::path::PathBuf;

/// Resolves a store-location string to a filesystem path
///
/// Accepts either a plain path or the `sqlite:///` URL convention.
pub fn resolve_db_path(db_url: &str) -> PathBuf {
    match db_url.strip_prefix("sqlite:///") {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(db_url),
    }
}

/// Opens (creating if necessary) the metadata store at a location string
///
/// Parent directories are created and the schema is initialized before the
/// handle is returned. Store errors here are fatal: persistence is mandatory
/// for failure-count correctness.
pub fn open_storage(db_url: &str) -> Result<SqliteStorage> {
    let db_path = resolve_db_path(db_url);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(SqliteStorage::new(&db_path)?)
}

/// One persisted validation outcome, keyed by `(url, scan_id)`
#[derive(Debug, Clone)]
pub struct ValidationRecord {
    pub url: String,
    pub country_code: String,
    pub scan_id: String,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub redirected_to: Option<String>,
    /// JSON-encoded list of redirect hops, None when there were none
    pub redirect_chain: Option<String>,
    pub is_valid: bool,
    /// Prior maximum failure count plus one when invalid; 0 when valid
    pub failure_count: u32,
    pub validated_at: Option<String>,
}

/// Status of a country within a batch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CountryStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true once no further transitions can leave this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-country state within a cycle
#[derive(Debug, Clone)]
pub struct CountryCycleState {
    pub cycle_id: String,
    pub country_code: String,
    pub status: CountryStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub tracking_issue: Option<i64>,
    pub error_message: Option<String>,
}

/// Aggregate progress of a cycle
#[derive(Debug, Clone)]
pub struct CycleProgress {
    pub cycle_id: String,
    pub total: u64,
    pub completed: u64,
    pub processing: u64,
    pub pending: u64,
    pub failed: u64,
    pub tracking_issue: Option<i64>,
}

impl CycleProgress {
    /// A cycle is complete when nothing is pending or processing; failed
    /// countries are terminal and do not block completion.
    pub fn is_complete(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

/// An active cycle found in the store
#[derive(Debug, Clone)]
pub struct ActiveCycle {
    pub cycle_id: String,
    pub tracking_issue: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_status_roundtrip() {
        for status in &[
            CountryStatus::Pending,
            CountryStatus::Processing,
            CountryStatus::Completed,
            CountryStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            assert_eq!(CountryStatus::from_db_string(db_str), Some(*status));
        }
    }

    #[test]
    fn test_country_status_invalid() {
        assert_eq!(CountryStatus::from_db_string("paused"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(CountryStatus::Completed.is_terminal());
        assert!(CountryStatus::Failed.is_terminal());
        assert!(!CountryStatus::Pending.is_terminal());
        assert!(!CountryStatus::Processing.is_terminal());
    }

    #[test]
    fn test_resolve_db_path_url() {
        assert_eq!(
            resolve_db_path("sqlite:///data/metadata.db"),
            PathBuf::from("data/metadata.db")
        );
    }

    #[test]
    fn test_resolve_db_path_plain() {
        assert_eq!(
            resolve_db_path("/tmp/metadata.db"),
            PathBuf::from("/tmp/metadata.db")
        );
    }

    #[test]
    fn test_progress_complete_ignores_failures() {
        let progress = CycleProgress {
            cycle_id: "20260101-000000".to_string(),
            total: 4,
            completed: 3,
            processing: 0,
            pending: 0,
            failed: 1,
            tracking_issue: None,
        };
        assert!(progress.is_complete());
    }

    #[test]
    fn test_progress_incomplete_while_processing() {
        let progress = CycleProgress {
            cycle_id: "20260101-000000".to_string(),
            total: 4,
            completed: 3,
            processing: 1,
            pending: 0,
            failed: 0,
            tracking_issue: None,
        };
        assert!(!progress.is_complete());
    }
}

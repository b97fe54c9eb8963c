//! Civiscan: a government website URL validation scanner
//!
//! This crate periodically re-validates lists of government website URLs grouped
//! by country, records reachability and redirect outcomes in SQLite, and prunes
//! URLs whose recorded failure count reaches two. Work is coordinated
//! across countries in resumable batches bounded by a wall-clock budget.

pub mod batch;
pub mod config;
pub mod country;
pub mod dataset;
pub mod scanner;
pub mod storage;
pub mod tracker;
pub mod validator;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Civiscan operations
#[derive(Debug, Error)]
pub enum CiviscanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Dataset file not found: {path}")]
    DatasetNotFound { path: PathBuf },

    #[error("Failed to parse dataset {path}: {source}")]
    DatasetParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write dataset {path}: {source}")]
    DatasetWrite {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a float, got: {value}")]
    InvalidFloat { name: String, value: String },

    #[error("{name} must be an integer, got: {value}")]
    InvalidInt { name: String, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Civiscan operations
pub type Result<T> = std::result::Result<T, CiviscanError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use batch::{BatchCoordinator, BatchOptions, BatchOutcome};
pub use config::Settings;
pub use scanner::{ScanStats, Scanner};
pub use storage::{CountryStatus, CycleProgress};
pub use validator::{ValidationResult, Validator};

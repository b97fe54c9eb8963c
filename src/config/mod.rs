//! Runtime settings loaded from the environment
//!
//! Settings control the HTTP timeout, the per-host rate limit, and the location
//! of the metadata database. Invalid values fail fast with a [`ConfigError`]
//! before any scan begins.

use crate::{ConfigError, ConfigResult};

/// Environment variable for the HTTP request timeout in seconds
pub const ENV_CRAWL_TIMEOUT_SECONDS: &str = "CRAWL_TIMEOUT_SECONDS";

/// Environment variable for the per-host request rate limit
pub const ENV_CRAWL_RATE_LIMIT_PER_HOST: &str = "CRAWL_RATE_LIMIT_PER_HOST";

/// Environment variable for the metadata database location
pub const ENV_METADATA_DB_URL: &str = "METADATA_DB_URL";

/// Runtime settings for the scanner
#[derive(Debug, Clone)]
pub struct Settings {
    /// Overall timeout for a single URL validation request (seconds)
    pub crawl_timeout_seconds: u64,

    /// Maximum requests per second against any single host
    pub crawl_rate_limit_per_host: f64,

    /// Location of the metadata database, either a plain path or a
    /// `sqlite:///` URL
    pub metadata_db_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            crawl_timeout_seconds: 20,
            crawl_rate_limit_per_host: 0.5,
            metadata_db_url: "sqlite:///data/metadata.db".to_string(),
        }
    }
}

/// Loads settings from the environment with validation
///
/// Unset or empty variables fall back to defaults. Values that fail to parse,
/// or that fail validation (non-positive timeout or rate limit, empty database
/// URL), abort with a [`ConfigError`].
pub fn load_settings() -> ConfigResult<Settings> {
    let defaults = Settings::default();

    let settings = Settings {
        crawl_timeout_seconds: parse_int(
            ENV_CRAWL_TIMEOUT_SECONDS,
            env_value(ENV_CRAWL_TIMEOUT_SECONDS).as_deref(),
            defaults.crawl_timeout_seconds,
        )?,
        crawl_rate_limit_per_host: parse_float(
            ENV_CRAWL_RATE_LIMIT_PER_HOST,
            env_value(ENV_CRAWL_RATE_LIMIT_PER_HOST).as_deref(),
            defaults.crawl_rate_limit_per_host,
        )?,
        metadata_db_url: env_value(ENV_METADATA_DB_URL).unwrap_or(defaults.metadata_db_url),
    };

    validate_settings(&settings)?;

    Ok(settings)
}

/// Validates settings invariants shared by every loading path
pub fn validate_settings(settings: &Settings) -> ConfigResult<()> {
    if settings.crawl_rate_limit_per_host <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be > 0",
            ENV_CRAWL_RATE_LIMIT_PER_HOST
        )));
    }
    if settings.crawl_timeout_seconds == 0 {
        return Err(ConfigError::Validation(format!(
            "{} must be > 0",
            ENV_CRAWL_TIMEOUT_SECONDS
        )));
    }
    if settings.metadata_db_url.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{} is required",
            ENV_METADATA_DB_URL
        )));
    }
    Ok(())
}

/// Reads an environment variable, treating empty strings as unset
fn env_value(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn parse_float(name: &str, value: Option<&str>, default: f64) -> ConfigResult<f64> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<f64>().map_err(|_| ConfigError::InvalidFloat {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn parse_int(name: &str, value: Option<&str>, default: u64) -> ConfigResult<u64> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidInt {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}

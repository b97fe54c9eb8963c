//! Country code and dataset filename conventions
//!
//! Country datasets live on disk as lowercase hyphenated filenames
//! (`united-kingdom-uk.json`), while the store and the CLI use uppercase
//! underscored codes (`UNITED_KINGDOM_UK`). The two conversions are exact
//! inverses of each other for well-formed inputs.

use crate::dataset::VALIDATED_SUFFIX;
use crate::Result;
use std::path::{Path, PathBuf};

/// File extension for country dataset files
pub const DATASET_EXTENSION: &str = "json";

/// Converts a country code to its dataset filename stem
///
/// Example: `"UNITED_KINGDOM_UK"` -> `"united-kingdom-uk"`
pub fn code_to_filename(country_code: &str) -> String {
    country_code.to_lowercase().replace('_', "-")
}

/// Converts a dataset filename stem to its country code
///
/// Example: `"united-kingdom-uk"` -> `"UNITED_KINGDOM_UK"`
pub fn filename_to_code(filename: &str) -> String {
    filename.to_uppercase().replace('-', "_")
}

/// Returns the dataset file path for a country inside a dataset directory
pub fn dataset_path(dataset_dir: &Path, country_code: &str) -> PathBuf {
    dataset_dir.join(format!(
        "{}.{}",
        code_to_filename(country_code),
        DATASET_EXTENSION
    ))
}

/// Enumerates the known country codes from dataset files in a directory
///
/// Returns codes sorted lexicographically. A missing directory yields an
/// empty list rather than an error, so a fresh checkout can still create
/// a (trivially complete) cycle.
pub fn known_countries(dataset_dir: &Path) -> Result<Vec<String>> {
    let mut countries = Vec::new();

    if !dataset_dir.exists() {
        return Ok(countries);
    }

    for entry in std::fs::read_dir(dataset_dir)? {
        let path = entry?.path();
        let is_dataset = path
            .extension()
            .map(|ext| ext == DATASET_EXTENSION)
            .unwrap_or(false);
        if !is_dataset {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            // Rewritten outputs live beside their inputs and are not
            // countries themselves.
            if stem.ends_with(VALIDATED_SUFFIX) {
                continue;
            }
            countries.push(filename_to_code(stem));
        }
    }

    countries.sort();
    Ok(countries)
}

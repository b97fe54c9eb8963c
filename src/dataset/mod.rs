//! Country dataset documents
//!
//! A dataset is a structured JSON document of domains and their pages. The
//! scanner reads page URLs from it, then rewrites it with validation metadata
//! and with twice-failed URLs pruned. Unknown fields in the document are
//! preserved verbatim across the rewrite.

use crate::validator::ValidationResult;
use crate::{CiviscanError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Suffix appended to the input file stem for the rewritten output
pub const VALIDATED_SUFFIX: &str = "_validated";

/// Validation outcome stamped onto a surviving page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

/// A single page entry within a domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<ValidationStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirected_to: Option<String>,

    /// Original URL kept when a redirect rewrote `url` to its target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,

    /// Pre-existing fields carried through unchanged
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Page {
    /// Creates a bare page entry with only a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            validation_status: None,
            status_code: None,
            error_message: None,
            redirected_to: None,
            original_url: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// A domain entry holding a list of pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEntry {
    pub canonical_domain: String,

    #[serde(default)]
    pub pages: Vec<Page>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A country dataset document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub domain_count: usize,

    #[serde(default)]
    pub page_count: usize,

    #[serde(default)]
    pub domains: Vec<DomainEntry>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Dataset {
    /// Loads a dataset from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CiviscanError::DatasetNotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|source| CiviscanError::DatasetParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the dataset to a JSON file with pretty formatting
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).map_err(|source| CiviscanError::DatasetWrite {
                path: path.to_path_buf(),
                source,
            })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Extracts all page URLs in document order
    ///
    /// Duplicates are kept; each page entry is validated independently even
    /// when the same URL appears more than once.
    pub fn page_urls(&self) -> Vec<String> {
        self.domains
            .iter()
            .flat_map(|domain| domain.pages.iter())
            .map(|page| page.url.clone())
            .collect()
    }

    /// Rewrites the dataset with validation outcomes and pruned URLs
    ///
    /// Pages whose URL is in `urls_to_remove` are dropped. Surviving pages
    /// with a validation outcome get `validation_status` and, when present,
    /// `status_code` or `error_message`. A redirected page has its URL
    /// replaced with the redirect target so future scans validate the target;
    /// the stale source is kept as `original_url`. Domains left without pages
    /// are dropped and the top-level counts are recomputed.
    pub fn apply_validation(
        mut self,
        results: &HashMap<String, ValidationResult>,
        urls_to_remove: &HashSet<String>,
    ) -> Dataset {
        let mut updated_domains = Vec::new();

        for mut domain in self.domains {
            let mut updated_pages = Vec::new();

            for mut page in domain.pages {
                if urls_to_remove.contains(&page.url) {
                    continue;
                }

                if let Some(result) = results.get(&page.url) {
                    page.validation_status = Some(if result.is_valid {
                        ValidationStatus::Valid
                    } else {
                        ValidationStatus::Invalid
                    });

                    if let Some(status_code) = result.status_code {
                        page.status_code = Some(status_code);
                    }

                    if let Some(error_message) = &result.error_message {
                        page.error_message = Some(error_message.clone());
                    }

                    if let Some(redirected_to) = &result.redirected_to {
                        page.redirected_to = Some(redirected_to.clone());
                        // Future scans should validate the target, not the
                        // stale source.
                        page.original_url = Some(page.url.clone());
                        page.url = redirected_to.clone();
                    }
                }

                updated_pages.push(page);
            }

            if !updated_pages.is_empty() {
                domain.pages = updated_pages;
                updated_domains.push(domain);
            }
        }

        self.domains = updated_domains;
        self.recount();
        self
    }

    /// Recomputes `domain_count` and `page_count` from the document structure
    fn recount(&mut self) {
        self.domain_count = self.domains.len();
        self.page_count = self.domains.iter().map(|d| d.pages.len()).sum();
    }
}

/// Derives the rewritten-output path from an input dataset path
///
/// The output lands beside the input with a `_validated` stem suffix, e.g.
/// `iceland.json` -> `iceland_validated.json`. The input is never modified.
pub fn validated_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset");
    let file_name = match input.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{}{}.{}", stem, VALIDATED_SUFFIX, ext),
        None => format!("{}{}", stem, VALIDATED_SUFFIX),
    };
    input.with_file_name(file_name)
}

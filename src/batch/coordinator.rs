//! Cycle lifecycle coordination

use crate::country;
use crate::storage::{
    open_storage, CountryCycleState, CycleProgress, SqliteStorage, Storage,
};
use crate::{CiviscanError, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Coordinates validation cycles over the metadata store
///
/// The coordinator owns cycle state only; running scans is the batch runner's
/// job. All state lives in the store, so any number of sequential runs can
/// share one cycle.
pub struct BatchCoordinator {
    storage: SqliteStorage,
    dataset_dir: PathBuf,
}

impl BatchCoordinator {
    /// Opens a coordinator over the store at `db_url`
    pub fn new(db_url: &str, dataset_dir: &Path) -> Result<Self> {
        Ok(Self {
            storage: open_storage(db_url)?,
            dataset_dir: dataset_dir.to_path_buf(),
        })
    }

    /// Returns the active cycle id, creating a new cycle if none is active
    ///
    /// An active cycle is resumed as-is. A new cycle is seeded with every
    /// country that has a dataset file, all pending. When a tracking issue is
    /// given and the resumed cycle has none, the issue is attached.
    pub fn get_or_create_cycle(&mut self, tracking_issue: Option<i64>) -> Result<String> {
        if let Some(active) = self.storage.find_active_cycle()? {
            tracing::info!("Resuming cycle {}", active.cycle_id);
            if active.tracking_issue.is_none() {
                if let Some(issue) = tracking_issue {
                    self.storage.attach_tracking_issue(&active.cycle_id, issue)?;
                }
            }
            return Ok(active.cycle_id);
        }

        let countries = country::known_countries(&self.dataset_dir)?;
        if countries.is_empty() {
            return Err(CiviscanError::DatasetNotFound {
                path: self.dataset_dir.clone(),
            });
        }

        let cycle_id = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        self.storage
            .create_cycle(&cycle_id, &countries, tracking_issue)?;
        tracing::info!(
            "Created cycle {} with {} countries",
            cycle_id,
            countries.len()
        );

        Ok(cycle_id)
    }

    /// Claims up to `batch_size` pending countries, marking them processing
    pub fn claim_batch(&mut self, cycle_id: &str, batch_size: usize) -> Result<Vec<String>> {
        let batch = self.storage.get_pending_countries(cycle_id, batch_size)?;
        if !batch.is_empty() {
            self.storage.mark_processing(cycle_id, &batch)?;
        }
        Ok(batch)
    }

    /// Attaches a tracking issue to a cycle
    pub fn attach_tracking_issue(&mut self, cycle_id: &str, issue: i64) -> Result<()> {
        Ok(self.storage.attach_tracking_issue(cycle_id, issue)?)
    }

    /// Records a country as successfully scanned
    pub fn complete_country(&mut self, cycle_id: &str, country_code: &str) -> Result<()> {
        Ok(self
            .storage
            .mark_completed(cycle_id, &[country_code.to_string()])?)
    }

    /// Records a country as failed with an error message
    pub fn fail_country(
        &mut self,
        cycle_id: &str,
        country_code: &str,
        error_message: &str,
    ) -> Result<()> {
        Ok(self
            .storage
            .mark_failed(cycle_id, country_code, error_message)?)
    }

    /// Returns a claimed country to the pending queue
    pub fn release_country(&mut self, cycle_id: &str, country_code: &str) -> Result<()> {
        Ok(self.storage.mark_pending(cycle_id, country_code)?)
    }

    /// Returns aggregate progress for a cycle
    pub fn progress(&self, cycle_id: &str) -> Result<CycleProgress> {
        Ok(self.storage.get_cycle_progress(cycle_id)?)
    }

    /// Returns per-country detail rows for a cycle
    pub fn details(&self, cycle_id: &str) -> Result<Vec<CountryCycleState>> {
        Ok(self.storage.get_cycle_details(cycle_id)?)
    }

    /// Finds the active cycle without creating one
    pub fn active_cycle(&self) -> Result<Option<String>> {
        Ok(self
            .storage
            .find_active_cycle()?
            .map(|active| active.cycle_id))
    }

    /// Directory the cycle's datasets are read from
    pub fn dataset_dir(&self) -> &Path {
        &self.dataset_dir
    }
}

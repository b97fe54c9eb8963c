//! SQLite storage implementation

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{ActiveCycle, CountryCycleState, CountryStatus, CycleProgress, ValidationRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` and initializes the schema
    pub fn new(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ValidationRecord> {
        Ok(ValidationRecord {
            url: row.get(0)?,
            country_code: row.get(1)?,
            scan_id: row.get(2)?,
            status_code: row.get(3)?,
            error_message: row.get(4)?,
            redirected_to: row.get(5)?,
            redirect_chain: row.get(6)?,
            is_valid: row.get::<_, i64>(7)? != 0,
            failure_count: row.get(8)?,
            validated_at: row.get(9)?,
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Validation Records =====

    fn insert_validation_record(&mut self, record: &ValidationRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO url_validation_results
             (url, country_code, scan_id, status_code, error_message,
              redirected_to, redirect_chain, is_valid, failure_count, validated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.url,
                record.country_code,
                record.scan_id,
                record.status_code,
                record.error_message,
                record.redirected_to,
                record.redirect_chain,
                record.is_valid as i64,
                record.failure_count,
                record.validated_at,
            ],
        )?;
        Ok(())
    }

    fn get_previous_failures(&self, country_code: &str) -> StorageResult<HashMap<String, u32>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, MAX(failure_count)
             FROM url_validation_results
             WHERE country_code = ?1
             GROUP BY url",
        )?;

        let mut failures = HashMap::new();
        let rows = stmt.query_map(params![country_code], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;

        for row in rows {
            let (url, count) = row?;
            failures.insert(url, count);
        }

        Ok(failures)
    }

    fn get_scan_records(&self, scan_id: &str) -> StorageResult<Vec<ValidationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, country_code, scan_id, status_code, error_message,
                    redirected_to, redirect_chain, is_valid, failure_count, validated_at
             FROM url_validation_results
             WHERE scan_id = ?1
             ORDER BY url",
        )?;

        let records = stmt
            .query_map(params![scan_id], Self::record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== Batch Cycle State =====

    fn find_active_cycle(&self) -> StorageResult<Option<ActiveCycle>> {
        let active = self
            .conn
            .query_row(
                "SELECT DISTINCT cycle_id, tracking_issue
                 FROM validation_batch_state
                 WHERE status IN ('pending', 'processing')
                 ORDER BY cycle_id DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok(ActiveCycle {
                        cycle_id: row.get(0)?,
                        tracking_issue: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(active)
    }

    fn create_cycle(
        &mut self,
        cycle_id: &str,
        countries: &[String],
        tracking_issue: Option<i64>,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        for country_code in countries {
            tx.execute(
                "INSERT OR REPLACE INTO validation_batch_state
                 (cycle_id, country_code, status, tracking_issue)
                 VALUES (?1, ?2, 'pending', ?3)",
                params![cycle_id, country_code, tracking_issue],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn attach_tracking_issue(&mut self, cycle_id: &str, issue: i64) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE validation_batch_state SET tracking_issue = ?1 WHERE cycle_id = ?2",
            params![issue, cycle_id],
        )?;
        Ok(())
    }

    fn get_pending_countries(&self, cycle_id: &str, limit: usize) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT country_code
             FROM validation_batch_state
             WHERE cycle_id = ?1 AND status = 'pending'
             ORDER BY country_code
             LIMIT ?2",
        )?;

        let countries = stmt
            .query_map(params![cycle_id, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(countries)
    }

    fn mark_processing(&mut self, cycle_id: &str, country_codes: &[String]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        for country_code in country_codes {
            tx.execute(
                "UPDATE validation_batch_state
                 SET status = 'processing', started_at = ?1
                 WHERE cycle_id = ?2 AND country_code = ?3",
                params![now, cycle_id, country_code],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn mark_completed(&mut self, cycle_id: &str, country_codes: &[String]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        for country_code in country_codes {
            tx.execute(
                "UPDATE validation_batch_state
                 SET status = 'completed', completed_at = ?1
                 WHERE cycle_id = ?2 AND country_code = ?3",
                params![now, cycle_id, country_code],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn mark_failed(
        &mut self,
        cycle_id: &str,
        country_code: &str,
        error_message: &str,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE validation_batch_state
             SET status = 'failed', completed_at = ?1, error_message = ?2
             WHERE cycle_id = ?3 AND country_code = ?4",
            params![now, error_message, cycle_id, country_code],
        )?;
        Ok(())
    }

    fn mark_pending(&mut self, cycle_id: &str, country_code: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE validation_batch_state
             SET status = 'pending', started_at = NULL
             WHERE cycle_id = ?1 AND country_code = ?2",
            params![cycle_id, country_code],
        )?;
        Ok(())
    }

    fn get_cycle_progress(&self, cycle_id: &str) -> StorageResult<CycleProgress> {
        let progress = self.conn.query_row(
            "SELECT
                COUNT(*),
                SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                MAX(tracking_issue)
             FROM validation_batch_state
             WHERE cycle_id = ?1",
            params![cycle_id],
            |row| {
                Ok(CycleProgress {
                    cycle_id: cycle_id.to_string(),
                    total: row.get::<_, Option<u64>>(0)?.unwrap_or(0),
                    completed: row.get::<_, Option<u64>>(1)?.unwrap_or(0),
                    processing: row.get::<_, Option<u64>>(2)?.unwrap_or(0),
                    pending: row.get::<_, Option<u64>>(3)?.unwrap_or(0),
                    failed: row.get::<_, Option<u64>>(4)?.unwrap_or(0),
                    tracking_issue: row.get(5)?,
                })
            },
        )?;

        Ok(progress)
    }

    fn get_cycle_details(&self, cycle_id: &str) -> StorageResult<Vec<CountryCycleState>> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle_id, country_code, status, started_at, completed_at,
                    tracking_issue, error_message
             FROM validation_batch_state
             WHERE cycle_id = ?1
             ORDER BY
                 CASE status
                     WHEN 'processing' THEN 1
                     WHEN 'pending' THEN 2
                     WHEN 'failed' THEN 3
                     WHEN 'completed' THEN 4
                 END,
                 country_code",
        )?;

        let details = stmt
            .query_map(params![cycle_id], |row| {
                Ok(CountryCycleState {
                    cycle_id: row.get(0)?,
                    country_code: row.get(1)?,
                    status: CountryStatus::from_db_string(&row.get::<_, String>(2)?)
                        .unwrap_or(CountryStatus::Failed),
                    started_at: row.get(3)?,
                    completed_at: row.get(4)?,
                    tracking_issue: row.get(5)?,
                    error_message: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, scan_id: &str, is_valid: bool, failure_count: u32) -> ValidationRecord {
        ValidationRecord {
            url: url.to_string(),
            country_code: "ICELAND".to_string(),
            scan_id: scan_id.to_string(),
            status_code: if is_valid { Some(200) } else { None },
            error_message: if is_valid {
                None
            } else {
                Some("Timeout: request timed out".to_string())
            },
            redirected_to: None,
            redirect_chain: None,
            is_valid,
            failure_count,
            validated_at: Some(Utc::now().to_rfc3339()),
        }
    }

    fn seed_cycle(storage: &mut SqliteStorage, cycle_id: &str, countries: &[&str]) {
        let countries: Vec<String> = countries.iter().map(|c| c.to_string()).collect();
        storage.create_cycle(cycle_id, &countries, None).unwrap();
    }

    #[test]
    fn test_insert_and_fetch_scan_records() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .insert_validation_record(&record("https://example.gov/", "scan-1", true, 0))
            .unwrap();
        storage
            .insert_validation_record(&record("https://example.gov/a", "scan-1", false, 1))
            .unwrap();

        let records = storage.get_scan_records("scan-1").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_valid);
        assert_eq!(records[1].failure_count, 1);
    }

    #[test]
    fn test_previous_failures_takes_max_across_scans() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .insert_validation_record(&record("https://example.gov/", "scan-1", false, 1))
            .unwrap();
        storage
            .insert_validation_record(&record("https://example.gov/", "scan-2", false, 2))
            .unwrap();
        storage
            .insert_validation_record(&record("https://example.gov/ok", "scan-2", true, 0))
            .unwrap();

        let failures = storage.get_previous_failures("ICELAND").unwrap();
        assert_eq!(failures.get("https://example.gov/"), Some(&2));
        assert_eq!(failures.get("https://example.gov/ok"), Some(&0));
    }

    #[test]
    fn test_previous_failures_survive_a_valid_scan() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .insert_validation_record(&record("https://example.gov/", "scan-1", false, 1))
            .unwrap();
        storage
            .insert_validation_record(&record("https://example.gov/", "scan-2", true, 0))
            .unwrap();

        // The max over history wins, not the latest record.
        let failures = storage.get_previous_failures("ICELAND").unwrap();
        assert_eq!(failures.get("https://example.gov/"), Some(&1));
    }

    #[test]
    fn test_previous_failures_scoped_to_country() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .insert_validation_record(&record("https://example.gov/", "scan-1", false, 1))
            .unwrap();

        let failures = storage.get_previous_failures("MALTA").unwrap();
        assert!(failures.is_empty());
    }

    #[test]
    fn test_create_cycle_seeds_pending() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_cycle(&mut storage, "20260101-000000", &["AUSTRIA", "MALTA"]);

        let progress = storage.get_cycle_progress("20260101-000000").unwrap();
        assert_eq!(progress.total, 2);
        assert_eq!(progress.pending, 2);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_find_active_cycle_prefers_latest() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_cycle(&mut storage, "20260101-000000", &["AUSTRIA"]);
        seed_cycle(&mut storage, "20260201-000000", &["AUSTRIA"]);

        let active = storage.find_active_cycle().unwrap().unwrap();
        assert_eq!(active.cycle_id, "20260201-000000");
    }

    #[test]
    fn test_find_active_cycle_ignores_finished() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_cycle(&mut storage, "20260101-000000", &["AUSTRIA"]);
        storage
            .mark_completed("20260101-000000", &["AUSTRIA".to_string()])
            .unwrap();

        assert!(storage.find_active_cycle().unwrap().is_none());
    }

    #[test]
    fn test_status_transitions_stamp_timestamps() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_cycle(&mut storage, "c1", &["AUSTRIA", "MALTA"]);

        storage
            .mark_processing("c1", &["AUSTRIA".to_string()])
            .unwrap();
        let details = storage.get_cycle_details("c1").unwrap();
        let austria = details
            .iter()
            .find(|d| d.country_code == "AUSTRIA")
            .unwrap();
        assert_eq!(austria.status, CountryStatus::Processing);
        assert!(austria.started_at.is_some());

        storage
            .mark_completed("c1", &["AUSTRIA".to_string()])
            .unwrap();
        storage.mark_failed("c1", "MALTA", "dataset missing").unwrap();

        let progress = storage.get_cycle_progress("c1").unwrap();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 1);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_mark_pending_returns_country_to_queue() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_cycle(&mut storage, "c1", &["AUSTRIA"]);

        storage
            .mark_processing("c1", &["AUSTRIA".to_string()])
            .unwrap();
        storage.mark_pending("c1", "AUSTRIA").unwrap();

        let pending = storage.get_pending_countries("c1", 10).unwrap();
        assert_eq!(pending, vec!["AUSTRIA"]);

        let details = storage.get_cycle_details("c1").unwrap();
        assert!(details[0].started_at.is_none());
    }

    #[test]
    fn test_pending_countries_ordered_and_limited() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_cycle(&mut storage, "c1", &["NORWAY", "AUSTRIA", "MALTA"]);

        let batch = storage.get_pending_countries("c1", 2).unwrap();
        assert_eq!(batch, vec!["AUSTRIA", "MALTA"]);
    }

    #[test]
    fn test_progress_partition_sums_to_total() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_cycle(&mut storage, "c1", &["A", "B", "C", "D"]);

        storage.mark_processing("c1", &["A".to_string()]).unwrap();
        storage.mark_completed("c1", &["B".to_string()]).unwrap();
        storage.mark_failed("c1", "C", "boom").unwrap();

        let progress = storage.get_cycle_progress("c1").unwrap();
        assert_eq!(
            progress.completed + progress.processing + progress.pending + progress.failed,
            progress.total
        );
    }

    #[test]
    fn test_details_ordered_by_status_priority() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_cycle(&mut storage, "c1", &["A", "B", "C", "D"]);

        storage.mark_completed("c1", &["A".to_string()]).unwrap();
        storage.mark_failed("c1", "B", "boom").unwrap();
        storage.mark_processing("c1", &["C".to_string()]).unwrap();

        let details = storage.get_cycle_details("c1").unwrap();
        let order: Vec<&str> = details.iter().map(|d| d.country_code.as_str()).collect();
        assert_eq!(order, vec!["C", "D", "B", "A"]);
    }

    #[test]
    fn test_attach_tracking_issue() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_cycle(&mut storage, "c1", &["AUSTRIA"]);

        storage.attach_tracking_issue("c1", 42).unwrap();

        let progress = storage.get_cycle_progress("c1").unwrap();
        assert_eq!(progress.tracking_issue, Some(42));
    }

    #[test]
    fn test_empty_cycle_progress_is_zeroed() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let progress = storage.get_cycle_progress("missing").unwrap();
        assert_eq!(progress.total, 0);
        assert!(progress.is_complete());
    }
}

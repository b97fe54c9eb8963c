//! Database schema definitions
//!
//! All tables are created with `IF NOT EXISTS`, so schema initialization is
//! idempotent and runs unconditionally before first use.

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Per-URL validation outcomes, one row per URL per scan
CREATE TABLE IF NOT EXISTS url_validation_results (
    url TEXT NOT NULL,
    country_code TEXT NOT NULL,
    scan_id TEXT NOT NULL,
    status_code INTEGER,
    error_message TEXT,
    redirected_to TEXT,
    redirect_chain TEXT,
    is_valid INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    validated_at TEXT,
    PRIMARY KEY (url, scan_id)
);

CREATE INDEX IF NOT EXISTS idx_url_validation_country ON url_validation_results(country_code);
CREATE INDEX IF NOT EXISTS idx_url_validation_scan ON url_validation_results(scan_id);
CREATE INDEX IF NOT EXISTS idx_url_validation_failures ON url_validation_results(failure_count);

-- Per-country state within a batch validation cycle
CREATE TABLE IF NOT EXISTS validation_batch_state (
    cycle_id TEXT NOT NULL,
    country_code TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    tracking_issue INTEGER,
    error_message TEXT,
    PRIMARY KEY (cycle_id, country_code)
);

CREATE INDEX IF NOT EXISTS idx_batch_state_cycle ON validation_batch_state(cycle_id);
CREATE INDEX IF NOT EXISTS idx_batch_state_status ON validation_batch_state(status);
CREATE INDEX IF NOT EXISTS idx_batch_state_issue ON validation_batch_state(tracking_issue);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["url_validation_results", "validation_batch_state"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}

//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Pagesweep checkpoint database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvesting runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Key-value checkpoint (entity map, completed tasks, config hash)
CREATE TABLE IF NOT EXISTS checkpoint (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Final outcome of every task, latest attempt wins
CREATE TABLE IF NOT EXISTS task_outcomes (
    task_key TEXT PRIMARY KEY,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    url TEXT NOT NULL,
    label TEXT NOT NULL,
    section TEXT,
    entity TEXT,
    state TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_outcomes_state ON task_outcomes(state);
CREATE INDEX IF NOT EXISTS idx_task_outcomes_run ON task_outcomes(run_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

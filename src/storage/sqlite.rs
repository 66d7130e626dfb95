//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::TaskState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CheckpointStore, Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, TaskOutcomeRecord};
use crate::SweepError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SweepError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SweepError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, SweepError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<TaskOutcomeRecord> {
    Ok(TaskOutcomeRecord {
        task_key: row.get(0)?,
        url: row.get(1)?,
        label: row.get(2)?,
        section: row.get(3)?,
        entity: row.get(4)?,
        state: TaskState::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(TaskState::Dropped),
        attempts: row.get(6)?,
        error_message: row.get(7)?,
        finished_at: row.get(8)?,
    })
}

impl CheckpointStore for SqliteStorage {
    fn load(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM checkpoint WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, key: &str, value: &serde_json::Value) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let raw = serde_json::to_string(value)?;

        self.conn.execute(
            "INSERT INTO checkpoint (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, raw, now],
        )?;
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM checkpoint", [])?;
        tx.execute("DELETE FROM task_outcomes", [])?;
        tx.commit()?;
        Ok(())
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt.query_row([], run_from_row).optional()?;

        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Task Outcomes =====

    fn record_outcome(&mut self, run_id: i64, outcome: &TaskOutcomeRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO task_outcomes
             (task_key, run_id, url, label, section, entity, state, attempts, error_message, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                outcome.task_key,
                run_id,
                outcome.url,
                outcome.label,
                outcome.section,
                outcome.entity,
                outcome.state.to_db_string(),
                outcome.attempts,
                outcome.error_message,
                outcome.finished_at,
            ],
        )?;
        Ok(())
    }

    fn count_outcomes_by_state(&self) -> StorageResult<HashMap<TaskState, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM task_outcomes GROUP BY state")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (state, count) = row?;
            if let Some(state) = TaskState::from_db_string(&state) {
                counts.insert(state, count);
            }
        }

        Ok(counts)
    }

    fn get_failed_outcomes(&self, limit: usize) -> StorageResult<Vec<TaskOutcomeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_key, url, label, section, entity, state, attempts, error_message, finished_at
             FROM task_outcomes
             WHERE state IN (?1, ?2)
             ORDER BY finished_at DESC
             LIMIT ?3",
        )?;

        let outcomes = stmt
            .query_map(
                params![
                    TaskState::NotFound.to_db_string(),
                    TaskState::Dropped.to_db_string(),
                    limit as i64
                ],
                outcome_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(outcomes)
    }
}

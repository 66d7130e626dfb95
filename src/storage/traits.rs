//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::TaskState;
use crate::storage::{RunRecord, RunStatus, TaskOutcomeRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable key-value checkpoint
pub trait CheckpointStore: Send {
    /// Loads the value stored under `key`
    fn load(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;

    /// Stores `value` under `key`, replacing any previous value
    fn save(&mut self, key: &str, value: &serde_json::Value) -> StorageResult<()>;

    /// Removes every checkpoint entry
    fn clear(&mut self) -> StorageResult<()>;
}

/// Trait for storage backend implementations
///
/// Adds run tracking and per-task outcomes on top of the checkpoint.
pub trait Storage: CheckpointStore {
    // ===== Run Management =====

    /// Creates a new run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with the given status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Task Outcomes =====

    /// Records the final outcome of a task, replacing earlier attempts
    fn record_outcome(&mut self, run_id: i64, outcome: &TaskOutcomeRecord) -> StorageResult<()>;

    /// Counts tasks per outcome state
    fn count_outcomes_by_state(&self) -> StorageResult<HashMap<TaskState, u64>>;

    /// Lists tasks that ended in an error state
    fn get_failed_outcomes(&self, limit: usize) -> StorageResult<Vec<TaskOutcomeRecord>>;
}

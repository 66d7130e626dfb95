//! Storage module for persisting run progress
//!
//! This module handles all durable state of a run, including:
//! - SQLite database initialization and schema management
//! - The key-value checkpoint holding the entity map and completed tasks
//! - Per-task outcomes
//! - Run tracking and resumption support

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{CheckpointStore, Storage, StorageError, StorageResult};

use crate::state::TaskState;
use crate::SweepError;

use std::path::Path;
use std::sync::{Arc, Mutex};

/// Checkpoint key holding the entity map
pub const STATE_KEY: &str = "STATE";

/// Checkpoint key holding the keys of completed tasks
pub const TASKS_KEY: &str = "TASKS";

/// Checkpoint key holding tasks that were queued or running
pub const QUEUE_KEY: &str = "QUEUE";

/// Checkpoint key holding the hash of the config the checkpoint was written with
pub const CONFIG_KEY: &str = "CONFIG";

/// Storage handle shared between the entity store and the coordinator
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SweepError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SweepError> {
    SqliteStorage::new(path)
}

/// Wraps a backend so it can be shared across tasks
pub fn share<S: Storage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Final outcome of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcomeRecord {
    pub task_key: String,
    pub url: String,
    pub label: String,
    pub section: Option<String>,
    pub entity: Option<String>,
    pub state: TaskState,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub finished_at: String,
}

/// Represents a harvesting run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a harvesting run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

//! Output sink traits and types
//!
//! This module defines the trait interface for dataset sinks and
//! associated data structures for run summaries.

use crate::state::EntityRecord;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Summary statistics for a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    // Run metadata
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,

    // Task outcomes
    pub tasks_completed: u64,
    pub tasks_soft_failed: u64,
    pub tasks_skipped: u64,
    pub tasks_not_found: u64,
    pub tasks_dropped: u64,

    // Entities
    pub entities: u64,
    pub exported: u64,
}

impl RunSummary {
    /// Creates a new empty run summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of tasks in terminal states
    pub fn total_terminal_tasks(&self) -> u64 {
        self.tasks_completed
            + self.tasks_soft_failed
            + self.tasks_skipped
            + self.tasks_not_found
            + self.tasks_dropped
    }

    /// Returns the share of terminal tasks that ended successfully, as a percentage
    pub fn success_rate(&self) -> f64 {
        let terminal = self.total_terminal_tasks();
        if terminal == 0 {
            return 0.0;
        }
        ((self.tasks_completed + self.tasks_soft_failed) as f64 / terminal as f64) * 100.0
    }
}

/// Destination of the exported dataset
///
/// Implementations must be thread-safe.
pub trait DatasetSink: Send + Sync {
    /// Appends records to the dataset
    ///
    /// # Arguments
    ///
    /// * `records` - Export-eligible records, in the order they should be written
    fn append(&self, records: &[EntityRecord]) -> OutputResult<()>;
}

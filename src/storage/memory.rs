//! In-memory storage backend
//!
//! Used for dry runs and tests; nothing survives the process.

use crate::state::TaskState;
use crate::storage::traits::{CheckpointStore, Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, TaskOutcomeRecord};
use chrono::Utc;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    checkpoint: HashMap<String, serde_json::Value>,
    runs: Vec<RunRecord>,
    outcomes: HashMap<String, TaskOutcomeRecord>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryStorage {
    fn load(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        Ok(self.checkpoint.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &serde_json::Value) -> StorageResult<()> {
        self.checkpoint.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.checkpoint.clear();
        self.outcomes.clear();
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let id = self.runs.len() as i64 + 1;
        self.runs.push(RunRecord {
            id,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            config_hash: config_hash.to_string(),
            status: RunStatus::Running,
        });
        Ok(id)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        Ok(self.runs.last().cloned())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let run = self
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or(StorageError::RunNotFound(run_id))?;

        run.status = status;
        run.finished_at = Some(Utc::now().to_rfc3339());
        Ok(())
    }

    fn record_outcome(&mut self, _run_id: i64, outcome: &TaskOutcomeRecord) -> StorageResult<()> {
        self.outcomes
            .insert(outcome.task_key.clone(), outcome.clone());
        Ok(())
    }

    fn count_outcomes_by_state(&self) -> StorageResult<HashMap<TaskState, u64>> {
        let mut counts = HashMap::new();
        for outcome in self.outcomes.values() {
            *counts.entry(outcome.state).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn get_failed_outcomes(&self, limit: usize) -> StorageResult<Vec<TaskOutcomeRecord>> {
        let mut failed: Vec<_> = self
            .outcomes
            .values()
            .filter(|o| o.state.is_error())
            .cloned()
            .collect();

        failed.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        failed.truncate(limit);
        Ok(failed)
    }
}

//! Output module for exporting the dataset and summarising runs
//!
//! This module handles:
//! - Writing export-eligible entities to a dataset sink
//! - Generating run summaries
//! - Recording run statistics

mod jsonl;
pub mod stats;
mod traits;

pub use jsonl::{JsonlSink, MemorySink};
pub use stats::{load_statistics, print_statistics, RunStatistics};
pub use traits::{DatasetSink, OutputError, OutputResult, RunSummary};

use crate::state::{EntityStore, TaskState};
use crate::storage::Storage;
use crate::SweepError;
use chrono::{DateTime, Utc};
use tracing::info;

/// Runs the export sweep and hands the eligible records to `sink`
///
/// # Returns
///
/// The number of records written
pub fn export_dataset(
    store: &EntityStore,
    sink: &dyn DatasetSink,
    finished_at: DateTime<Utc>,
) -> OutputResult<usize> {
    let records = store.export(finished_at);
    sink.append(&records)?;

    info!(
        "Exported {} of {} entities",
        records.len(),
        store.len()
    );
    Ok(records.len())
}

/// Generates a run summary from storage
///
/// # Arguments
///
/// * `storage` - The storage backend containing run data
/// * `store` - The entity store of the run
///
/// # Returns
///
/// * `Ok(RunSummary)` - Successfully generated summary
/// * `Err(SweepError)` - Failed to generate summary
pub fn generate_summary(
    storage: &dyn Storage,
    store: &EntityStore,
) -> Result<RunSummary, SweepError> {
    let run = storage
        .get_latest_run()?
        .ok_or_else(|| OutputError::Storage("No runs found in database".to_string()))?;

    // Calculate duration if finished
    let duration_seconds = match (
        run.started_at.parse::<DateTime<Utc>>(),
        run.finished_at.as_deref().map(str::parse::<DateTime<Utc>>),
    ) {
        (Ok(started), Some(Ok(finished))) => Some((finished - started).num_seconds().max(0) as u64),
        _ => None,
    };

    let stats = stats::load_statistics(storage, store)?;

    Ok(RunSummary {
        run_id: run.id,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_seconds,
        status: run.status.to_db_string().to_string(),
        config_hash: run.config_hash,
        tasks_completed: stats.count(TaskState::Completed),
        tasks_soft_failed: stats.count(TaskState::SoftFailed),
        tasks_skipped: stats.count(TaskState::Skipped),
        tasks_not_found: stats.count(TaskState::NotFound),
        tasks_dropped: stats.count(TaskState::Dropped),
        entities: stats.entities,
        exported: stats.eligible,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FieldsPatch, Patch};
    use crate::storage::{share, MemoryStorage, RunStatus, TaskOutcomeRecord};

    #[tokio::test]
    async fn test_export_dataset_writes_eligible_only() {
        let store = EntityStore::new(share(MemoryStorage::new()));
        store
            .apply(
                "acme",
                Patch::About(FieldsPatch {
                    categories: vec!["Bar".to_string()],
                    ..Default::default()
                }),
            )
            .await;
        store.apply("blank", Patch::About(FieldsPatch::default())).await;

        let sink = MemorySink::new();
        let written = export_dataset(&store, &sink, Utc::now()).unwrap();

        assert_eq!(written, 1);
        assert_eq!(sink.records()[0].categories, vec!["Bar"]);
    }

    #[tokio::test]
    async fn test_generate_summary() {
        let mut storage = MemoryStorage::new();
        let run_id = storage.create_run("abc").unwrap();
        storage
            .record_outcome(
                run_id,
                &TaskOutcomeRecord {
                    task_key: "PAGE:home:acme".to_string(),
                    url: "https://m.facebook.com/pg/acme".to_string(),
                    label: "PAGE".to_string(),
                    section: Some("home".to_string()),
                    entity: Some("acme".to_string()),
                    state: TaskState::Completed,
                    attempts: 1,
                    error_message: None,
                    finished_at: Utc::now().to_rfc3339(),
                },
            )
            .unwrap();
        storage.finish_run(run_id, RunStatus::Completed).unwrap();

        let store = EntityStore::new(share(MemoryStorage::new()));
        let summary = generate_summary(&storage, &store).unwrap();

        assert_eq!(summary.run_id, run_id);
        assert_eq!(summary.status, "completed");
        assert_eq!(summary.tasks_completed, 1);
        assert!(summary.duration_seconds.is_some());
        assert!((summary.success_rate() - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_generate_summary_without_runs() {
        let storage = MemoryStorage::new();
        let store = EntityStore::new(share(MemoryStorage::new()));
        assert!(generate_summary(&storage, &store).is_err());
    }
}

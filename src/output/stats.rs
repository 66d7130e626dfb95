//! Statistics generation from the checkpoint database
//!
//! This module provides functionality for extracting and displaying
//! run statistics from the storage layer and the entity store.

use crate::state::{EntityStore, TaskState};
use crate::storage::{Storage, TaskOutcomeRecord};
use crate::SweepError;
use std::collections::HashMap;

/// Run statistics summary
#[derive(Debug, Clone)]
pub struct RunStatistics {
    /// Total number of tasks with a recorded outcome
    pub total_tasks: u64,

    /// Count of tasks by state
    pub tasks_by_state: HashMap<TaskState, u64>,

    /// Number of entities in the store
    pub entities: u64,

    /// Number of entities that would be exported
    pub eligible: u64,

    /// Most recent failed tasks
    pub recent_failures: Vec<TaskOutcomeRecord>,
}

impl RunStatistics {
    pub fn count(&self, state: TaskState) -> u64 {
        self.tasks_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Tasks that finished without error, soft failures included
    pub fn succeeded(&self) -> u64 {
        self.tasks_by_state
            .iter()
            .filter(|(state, _)| state.is_success())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `store` - The entity store, loaded from the same checkpoint
///
/// # Returns
///
/// * `Ok(RunStatistics)` - Successfully loaded statistics
/// * `Err(SweepError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    store: &EntityStore,
) -> Result<RunStatistics, SweepError> {
    let tasks_by_state = storage.count_outcomes_by_state()?;
    let total_tasks = tasks_by_state.values().sum();
    let recent_failures = storage.get_failed_outcomes(10)?;

    let records = store.snapshot();
    let eligible = records.values().filter(|r| r.is_export_eligible()).count() as u64;

    Ok(RunStatistics {
        total_tasks,
        tasks_by_state,
        entities: records.len() as u64,
        eligible,
        recent_failures,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &RunStatistics) {
    println!("=== Run Statistics ===\n");

    println!("Overview:");
    println!("  Tasks finished: {}", stats.total_tasks);
    println!("  Entities: {}", stats.entities);
    println!("  Export-eligible entities: {}", stats.eligible);
    println!();

    println!("Tasks by State:");
    // Sort states by count (descending)
    let mut state_counts: Vec<_> = stats.tasks_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (state, count) in state_counts {
        let percentage = if stats.total_tasks > 0 {
            (*count as f64 / stats.total_tasks as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    if !stats.recent_failures.is_empty() {
        println!("Recent Failures ({}):", stats.recent_failures.len());
        for failure in &stats.recent_failures {
            println!(
                "  - [{}] {} after {} attempt(s): {}",
                failure.state,
                failure.url,
                failure.attempts,
                failure.error_message.as_deref().unwrap_or("no message")
            );
        }
        println!();
    }

    let succeeded = stats.succeeded();
    let success_rate = if stats.total_tasks > 0 {
        (succeeded as f64 / stats.total_tasks as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} tasks finished without error)",
        success_rate, succeeded, stats.total_tasks
    );
}

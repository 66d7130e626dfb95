//! Task queue for a run
//!
//! This module handles:
//! - First-in first-out ordering of discovered tasks
//! - Deduplication by task key for the whole run
//! - Skipping tasks completed by a previous run
//! - Re-queueing retried tasks past the dedupe check

use crate::crawler::task::Task;
use std::collections::{HashSet, VecDeque};
use tracing::trace;

/// Queue of tasks waiting for a worker
///
/// A key is accepted once per run: re-discovering a task that is queued,
/// running or finished is a no-op. Retries go through [`Scheduler::retry`].
#[derive(Debug, Default)]
pub struct Scheduler {
    frontier: VecDeque<Task>,

    /// Keys accepted during this run
    seen: HashSet<String>,

    /// Keys completed during this or a previous run
    completed: HashSet<String>,
}

impl Scheduler {
    /// Creates a scheduler that skips the given completed task keys
    pub fn new(completed: HashSet<String>) -> Self {
        Self {
            frontier: VecDeque::new(),
            seen: HashSet::new(),
            completed,
        }
    }

    /// Queues a task unless its key was already seen or completed
    ///
    /// # Returns
    ///
    /// true if the task was queued
    pub fn push(&mut self, task: Task) -> bool {
        let key = task.key();

        if self.completed.contains(&key) || !self.seen.insert(key.clone()) {
            trace!(task = %key, "Task already known");
            return false;
        }

        self.frontier.push_back(task);
        true
    }

    /// Queues a failed task again
    pub fn retry(&mut self, task: Task) {
        self.frontier.push_back(task);
    }

    /// Takes the next task
    pub fn next(&mut self) -> Option<Task> {
        self.frontier.pop_front()
    }

    /// Marks a task as done for this and later runs
    pub fn complete(&mut self, key: &str) {
        self.completed.insert(key.to_string());
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.completed.contains(key)
    }

    /// Tasks still waiting, in queue order
    pub fn pending(&self) -> Vec<Task> {
        self.frontier.iter().cloned().collect()
    }

    /// Completed keys in a stable order, for the checkpoint
    pub fn completed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.completed.iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }
}

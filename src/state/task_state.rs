//! Outcomes recorded for tasks

use std::fmt;

/// Latest recorded outcome of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Task failed and was re-queued
    Retrying,

    /// Task finished and its result was merged or its children were enqueued
    Completed,

    /// Task failed in a non-critical way and was treated as an empty success
    SoftFailed,

    /// Task was never run, e.g. a single post given as a start URL
    Skipped,

    /// The entity is confirmed absent; never retried
    NotFound,

    /// Task ran out of retries
    Dropped,
}

impl TaskState {
    /// Returns true if the task finished without error
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::SoftFailed)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::NotFound | Self::Dropped)
    }

    /// Converts the task state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::SoftFailed => "soft_failed",
            Self::Skipped => "skipped",
            Self::NotFound => "not_found",
            Self::Dropped => "dropped",
        }
    }

    /// Parses a task state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "retrying" => Some(Self::Retrying),
            "completed" => Some(Self::Completed),
            "soft_failed" => Some(Self::SoftFailed),
            "skipped" => Some(Self::Skipped),
            "not_found" => Some(Self::NotFound),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

//! Pagesweep: an incremental profile harvester
//!
//! This crate assembles one structured record per entity on a content platform by
//! visiting its independently-loading sub-views (profile, posts, reviews, services),
//! harvesting lazily-loaded feeds, and merging every phase result into a shared,
//! checkpointed entity store.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod harvest;
pub mod output;
pub mod state;
pub mod storage;
pub mod surface;
pub mod url;

use thiserror::Error;

/// Main error type for Pagesweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Surface error: {0}")]
    Surface(#[from] surface::SurfaceError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No requests were loaded from start URLs")]
    NoStartRequests,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid date in config: {0}")]
    InvalidDate(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Not a platform URL or could not determine its kind: {0}")]
    Unrecognized(String),

    #[error("Couldn't match an entity slug in {0}")]
    MissingSlug(String),
}

/// How the orchestrator reacts to a failed task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Retire the rendering identity (session and browser), then retry
    Escalate,

    /// Retry with the same kind of identity
    Retry,

    /// Drop without retrying; the entity is confirmed absent
    Terminal,

    /// Log and treat the task as an empty success
    SoftFail,
}

/// Failures raised while processing a single task
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Captcha found ({variant}) at {url}")]
    Captcha { url: String, variant: &'static str },

    #[error("Wrong responsive variant of content at {url}")]
    LayoutMismatch { url: String },

    #[error("Content not found at {url}")]
    NotFound { url: String },

    #[error("Missing {field} at {url}, most likely a wrong layout. This will be retried")]
    MissingRequiredField { url: String, field: &'static str },

    #[error("Profile with blank icons at {url}")]
    RenderIncomplete { url: String },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Worker processing {url} stopped: {reason}")]
    WorkerPanicked { url: String, reason: String },

    #[error("{section} unavailable at {url}: {reason}")]
    SectionMissing {
        url: String,
        section: &'static str,
        reason: String,
    },

    #[error("Surface error: {0}")]
    Surface(#[from] surface::SurfaceError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),
}

impl TaskError {
    /// Classifies this error into the retry policy the orchestrator applies
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Captcha { .. } | Self::LayoutMismatch { .. } | Self::Navigation { .. } => {
                Disposition::Escalate
            }
            Self::MissingRequiredField { .. }
            | Self::RenderIncomplete { .. }
            | Self::WorkerPanicked { .. } => Disposition::Retry,
            Self::NotFound { .. } => Disposition::Terminal,
            Self::SectionMissing { .. } | Self::Surface(_) | Self::Url(_) => {
                Disposition::SoftFail
            }
        }
    }

    /// Short namespace used in structured log events
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Captcha { .. } => "captcha",
            Self::LayoutMismatch { .. } => "layout-mismatch",
            Self::NotFound { .. } => "not-found",
            Self::MissingRequiredField { .. } => "missing-required-field",
            Self::RenderIncomplete { .. } => "render-incomplete",
            Self::Navigation { .. } => "navigation",
            Self::WorkerPanicked { .. } => "worker",
            Self::SectionMissing { .. } => "section",
            Self::Surface(_) => "surface",
            Self::Url(_) => "url",
        }
    }
}

/// Result type alias for Pagesweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// Result type alias for task processing
pub type TaskResult<T> = std::result::Result<T, TaskError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{EntityRecord, EntityStore, TaskState};
pub use url::{extract_slug, url_label, Label};

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> String {
        "https://m.facebook.com/pg/acme".to_string()
    }

    #[test]
    fn test_escalating_errors() {
        let captcha = TaskError::Captcha {
            url: url(),
            variant: "mobile",
        };
        let layout = TaskError::LayoutMismatch { url: url() };

        assert_eq!(captcha.disposition(), Disposition::Escalate);
        assert_eq!(layout.disposition(), Disposition::Escalate);
    }

    #[test]
    fn test_not_found_is_terminal() {
        let err = TaskError::NotFound { url: url() };
        assert_eq!(err.disposition(), Disposition::Terminal);
        assert_eq!(err.namespace(), "not-found");
    }

    #[test]
    fn test_missing_categories_is_retryable() {
        let err = TaskError::MissingRequiredField {
            url: url(),
            field: "categories",
        };
        assert_eq!(err.disposition(), Disposition::Retry);
    }

    #[test]
    fn test_section_errors_soft_fail() {
        let err = TaskError::SectionMissing {
            url: url(),
            section: "services",
            reason: "no services".to_string(),
        };
        assert_eq!(err.disposition(), Disposition::SoftFail);

        let err = TaskError::Surface(surface::SurfaceError::Unsupported("evaluate"));
        assert_eq!(err.disposition(), Disposition::SoftFail);
    }
}

//! Crawler module: tasks, queueing and orchestration
//!
//! This module contains the core harvesting logic, including:
//! - Tasks and the sections of an entity
//! - Deduplicating task queue
//! - Page sanity checks (captcha, layout, missing entity)
//! - One handler per label and section
//! - Concurrent coordination with retry and checkpointing

mod checks;
mod coordinator;
mod phases;
mod scheduler;
mod task;

pub use checks::check_page;
pub use coordinator::{Coordinator, CrawlReport};
pub use phases::{run_task, PhaseContext};
pub use scheduler::Scheduler;
pub use task::{expand_entity, seed_tasks, Section, Task};

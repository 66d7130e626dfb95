//! State module for tracking harvest progress
//!
//! This module owns everything known about the entities being assembled.
//!
//! # Components
//!
//! - `EntityRecord`: One entity and its aggregated sub-content
//! - `Patch`: A phase result and the merge strategy that goes with it
//! - `EntityStore`: Per-key serialized merges plus checkpoint persistence
//! - `TaskState`: Tracks the state of individual tasks

mod entity;
mod merge;
mod store;
mod task_state;

// Re-export main types
pub use entity::{
    Address, CommentRecord, CommentsRecord, EntityRecord, ImageRecord, PostRecord, PostStats,
    ReviewRecord, ReviewsRecord, ServiceRecord, SCHEMA_VERSION,
};
pub use merge::{
    append_unique, extend_unique, fill, overwrite_present, prepend_unique, unique_non_empty,
    FieldsPatch, IdentityPatch, Patch, SeedPatch,
};
pub use store::EntityStore;
pub use task_state::TaskState;

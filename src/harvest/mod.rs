//! Harvesting of lazily-loaded feeds
//!
//! This module provides:
//! - An idle timer that aborts a harvest once nothing new arrives
//! - A dedupe map with an optional cap shared by every item source
//! - The advance/sample/stop loop that drives a feed
//! - Date normalization and post-hoc cutoffs

mod collector;
mod controller;
mod cutoff;
mod timer;

pub use collector::{Collector, Inserted};
pub use controller::{
    Dated, Feed, GrowthSample, HarvestEnd, HarvestOptions, HarvestReport, Harvester,
    ResponseListener, ResponseSignal, StopContext, StopPolicy,
};
pub use cutoff::{convert_date, convert_timestamp, Cutoff};
pub use timer::{IdleAbort, Raced};

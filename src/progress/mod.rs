//! Progress tracking
//!
//! Throughput and ETA bookkeeping used by the coordinator while a job runs,
//! plus an indicatif bar the CLI uses to follow a job to completion.

mod bar;
mod tracker;

pub use bar::*;
pub use tracker::*;

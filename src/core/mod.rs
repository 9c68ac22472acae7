//! Job execution core
//!
//! The coordinator that owns job lifecycles, the admission queue that
//! enforces the concurrency cap, and the executor seam that actually moves
//! batches of files.

mod coordinator;
mod executor;
mod scheduler;

pub use coordinator::*;
pub use executor::*;
pub use scheduler::*;

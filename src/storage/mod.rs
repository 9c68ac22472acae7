//! Storage capacity
//!
//! Reads total/used/free space for an endpoint through a pluggable
//! [`StorageStatProvider`] and classifies it against the configured
//! thresholds before a migration is submitted.

mod capacity;
mod provider;

pub use capacity::*;
pub use provider::*;

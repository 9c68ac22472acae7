//! Configuration module for DataFlow
//!
//! Provides CLI arguments, environment overrides and the runtime
//! settings consumed by the coordinator and the analyzers.

mod settings;

pub use settings::*;

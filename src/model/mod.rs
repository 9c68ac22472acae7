//! Data model shared by the analyzers, the coordinator and the ledger
//!
//! Endpoints and manifests describe a proposed migration; `MigrationJob`
//! is the record the coordinator owns while a migration runs.

mod endpoint;
mod job;
mod manifest;

pub use endpoint::*;
pub use job::*;
pub use manifest::*;

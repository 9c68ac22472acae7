//! # DataFlow - storage migration coordinator
//!
//! DataFlow answers two questions about moving data between storage
//! endpoints (local disks, removable devices, network shares, databases,
//! object stores):
//!
//! 1. **Can it be done?** Capacity of both sides, endpoint compatibility,
//!    file-set composition, batching and a time estimate.
//! 2. **Do it, observably.** The transfer runs as a background job under a
//!    concurrency cap, streams progress into a durable ledger, and can be
//!    cancelled at any batch boundary.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dataflow::prelude::*;
//!
//! # async fn demo() -> dataflow::Result<()> {
//! let service = MigrationService::local(CoordinatorConfig::default())?;
//!
//! let source = Endpoint::local("/data/photos");
//! let destination = Endpoint::local("/mnt/backup/photos");
//! let manifest = Manifest::from_dir(std::path::Path::new("/data/photos"))?;
//!
//! let report = service.evaluate_feasibility(&source, &destination, &manifest).await;
//! if report.can_migrate {
//!     let id = service.submit_job(source, destination, manifest, JobSettings::default())?;
//!     let job = service.wait_job(&id).await?;
//!     println!("{} finished: {}", job.id, job.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Collaborators
//!
//! The service runs over three injected seams so embedders can plug in
//! their own devices and storage:
//!
//! - [`storage::StorageStatProvider`] reports total/free space per endpoint
//! - [`core::TransferExecutor`] moves one batch of files
//! - [`ledger::LedgerBackend`] persists job records

#![warn(clippy::all)]

pub mod analysis;
pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod model;
pub mod progress;
pub mod storage;

// Re-export commonly used types
pub use api::{FeasibilityReport, MigrationService};
pub use config::CoordinatorConfig;
pub use core::JobCoordinator;
pub use error::{DataflowError, Result};
pub use model::{Endpoint, JobStatus, MigrationJob};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use dataflow::prelude::*;
    //! ```

    pub use crate::analysis::{
        estimate_transfer_time, CompatibilityAnalyzer, CompatibilityReport, FileSetAnalysis,
        FileSetAnalyzer,
    };
    pub use crate::api::{FeasibilityReport, MigrationRequest, MigrationService};
    pub use crate::config::{CapacityThresholds, CoordinatorConfig};
    pub use crate::core::{CancelOutcome, JobCoordinator, LocalCopyExecutor, TransferExecutor};
    pub use crate::error::{DataflowError, Result};
    pub use crate::ledger::{JobLedger, JsonFileBackend, LedgerBackend, MemoryBackend};
    pub use crate::model::{
        Endpoint, EndpointKind, JobSettings, JobStatus, Manifest, ManifestEntry, MigrationJob,
    };
    pub use crate::storage::{CapacityEvaluator, CapacityReport, CapacityStatus, StorageStatProvider};
}

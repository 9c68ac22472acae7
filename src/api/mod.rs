//! DataFlow service API
//!
//! Transport-agnostic facade over the coordinator and the analyzers. An
//! HTTP or RPC layer maps its routes one-to-one onto [`MigrationService`]:
//!
//! | Operation | Returns |
//! |-----------|---------|
//! | `evaluate_feasibility` | capacity, compatibility, file-set and time estimate |
//! | `submit_job` | new job id |
//! | `get_job` | job snapshot or `JobNotFound` |
//! | `list_jobs` | most recent jobs, newest first |
//! | `cancel_job` | cancelled / requested, `JobNotFound` or `AlreadyTerminal` |

mod models;
mod service;

pub use models::*;
pub use service::*;

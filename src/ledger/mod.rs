//! Job ledger
//!
//! Durable record of every job the coordinator has seen, active or
//! finished. Reads are served from an in-memory snapshot so status polling
//! never waits on disk; every write is pushed through to a
//! [`LedgerBackend`].

mod backend;
mod store;

pub use backend::*;
pub use store::*;

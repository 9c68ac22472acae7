//! Pre-flight analysis
//!
//! Everything a caller wants to know before submitting a migration that does
//! not depend on storage capacity: whether the two endpoints interoperate,
//! what the file set looks like, how to batch it and how long it will take.

mod compatibility;
mod estimate;
mod fileset;

pub use compatibility::*;
pub use estimate::*;
pub use fileset::*;

//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - per-tree residual CSV export (`export`)
//! - JSON report read/write (`report`)

pub mod export;
pub mod ingest;
pub mod report;

pub use export::*;
pub use ingest::*;
pub use report::*;

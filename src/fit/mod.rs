//! Biomass model fitting.
//!
//! Responsibilities:
//!
//! - Gauss-Newton least squares for one group of trees (`nls`)
//! - pooled + per-species fits with diagnostics and guardrails (`groups`)

pub mod groups;
pub mod nls;

pub use groups::*;
pub use nls::*;

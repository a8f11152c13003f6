//! Numerical building blocks: least squares, descriptive statistics, and
//! Student-t quantiles.

pub mod ols;
pub mod special;
pub mod stats;

pub use ols::*;
pub use special::*;
pub use stats::*;

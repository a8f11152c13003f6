//! Allometric biomass model.
//!
//! Models are implemented as small, pure functions so that fitting code can
//! stay generic over the fit space.

pub mod power_law;

pub use power_law::*;

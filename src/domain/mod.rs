//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input configuration enums (`FitSpace`, `DiameterUnit`, `DfMethod`, `AllocationMethod`)
//! - normalized observations (`TreeObs`, `PlotObs`, `Stratum`)
//! - fit outputs (`BiomassFit`, `FitQuality`, `TreeResidual`, etc.)
//! - run configuration structs (`BiomassConfig`, `SamplingConfig`, ...)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;

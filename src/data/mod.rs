//! Input acquisition: table fetching and synthetic dataset generation.

pub mod fetch;
pub mod simulate;

pub use fetch::{TableClient, TableSource, sheet_csv_url};
pub use simulate::{SimulatedFiles, simulate_plots, simulate_trees, write_dataset};

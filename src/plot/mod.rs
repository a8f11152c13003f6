//! Charts: ASCII for the terminal (`ascii`), SVG files via Plotters (`svg`).

pub mod ascii;
pub mod svg;

pub use ascii::*;
pub use svg::*;

//! Plot rendering: ASCII for terminals, SVG for files.

pub mod ascii;
pub mod svg;

pub use ascii::*;
pub use svg::save_fit_svg;

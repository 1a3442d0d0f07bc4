//! Regridding between rectilinear latitude/longitude grids.

pub mod interpolation;

pub use interpolation::{bilinear_blend, Regridder};

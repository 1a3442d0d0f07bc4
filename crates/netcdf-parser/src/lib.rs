//! NetCDF reading for gridded reference data (e.g. monthly reanalysis).
//!
//! Wraps the `netcdf` crate: open a local file, list dimensions and
//! variables, and read variables as CF-decoded values (fill values masked,
//! `scale_factor`/`add_offset` applied).
//!
//! HDF5 prints diagnostics to stderr for errors that are handled on the
//! Rust side; [`silence_hdf5_errors`] and [`Hdf5ErrorGuard`] turn that off.

pub mod error;
pub mod native;

pub use error::{NetCdfError, NetCdfResult};
pub use native::{
    attribute_to_json, silence_hdf5_errors, Hdf5ErrorGuard, NetCdfDataset, NetCdfVariable,
};

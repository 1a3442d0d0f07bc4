//! Zarr writer for gridded fields and ensembles.
//!
//! Arrays are written as Zarr V3 with blosc compression, one array per
//! variable plus 1-D coordinate arrays, under a root group holding the
//! dataset attributes.

mod zarr_writer;

pub use zarr_writer::{ZarrMetadata, ZarrWriteResult, ZarrWriter, TIME_CALENDAR, TIME_UNITS};

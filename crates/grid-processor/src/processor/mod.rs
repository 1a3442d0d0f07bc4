//! Dataset readers.

mod zarr;

pub use zarr::{VariableInfo, ZarrDatasetReader};

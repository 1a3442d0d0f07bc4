//! Gridded field processing for model ensembles.
//!
//! This crate provides the array-level building blocks of the ensemble
//! pipeline:
//!
//! - **Field model**: [`GriddedField`] (time, lat, lon) and
//!   [`ClimatologyField`] (lat, lon) with labelled axes and free-form attrs
//! - **Zarr access**: [`ZarrDatasetReader`] over local or HTTP-backed stores
//! - **Regridding**: periodic bilinear [`Regridder`] onto the common 1°×1° grid,
//!   with weights memoised in a [`WeightCache`]
//! - **Coarsening**: exact block means ([`coarsen_field`])
//! - **Cell areas**: [`calc_area`]
//!
//! # Architecture
//!
//! ```text
//! zarr store (gs://, https://, local)
//!      │
//!      ▼
//! ZarrDatasetReader::read_*  ──►  GriddedField (native grid)
//!      │
//!      ├─► WeightCache::get_or_build(source grid, common grid)
//!      │
//!      ├─► Regridder::regrid_field   (native → 1°×1°)
//!      │
//!      └─► coarsen_field             (1°×1° → 2°×2°)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{coarsen_field, LatLonGrid, Regridder};
//!
//! let regridder = Regridder::new(&field.grid, &LatLonGrid::common())?;
//! let regridded = regridder.regrid_field(&field)?;
//! let coarse = coarsen_field(&regridded, 2)?;
//! ```

pub mod area;
pub mod cache;
pub mod config;
pub mod downsample;
pub mod error;
pub mod object_storage;
pub mod processor;
pub mod projection;
pub mod types;
pub mod writer;

// Re-export commonly used types at crate root
pub use area::{calc_area, EARTH_RADIUS_M};
pub use cache::{WeightCache, WeightKey};
pub use config::{GridProcessorConfig, ZarrCompression};
pub use downsample::{coarsen_climatology, coarsen_field, coarsen_labels, coarsen_mean};
pub use error::{GridProcessorError, Result};
pub use object_storage::{open_storage, StoreLocation, TokioBlockOn};
pub use processor::{VariableInfo, ZarrDatasetReader};
pub use projection::{bilinear_blend, Regridder};
pub use types::{Attrs, CacheStats, ClimatologyField, GriddedField, LatLonGrid, MemberLabels};
pub use writer::{ZarrMetadata, ZarrWriteResult, ZarrWriter};

//! ESM collection catalogs for the model archives.
//!
//! A catalog is a collection description (JSON) plus a record table (CSV,
//! optionally gzip-compressed) with one row per Zarr store. Catalogs are
//! opened per call and never mutated.

pub mod catalog;
pub mod collection;
pub mod error;
pub mod location;
pub mod record;

pub use catalog::{catalog_url, open_collections, CatalogSet, EsmCatalog, DEFAULT_BASE_URL};
pub use collection::{AssetSpec, AttributeSpec, CollectionSpec};
pub use error::{CatalogError, CatalogResult};
pub use location::CatalogLocation;
pub use record::{CatalogQuery, CatalogRecord};

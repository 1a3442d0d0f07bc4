//! Error types for the ingestion crate.

use thiserror::Error;

use cmip_common::CmipError;
use esm_catalog::CatalogError;
use grid_processor::GridProcessorError;
use netcdf_parser::NetCdfError;

/// Errors that abort a load.
///
/// Per-dataset conflicts (duplicate months, failed time slice, failed
/// regrid) are not errors; they are reported as [`crate::SkipReason`]s.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Grid processing error: {0}")]
    Grid(#[from] GridProcessorError),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] NetCdfError),

    #[error("{0}")]
    Common(#[from] CmipError),

    #[error("Missing required metadata: {0}")]
    MissingMetadata(String),

    #[error("Unsupported variable layout for {variable}: {message}")]
    UnsupportedLayout { variable: String, message: String },

    #[error("Member {member} of {variable} is not on the ensemble grid")]
    GridMismatch { variable: String, member: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IngestionError {
    pub fn layout(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedLayout {
            variable: variable.into(),
            message: message.into(),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;

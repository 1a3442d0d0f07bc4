//! Error types for grid processing.

use thiserror::Error;

/// Errors that can occur during grid processing.
#[derive(Error, Debug)]
pub enum GridProcessorError {
    /// Failed to open the data source.
    #[error("failed to open store: {0}")]
    OpenFailed(String),

    /// Failed to read data from an array.
    #[error("failed to read array data: {0}")]
    ReadFailed(String),

    /// A variable or coordinate is missing from the store.
    #[error("variable not found: {0}")]
    NotFound(String),

    /// Invalid metadata in the store.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The array's data type cannot be decoded.
    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Array shape does not match its labels.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    ZarrError(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The source grid cannot be regridded.
    #[error("regrid error: {0}")]
    RegridError(String),

    /// Block averaging does not divide the grid exactly.
    #[error("coarsen error: {0}")]
    CoarsenError(String),
}

impl GridProcessorError {
    /// Create an OpenFailed error.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    /// Create a ReadFailed error.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Create a StorageError.
    pub fn storage_error(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Create a RegridError.
    pub fn regrid(msg: impl Into<String>) -> Self {
        Self::RegridError(msg.into())
    }

    /// Create a CoarsenError.
    pub fn coarsen(msg: impl Into<String>) -> Self {
        Self::CoarsenError(msg.into())
    }
}

impl From<std::io::Error> for GridProcessorError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for GridProcessorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for grid processor operations.
pub type Result<T> = std::result::Result<T, GridProcessorError>;

//! Catalog error types.

use thiserror::Error;

/// Errors raised while opening or reading a catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid collection description {location}: {message}")]
    InvalidCollection { location: String, message: String },

    #[error("invalid record table {location}: {message}")]
    InvalidTable { location: String, message: String },

    #[error("invalid catalog location: {0}")]
    InvalidLocation(String),

    #[error(transparent)]
    Common(#[from] cmip_common::CmipError),
}

impl CatalogError {
    pub fn http(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Http {
            url: url.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

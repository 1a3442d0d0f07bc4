//! Store locations and storage backends for Zarr access.
//!
//! Remote stores are reached through `object_store`'s HTTP backend wrapped
//! in an async-to-sync adapter so the synchronous zarrs API can drive it.
//! Local stores use the filesystem backend directly.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use object_store::http::{HttpBuilder, HttpStore};
use zarrs_filesystem::FilesystemStore;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};
use zarrs_storage::ReadableStorageTraits;

use crate::error::{GridProcessorError, Result};

/// Public HTTPS endpoint for Google Cloud Storage buckets.
pub const GCS_HTTPS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Blocking executor that works from within a tokio runtime.
///
/// Uses `tokio::task::block_in_place` to move the current task to a blocking
/// thread, then uses the runtime handle to drive the future. Requires the
/// multi-threaded runtime.
#[derive(Clone, Copy)]
pub struct TokioBlockOn;

impl AsyncToSyncBlockOn for TokioBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
    }
}

/// Storage type for HTTP-backed Zarr access.
pub type HttpStorage = AsyncToSyncStorageAdapter<AsyncObjectStore<HttpStore>, TokioBlockOn>;

/// Where a Zarr store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// `http(s)://` URL (including rewritten `gs://` locations).
    Http(String),
    /// Local directory.
    Local(PathBuf),
}

impl StoreLocation {
    /// Classify a catalog `zstore` value.
    ///
    /// `gs://bucket/path` becomes `https://storage.googleapis.com/bucket/path`.
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if let Some(rest) = location.strip_prefix("gs://") {
            Self::Http(format!("{GCS_HTTPS_ENDPOINT}/{rest}"))
        } else if location.starts_with("http://") || location.starts_with("https://") {
            Self::Http(location.to_string())
        } else {
            Self::Local(PathBuf::from(location.strip_prefix("file://").unwrap_or(location)))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Create an HTTP storage backend for a remote Zarr store.
pub fn create_http_storage(url: &str) -> Result<Arc<HttpStorage>> {
    let http = HttpBuilder::new().with_url(url).build().map_err(|e| {
        GridProcessorError::open_failed(format!("Failed to create HTTP client for {url}: {e}"))
    })?;

    let async_store = Arc::new(AsyncObjectStore::new(http));
    Ok(Arc::new(AsyncToSyncStorageAdapter::new(async_store, TokioBlockOn)))
}

/// Open a readable storage backend for any store location.
pub fn open_storage(location: &StoreLocation) -> Result<Arc<dyn ReadableStorageTraits>> {
    match location {
        StoreLocation::Http(url) => {
            let storage: Arc<dyn ReadableStorageTraits> = create_http_storage(url)?;
            Ok(storage)
        }
        StoreLocation::Local(path) => {
            if !path.is_dir() {
                return Err(GridProcessorError::open_failed(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
            let store = FilesystemStore::new(path)
                .map_err(|e| GridProcessorError::open_failed(e.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

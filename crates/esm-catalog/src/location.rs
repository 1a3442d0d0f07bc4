//! Where catalog files live and how to fetch them.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{CatalogError, CatalogResult};

/// A catalog file: remote URL or local path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLocation {
    Url(Url),
    Path(PathBuf),
}

impl CatalogLocation {
    /// `http(s)://` strings are URLs; `gs://bucket/...` is rewritten to
    /// the public HTTPS endpoint; anything else is a local path.
    pub fn parse(location: &str) -> CatalogResult<Self> {
        let location = location.trim();
        if let Some(rest) = location.strip_prefix("gs://") {
            let url = format!("https://storage.googleapis.com/{rest}");
            return Url::parse(&url)
                .map(Self::Url)
                .map_err(|e| CatalogError::InvalidLocation(format!("{location}: {e}")));
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return Url::parse(location)
                .map(Self::Url)
                .map_err(|e| CatalogError::InvalidLocation(format!("{location}: {e}")));
        }
        if location.is_empty() {
            return Err(CatalogError::InvalidLocation("empty location".to_string()));
        }
        Ok(Self::Path(PathBuf::from(
            location.strip_prefix("file://").unwrap_or(location),
        )))
    }

    /// Resolve `reference` (absolute URL, absolute path, or path relative to
    /// this file's directory).
    pub fn resolve(&self, reference: &str) -> CatalogResult<Self> {
        let reference = reference.trim();
        let absolute = reference.contains("://") || Path::new(reference).is_absolute();
        if absolute {
            return Self::parse(reference);
        }
        match self {
            Self::Url(base) => base
                .join(reference)
                .map(Self::Url)
                .map_err(|e| CatalogError::InvalidLocation(format!("{reference}: {e}"))),
            Self::Path(base) => {
                let dir = base.parent().unwrap_or_else(|| Path::new("."));
                Ok(Self::Path(dir.join(reference)))
            }
        }
    }

    /// Whether the file is gzip-compressed, judged by its extension.
    pub fn is_gzip(&self) -> bool {
        match self {
            Self::Url(url) => url.path().ends_with(".gz"),
            Self::Path(path) => path.extension().is_some_and(|ext| ext == "gz"),
        }
    }

    /// Fetch the raw bytes.
    pub async fn fetch(&self, client: &Client) -> CatalogResult<Vec<u8>> {
        match self {
            Self::Url(url) => {
                debug!(url = %url, "Fetching catalog file");
                let response = client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| CatalogError::http(url.as_str(), e))?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| CatalogError::http(url.as_str(), e))?;
                Ok(bytes.to_vec())
            }
            Self::Path(path) => {
                debug!(path = %path.display(), "Reading catalog file");
                tokio::fs::read(path).await.map_err(|source| CatalogError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        }
    }

    /// Fetch the file, gunzipping `.gz` content.
    pub async fn fetch_decoded(&self, client: &Client) -> CatalogResult<Vec<u8>> {
        let bytes = self.fetch(client).await?;
        if !self.is_gzip() {
            return Ok(bytes);
        }
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|source| CatalogError::Io {
                path: self.to_string(),
                source,
            })?;
        Ok(decoded)
    }
}

impl fmt::Display for CatalogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

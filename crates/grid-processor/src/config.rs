//! Configuration for the grid processor.

use serde::{Deserialize, Serialize};

/// Configuration for the grid processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridProcessorConfig {
    /// Number of source grids whose regrid weights are kept.
    pub weight_cache_entries: usize,

    /// Block edge length used when coarsening the common grid.
    pub coarsen_size: usize,

    /// Number of months read from a store per request.
    pub time_chunk: usize,

    /// Chunk edge for the lat/lon axes of written Zarr arrays.
    pub zarr_chunk_size: usize,

    /// Compression codec for Zarr files.
    pub zarr_compression: ZarrCompression,

    /// Compression level (1-9).
    pub zarr_compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub zarr_shuffle: bool,
}

impl Default for GridProcessorConfig {
    fn default() -> Self {
        Self {
            weight_cache_entries: 16,
            coarsen_size: 2,
            time_chunk: 30,
            zarr_chunk_size: 180,
            zarr_compression: ZarrCompression::BloscZstd,
            zarr_compression_level: 1,
            zarr_shuffle: true,
        }
    }
}

impl GridProcessorConfig {
    /// Overlay `CMIP_*` and `ZARR_*` environment variables. Unparseable
    /// values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("CMIP_WEIGHT_CACHE_ENTRIES") {
            if let Ok(n) = val.parse() {
                self.weight_cache_entries = n;
            }
        }

        if let Ok(val) = std::env::var("CMIP_COARSEN_SIZE") {
            if let Ok(n) = val.parse() {
                self.coarsen_size = n;
            }
        }

        if let Ok(val) = std::env::var("CMIP_TIME_CHUNK") {
            if let Ok(n) = val.parse() {
                self.time_chunk = n;
            }
        }

        if let Ok(val) = std::env::var("ZARR_CHUNK_SIZE") {
            if let Ok(size) = val.parse() {
                self.zarr_chunk_size = size;
            }
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION") {
            self.zarr_compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                self.zarr_compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            self.zarr_shuffle = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.weight_cache_entries == 0 {
            return Err("weight_cache_entries must be > 0".to_string());
        }

        if self.coarsen_size == 0 {
            return Err("coarsen_size must be > 0".to_string());
        }

        if self.time_chunk == 0 {
            return Err("time_chunk must be > 0".to_string());
        }

        if self.zarr_chunk_size == 0 {
            return Err("zarr_chunk_size must be > 0".to_string());
        }

        if self.zarr_compression_level == 0 || self.zarr_compression_level > 9 {
            return Err("zarr_compression_level must be 1-9".to_string());
        }

        Ok(())
    }
}

/// Compression codec for Zarr files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive). Unknown names fall back to blosc_zstd.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "blosc_lz4" | "lz4" => Self::BloscLz4,
            _ => Self::BloscZstd,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

use std::sync::Arc;

use chrono::NaiveDate;
use ndarray::{ArrayView, Dimension};
use serde_json::json;
use tracing::debug;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_storage::{ReadableStorageTraits, WritableStorageTraits};

use crate::config::{GridProcessorConfig, ZarrCompression};
use crate::error::{GridProcessorError, Result};
use crate::types::{Attrs, LatLonGrid};

/// CF units of the written time coordinate.
pub const TIME_UNITS: &str = "days since 1970-01-01";

/// CF calendar of the written time coordinate.
pub const TIME_CALENDAR: &str = "proleptic_gregorian";

/// Summary of a written array.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ZarrMetadata {
    pub variable: String,
    pub dims: Vec<String>,
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub dtype: String,
    /// Compression codec used.
    pub compression: String,
}

/// Result of writing a Zarr array.
#[derive(Debug)]
pub struct ZarrWriteResult {
    pub metadata: ZarrMetadata,
    /// Total bytes written (uncompressed).
    pub bytes_written: u64,
}

/// Writer for Zarr V3 datasets.
pub struct ZarrWriter {
    config: GridProcessorConfig,
}

impl ZarrWriter {
    /// Create a new ZarrWriter with the given configuration.
    pub fn new(config: GridProcessorConfig) -> Self {
        Self { config }
    }

    /// Write the root group with dataset attributes.
    pub fn write_group<S>(&self, storage: &Arc<S>, attrs: Attrs) -> Result<()>
    where
        S: ReadableStorageTraits + WritableStorageTraits + 'static,
    {
        GroupBuilder::new()
            .attributes(attrs)
            .build(storage.clone(), "/")
            .map_err(|e| GridProcessorError::ZarrError(e.to_string()))?
            .store_metadata()
            .map_err(|e| GridProcessorError::StorageError(e.to_string()))
    }

    /// Write an N-dimensional `f32` variable.
    ///
    /// `data` is in C order and must hold exactly `shape.iter().product()`
    /// values.
    pub fn write_array<S>(
        &self,
        storage: &Arc<S>,
        name: &str,
        dims: &[&str],
        shape: &[u64],
        data: &[f32],
        attrs: Attrs,
    ) -> Result<ZarrWriteResult>
    where
        S: ReadableStorageTraits + WritableStorageTraits + 'static,
    {
        let expected: u64 = shape.iter().product();
        if dims.len() != shape.len() || data.len() as u64 != expected {
            return Err(GridProcessorError::ShapeMismatch {
                expected: shape.iter().map(|&n| n as usize).collect(),
                found: vec![data.len()],
            });
        }

        let chunk_shape = self.chunk_shape(dims, shape);
        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .clone()
            .try_into()
            .map_err(|e| GridProcessorError::ConfigError(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(
            shape.to_vec(),
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        );
        let mut builder = binding
            .dimension_names(Some(dims.to_vec()))
            .attributes(attrs);

        if self.config.zarr_compression != ZarrCompression::None {
            let codec = self.create_compression_codec(4)?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(storage.clone(), &format!("/{name}"))
            .map_err(|e| GridProcessorError::ZarrError(e.to_string()))?;
        store(&array, shape, data)?;

        debug!(variable = name, shape = ?shape, "Wrote Zarr array");

        Ok(ZarrWriteResult {
            metadata: ZarrMetadata {
                variable: name.to_string(),
                dims: dims.iter().map(|d| d.to_string()).collect(),
                shape: shape.to_vec(),
                chunk_shape,
                dtype: "float32".to_string(),
                compression: self.config.zarr_compression.as_str().to_string(),
            },
            bytes_written: (data.len() * std::mem::size_of::<f32>()) as u64,
        })
    }

    /// Write a 1-D `f64` coordinate variable whose dimension is its own name.
    pub fn write_coordinate<S>(
        &self,
        storage: &Arc<S>,
        name: &str,
        values: &[f64],
        attrs: Attrs,
    ) -> Result<()>
    where
        S: ReadableStorageTraits + WritableStorageTraits + 'static,
    {
        let len = values.len() as u64;
        let chunk_grid: zarrs::array::ChunkGrid = vec![len.max(1)]
            .try_into()
            .map_err(|e| GridProcessorError::ConfigError(format!("{:?}", e)))?;

        let array = ArrayBuilder::new(
            vec![len],
            DataType::Float64,
            chunk_grid,
            FillValue::from(f64::NAN),
        )
        .dimension_names(Some(vec![name]))
        .attributes(attrs)
        .build(storage.clone(), &format!("/{name}"))
        .map_err(|e| GridProcessorError::ZarrError(e.to_string()))?;

        store(&array, &[len], values)
    }

    /// Write lat/lon coordinates with CF attributes.
    pub fn write_grid<S>(&self, storage: &Arc<S>, grid: &LatLonGrid) -> Result<()>
    where
        S: ReadableStorageTraits + WritableStorageTraits + 'static,
    {
        let mut lat_attrs = Attrs::new();
        lat_attrs.insert("units".into(), json!("degrees_north"));
        lat_attrs.insert("standard_name".into(), json!("latitude"));
        self.write_coordinate(storage, "lat", &grid.lat, lat_attrs)?;

        let mut lon_attrs = Attrs::new();
        lon_attrs.insert("units".into(), json!("degrees_east"));
        lon_attrs.insert("standard_name".into(), json!("longitude"));
        self.write_coordinate(storage, "lon", &grid.lon, lon_attrs)
    }

    /// Write a CF time coordinate in [`TIME_UNITS`].
    pub fn write_times<S>(&self, storage: &Arc<S>, times: &[NaiveDate]) -> Result<()>
    where
        S: ReadableStorageTraits + WritableStorageTraits + 'static,
    {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .ok_or_else(|| GridProcessorError::ConfigError("invalid time epoch".into()))?;
        let days: Vec<f64> = times
            .iter()
            .map(|t| t.signed_duration_since(epoch).num_days() as f64)
            .collect();

        let mut attrs = Attrs::new();
        attrs.insert("units".into(), json!(TIME_UNITS));
        attrs.insert("calendar".into(), json!(TIME_CALENDAR));
        attrs.insert("standard_name".into(), json!("time"));
        self.write_coordinate(storage, "time", &days, attrs)
    }

    /// Write an `ndarray` view of any rank under the given dimension names.
    pub fn write_ndarray<S, D>(
        &self,
        storage: &Arc<S>,
        name: &str,
        dims: &[&str],
        data: ArrayView<f32, D>,
        attrs: Attrs,
    ) -> Result<ZarrWriteResult>
    where
        S: ReadableStorageTraits + WritableStorageTraits + 'static,
        D: Dimension,
    {
        let shape: Vec<u64> = data.shape().iter().map(|&n| n as u64).collect();
        let values: Vec<f32> = data.iter().copied().collect();
        self.write_array(storage, name, dims, &shape, &values, attrs)
    }

    /// Chunking: one member per chunk along `ensemble`, `time_chunk` months
    /// along `time`, `zarr_chunk_size` along spatial axes.
    fn chunk_shape(&self, dims: &[&str], shape: &[u64]) -> Vec<u64> {
        dims.iter()
            .zip(shape)
            .map(|(dim, &len)| {
                let edge = match *dim {
                    "ensemble" => 1,
                    "time" => self.config.time_chunk as u64,
                    _ => self.config.zarr_chunk_size as u64,
                };
                edge.min(len).max(1)
            })
            .collect()
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
        element_size: usize,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.zarr_compression_level)
            .map_err(|_| GridProcessorError::ConfigError("Invalid compression level".to_string()))?;

        let shuffle = if self.config.zarr_shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = self.config.zarr_shuffle.then_some(element_size);

        let compressor = match self.config.zarr_compression {
            ZarrCompression::None => {
                return Err(GridProcessorError::ConfigError(
                    "No compression configured".to_string(),
                ))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| GridProcessorError::ConfigError(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

/// Store array metadata and, when non-empty, its elements.
fn store<S, T>(array: &Array<S>, shape: &[u64], data: &[T]) -> Result<()>
where
    S: ReadableStorageTraits + WritableStorageTraits + 'static,
    T: zarrs::array::Element,
{
    array
        .store_metadata()
        .map_err(|e| GridProcessorError::StorageError(e.to_string()))?;

    if data.is_empty() {
        return Ok(());
    }

    let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape.to_vec())
        .map_err(|e| GridProcessorError::StorageError(e.to_string()))?;
    array
        .store_array_subset_elements(&subset, data)
        .map_err(|e| GridProcessorError::StorageError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_shape_rules() {
        let writer = ZarrWriter::new(GridProcessorConfig::default());
        let chunks = writer.chunk_shape(&["ensemble", "time", "lat", "lon"], &[5, 120, 90, 180]);
        assert_eq!(chunks, vec![1, 30, 90, 180]);

        let chunks = writer.chunk_shape(&["time", "lat", "lon"], &[0, 180, 360]);
        assert_eq!(chunks, vec![1, 180, 180]);
    }
}

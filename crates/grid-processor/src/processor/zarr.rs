//! Reader for CF-style Zarr datasets (one group, one array per variable).

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_storage::ReadableStorageTraits;

use crate::error::{GridProcessorError, Result};
use crate::object_storage::{open_storage, StoreLocation};
use crate::types::Attrs;

type DynArray = Array<dyn ReadableStorageTraits>;

/// Shape, dimension names and attrs of one variable.
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<u64>,
    pub attrs: Attrs,
}

impl VariableInfo {
    /// Position of a dimension by name.
    pub fn dim_index(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }
}

/// Value decoding derived from CF attributes and the array fill value.
#[derive(Debug, Clone, Copy)]
struct Decoding {
    fill: [Option<f64>; 3],
    scale: f64,
    offset: f64,
}

impl Decoding {
    #[inline]
    fn apply(&self, raw: f64) -> f64 {
        if self.fill.iter().flatten().any(|f| *f == raw) {
            return f64::NAN;
        }
        raw * self.scale + self.offset
    }
}

/// Reads variables from a Zarr dataset store.
pub struct ZarrDatasetReader {
    storage: Arc<dyn ReadableStorageTraits>,
    location: String,
    attrs: Attrs,
}

impl ZarrDatasetReader {
    /// Open the store at `location` and read its root group attributes.
    pub fn open(location: &StoreLocation) -> Result<Self> {
        let storage = open_storage(location)?;
        Ok(Self::from_storage(storage, location.to_string()))
    }

    /// Wrap an already opened storage backend.
    pub fn from_storage(storage: Arc<dyn ReadableStorageTraits>, location: impl Into<String>) -> Self {
        let location = location.into();
        let attrs = match Group::open(storage.clone(), "/") {
            Ok(group) => group.attributes().clone(),
            Err(e) => {
                debug!(location = %location, error = %e, "No root group metadata");
                Attrs::new()
            }
        };
        Self {
            storage,
            location,
            attrs,
        }
    }

    /// Root group attributes.
    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn open_array(&self, name: &str) -> Result<DynArray> {
        Array::open(self.storage.clone(), &format!("/{name}")).map_err(|e| {
            GridProcessorError::NotFound(format!("{name} in {}: {e}", self.location))
        })
    }

    /// Whether the store has an array called `name`.
    pub fn has_variable(&self, name: &str) -> bool {
        self.open_array(name).is_ok()
    }

    /// Dimension names, shape and attributes of a variable.
    pub fn variable(&self, name: &str) -> Result<VariableInfo> {
        let array = self.open_array(name)?;
        let shape = array.shape().to_vec();
        let attrs = array.attributes().clone();
        let dims = dimension_names(&array, &attrs)
            .unwrap_or_else(|| (0..shape.len()).map(|i| format!("dim_{i}")).collect());

        if dims.len() != shape.len() {
            return Err(GridProcessorError::invalid_metadata(format!(
                "{name}: {} dimension names for {} axes",
                dims.len(),
                shape.len()
            )));
        }

        Ok(VariableInfo {
            name: name.to_string(),
            dims,
            shape,
            attrs,
        })
    }

    /// Read a whole variable as decoded `f64` values (typically a 1-D coordinate).
    pub fn read_f64(&self, name: &str) -> Result<Vec<f64>> {
        let array = self.open_array(name)?;
        let shape = array.shape().to_vec();
        let subset = ArraySubset::new_with_shape(shape);
        let decoding = decoding_for(&array);
        Ok(retrieve_raw(&array, &subset)?
            .into_iter()
            .map(|v| decoding.apply(v))
            .collect())
    }

    /// Read raw `f64` values of a whole variable without CF decoding.
    pub fn read_raw_f64(&self, name: &str) -> Result<Vec<f64>> {
        let array = self.open_array(name)?;
        let subset = ArraySubset::new_with_shape(array.shape().to_vec());
        retrieve_raw(&array, &subset)
    }

    /// Read a hyper-rectangle of a variable as decoded `f32` values, in
    /// C order.
    pub fn read_f32_block(&self, name: &str, start: &[u64], shape: &[u64]) -> Result<Vec<f32>> {
        let array = self.open_array(name)?;
        let subset = ArraySubset::new_with_start_shape(start.to_vec(), shape.to_vec())
            .map_err(|e| GridProcessorError::read_failed(e.to_string()))?;
        let decoding = decoding_for(&array);

        if let DataType::Float32 = array.data_type() {
            if decoding.scale == 1.0 && decoding.offset == 0.0 {
                let values = array
                    .retrieve_array_subset_elements::<f32>(&subset)
                    .map_err(|e| GridProcessorError::read_failed(format!("{name}: {e}")))?;
                return Ok(values
                    .into_iter()
                    .map(|v| {
                        if decoding.fill.iter().flatten().any(|f| *f == v as f64) {
                            f32::NAN
                        } else {
                            v
                        }
                    })
                    .collect());
            }
        }

        Ok(retrieve_raw(&array, &subset)?
            .into_iter()
            .map(|v| decoding.apply(v) as f32)
            .collect())
    }
}

/// Dimension names from array metadata, falling back to the xarray
/// `_ARRAY_DIMENSIONS` attribute.
fn dimension_names(array: &DynArray, attrs: &Attrs) -> Option<Vec<String>> {
    let from_metadata = serde_json::to_value(array.dimension_names())
        .ok()
        .and_then(|v| string_list(&v));
    from_metadata.or_else(|| attrs.get("_ARRAY_DIMENSIONS").and_then(string_list))
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn attr_f64(attrs: &Attrs, key: &str) -> Option<f64> {
    match attrs.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::Array(items) => items.first().and_then(Value::as_f64),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn decoding_for(array: &DynArray) -> Decoding {
    let attrs = array.attributes();
    // Attribute fill values are written at f64 precision; match them at the
    // stored precision.
    let stored = |v: Option<f64>| match array.data_type() {
        DataType::Float32 => v.map(|f| f as f32 as f64),
        _ => v,
    };
    Decoding {
        fill: [
            array_fill_value(array),
            stored(attr_f64(attrs, "_FillValue")),
            stored(attr_f64(attrs, "missing_value")),
        ],
        scale: attr_f64(attrs, "scale_factor").unwrap_or(1.0),
        offset: attr_f64(attrs, "add_offset").unwrap_or(0.0),
    }
}

/// The zarr-level fill value as `f64`, unless it is NaN.
fn array_fill_value(array: &DynArray) -> Option<f64> {
    let bytes = array.fill_value().as_ne_bytes();
    let value = match array.data_type() {
        DataType::Float32 => f32::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::Float64 => f64::from_ne_bytes(bytes.try_into().ok()?),
        DataType::Int8 => i8::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::Int16 => i16::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::Int32 => i32::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::Int64 => i64::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::UInt8 => u8::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::UInt16 => u16::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::UInt32 => u32::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::UInt64 => u64::from_ne_bytes(bytes.try_into().ok()?) as f64,
        _ => return None,
    };
    (!value.is_nan()).then_some(value)
}

/// Read a subset as `f64` regardless of the stored numeric type.
fn retrieve_raw(array: &DynArray, subset: &ArraySubset) -> Result<Vec<f64>> {
    macro_rules! read_as_f64 {
        ($t:ty) => {
            array
                .retrieve_array_subset_elements::<$t>(subset)
                .map_err(|e| GridProcessorError::read_failed(e.to_string()))?
                .into_iter()
                .map(|v| v as f64)
                .collect()
        };
    }

    let values: Vec<f64> = match array.data_type() {
        DataType::Float32 => read_as_f64!(f32),
        DataType::Float64 => read_as_f64!(f64),
        DataType::Int8 => read_as_f64!(i8),
        DataType::Int16 => read_as_f64!(i16),
        DataType::Int32 => read_as_f64!(i32),
        DataType::Int64 => read_as_f64!(i64),
        DataType::UInt8 => read_as_f64!(u8),
        DataType::UInt16 => read_as_f64!(u16),
        DataType::UInt32 => read_as_f64!(u32),
        DataType::UInt64 => read_as_f64!(u64),
        other => {
            return Err(GridProcessorError::UnsupportedDataType(format!("{other:?}")));
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoding_masks_then_scales() {
        let decoding = Decoding {
            fill: [None, Some(-999.0), None],
            scale: 0.5,
            offset: 10.0,
        };
        assert!(decoding.apply(-999.0).is_nan());
        assert_eq!(decoding.apply(4.0), 12.0);
    }

    #[test]
    fn test_attr_f64_forms() {
        let mut attrs = Attrs::new();
        attrs.insert("a".into(), serde_json::json!(1e20));
        attrs.insert("b".into(), serde_json::json!([2.5]));
        attrs.insert("c".into(), serde_json::json!("3"));
        attrs.insert("d".into(), serde_json::json!(true));
        assert_eq!(attr_f64(&attrs, "a"), Some(1e20));
        assert_eq!(attr_f64(&attrs, "b"), Some(2.5));
        assert_eq!(attr_f64(&attrs, "c"), Some(3.0));
        assert_eq!(attr_f64(&attrs, "d"), None);
        assert_eq!(attr_f64(&attrs, "missing"), None);
    }

    #[test]
    fn test_string_list() {
        let v = serde_json::json!(["time", "lat", "lon"]);
        assert_eq!(
            string_list(&v),
            Some(vec!["time".to_string(), "lat".to_string(), "lon".to_string()])
        );
        assert_eq!(string_list(&serde_json::json!(["time", null])), None);
    }
}

//! Native NetCDF access using the netcdf library.
//!
//! The netcdf library wraps libnetcdf/HDF5 and needs a file path, so only
//! local files are supported.

use std::path::{Path, PathBuf};
use std::sync::Once;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{NetCdfError, NetCdfResult};

/// Silence HDF5's automatic error printing to stderr for the whole process.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when checking for optional
/// attributes that don't exist):
///
/// ```text
/// HDF5-DIAG: Error detected in HDF5 (1.10.8) thread 3:
///   #003: ../../../src/H5Adense.c line 397 in H5A__dense_open(): can't locate attribute in name index
/// ```
///
/// Only needs to be called once per process, but is safe to call multiple times.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: passing no handler and a null client pointer disables
        // automatic printing for the default error stack.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Scoped silencing of HDF5's error printer.
///
/// Saves the current automatic error handler, disables it, and restores the
/// saved handler on drop.
pub struct Hdf5ErrorGuard {
    func: hdf5_metno_sys::h5e::H5E_auto2_t,
    client_data: *mut std::ffi::c_void,
    restore: bool,
}

impl Hdf5ErrorGuard {
    pub fn new() -> Self {
        let mut func: hdf5_metno_sys::h5e::H5E_auto2_t = None;
        let mut client_data: *mut std::ffi::c_void = std::ptr::null_mut();
        // SAFETY: out-pointers are valid for the duration of the call.
        let status = unsafe {
            hdf5_metno_sys::h5e::H5Eget_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                &mut func,
                &mut client_data,
            )
        };
        let restore = status >= 0;
        // SAFETY: see silence_hdf5_errors.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
        Self {
            func,
            client_data,
            restore,
        }
    }
}

impl Default for Hdf5ErrorGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Hdf5ErrorGuard {
    fn drop(&mut self) {
        if self.restore {
            // SAFETY: restores the handler returned by H5Eget_auto2.
            unsafe {
                hdf5_metno_sys::h5e::H5Eset_auto2(
                    hdf5_metno_sys::h5e::H5E_DEFAULT,
                    self.func,
                    self.client_data,
                );
            }
        }
    }
}

/// Name, dimensions and attributes of a variable.
#[derive(Debug, Clone)]
pub struct NetCdfVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    pub attrs: Map<String, Value>,
}

impl NetCdfVariable {
    pub fn dim_index(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// String attribute (e.g. `units`, `calendar`).
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }

    fn attr_f64(&self, name: &str) -> Option<f64> {
        match self.attrs.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::Array(items) => items.first().and_then(Value::as_f64),
            _ => None,
        }
    }
}

/// An open NetCDF file.
pub struct NetCdfDataset {
    file: netcdf::File,
    path: PathBuf,
}

impl NetCdfDataset {
    /// Open a local NetCDF file.
    ///
    /// HDF5's automatic error printing is switched off for the process on
    /// first use; optional attribute lookups would otherwise spam stderr.
    pub fn open(path: impl AsRef<Path>) -> NetCdfResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(NetCdfError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )));
        }
        silence_hdf5_errors();
        let file = netcdf::open(&path).map_err(|e| NetCdfError::OpenFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Opened NetCDF file");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all variables (coordinates included).
    pub fn variable_names(&self) -> Vec<String> {
        self.file.variables().map(|v| v.name()).collect()
    }

    /// Global attributes.
    pub fn global_attrs(&self) -> Map<String, Value> {
        self.file
            .attributes()
            .filter_map(|attr| {
                let value = attr.value().ok()?;
                Some((attr.name().to_string(), attribute_to_json(value)?))
            })
            .collect()
    }

    fn raw_variable(&self, name: &str) -> NetCdfResult<netcdf::Variable<'_>> {
        self.file
            .variable(name)
            .ok_or_else(|| NetCdfError::MissingData(format!("{name} variable")))
    }

    /// Dimensions and attributes of a variable.
    pub fn variable(&self, name: &str) -> NetCdfResult<NetCdfVariable> {
        let var = self.raw_variable(name)?;
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let attrs = var
            .attributes()
            .filter_map(|attr| {
                let value = attr.value().ok()?;
                Some((attr.name().to_string(), attribute_to_json(value)?))
            })
            .collect();
        Ok(NetCdfVariable {
            name: name.to_string(),
            dims,
            shape,
            attrs,
        })
    }

    /// Read a whole variable as CF-decoded `f64` values in C order.
    pub fn read_f64(&self, name: &str) -> NetCdfResult<Vec<f64>> {
        let info = self.variable(name)?;
        let var = self.raw_variable(name)?;
        let raw: Vec<f64> = var
            .get_values(..)
            .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to read {name}: {e}")))?;
        Ok(decode(&info, raw))
    }

    /// Read a whole variable as CF-decoded `f32` values in C order.
    pub fn read_f32(&self, name: &str) -> NetCdfResult<Vec<f32>> {
        Ok(self.read_f64(name)?.into_iter().map(|v| v as f32).collect())
    }
}

/// Mask fill values, then apply `scale_factor` and `add_offset`.
fn decode(info: &NetCdfVariable, raw: Vec<f64>) -> Vec<f64> {
    let fills: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|key| info.attr_f64(key))
        .collect();
    let scale = info.attr_f64("scale_factor").unwrap_or(1.0);
    let offset = info.attr_f64("add_offset").unwrap_or(0.0);

    raw.into_iter()
        .map(|v| {
            if fills.iter().any(|f| values_match(*f, v)) {
                f64::NAN
            } else {
                v * scale + offset
            }
        })
        .collect()
}

/// Fill values may be stored at f32 precision while data is read as f64.
fn values_match(fill: f64, value: f64) -> bool {
    fill == value || (fill as f32) == (value as f32)
}

/// Convert a NetCDF attribute into JSON. Unsupported kinds give `None`.
pub fn attribute_to_json(value: netcdf::AttributeValue) -> Option<Value> {
    use netcdf::AttributeValue as A;
    Some(match value {
        A::Str(s) => json!(s),
        A::Strs(s) => json!(s),
        A::Double(v) => json!(v),
        A::Doubles(v) => json!(v),
        A::Float(v) => json!(v),
        A::Floats(v) => json!(v),
        A::Int(v) => json!(v),
        A::Ints(v) => json!(v),
        A::Short(v) => json!(v),
        A::Shorts(v) => json!(v),
        A::Longlong(v) => json!(v),
        A::Longlongs(v) => json!(v),
        A::Uchar(v) => json!(v),
        A::Uchars(v) => json!(v),
        A::Schar(v) => json!(v),
        A::Schars(v) => json!(v),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(attrs: Value) -> NetCdfVariable {
        NetCdfVariable {
            name: "t2m".into(),
            dims: vec!["time".into(), "latitude".into(), "longitude".into()],
            shape: vec![1, 1, 3],
            attrs: attrs.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_decode_scale_offset_and_fill() {
        let var = info(json!({"scale_factor": 0.5, "add_offset": 200.0, "_FillValue": -32767}));
        let out = decode(&var, vec![10.0, -32767.0, 0.0]);
        assert_eq!(out[0], 205.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 200.0);
    }

    #[test]
    fn test_decode_f32_fill_precision() {
        let var = info(json!({"missing_value": 1e20}));
        let out = decode(&var, vec![1e20f32 as f64, 1.0]);
        assert!(out[0].is_nan());
        assert_eq!(out[1], 1.0);
    }

    #[test]
    fn test_variable_helpers() {
        let var = info(json!({"units": "K", "scale_factor": [2.0]}));
        assert_eq!(var.dim_index("latitude"), Some(1));
        assert_eq!(var.attr_str("units"), Some("K"));
        assert_eq!(var.attr_f64("scale_factor"), Some(2.0));
    }

    #[test]
    fn test_attribute_to_json() {
        assert_eq!(
            attribute_to_json(netcdf::AttributeValue::Str("K".into())),
            Some(json!("K"))
        );
        assert_eq!(
            attribute_to_json(netcdf::AttributeValue::Double(1.5)),
            Some(json!(1.5))
        );
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            NetCdfDataset::open("/definitely/not/here.nc"),
            Err(NetCdfError::IoError(_))
        ));
    }

    #[test]
    fn test_open_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.nc");
        std::fs::write(&path, b"not a netcdf file").unwrap();
        assert!(matches!(
            NetCdfDataset::open(&path),
            Err(NetCdfError::OpenFailed { .. })
        ));
        // The printer is already off; calling again is a no-op.
        silence_hdf5_errors();
    }

    #[test]
    fn test_silence_is_idempotent() {
        silence_hdf5_errors();
        silence_hdf5_errors();
        let guard = Hdf5ErrorGuard::new();
        drop(guard);
    }
}

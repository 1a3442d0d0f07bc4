//! Core types for grid processing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use chrono::NaiveDate;
use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::downsample::nan_mean;
use crate::error::{GridProcessorError, Result};

/// Free-form dataset attributes, kept as a JSON object.
pub type Attrs = serde_json::Map<String, serde_json::Value>;

/// Tolerance used when comparing coordinate labels.
const LABEL_TOLERANCE: f64 = 1e-6;

/// Rectilinear latitude/longitude axes (cell centres, degrees).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLonGrid {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
}

impl LatLonGrid {
    /// Create a grid from explicit axis labels.
    pub fn new(lat: Vec<f64>, lon: Vec<f64>) -> Self {
        Self { lat, lon }
    }

    /// Create an evenly spaced grid.
    pub fn regular(lat0: f64, dlat: f64, nlat: usize, lon0: f64, dlon: f64, nlon: usize) -> Self {
        Self {
            lat: (0..nlat).map(|j| lat0 + j as f64 * dlat).collect(),
            lon: (0..nlon).map(|i| lon0 + i as f64 * dlon).collect(),
        }
    }

    /// The common 1°×1° output grid: lat -89.5..89.5, lon 0.5..359.5.
    pub fn common() -> Self {
        Self::regular(-89.5, 1.0, 180, 0.5, 1.0, 360)
    }

    /// (nlat, nlon)
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }

    /// Hash of both axes, used to key cached regrid weights.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.lat.len().hash(&mut hasher);
        for v in &self.lat {
            v.to_bits().hash(&mut hasher);
        }
        self.lon.len().hash(&mut hasher);
        for v in &self.lon {
            v.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// True when both grids have the same lat and lon label sets,
    /// regardless of axis order.
    pub fn same_cells(&self, other: &LatLonGrid) -> bool {
        axis_permutation(&other.lat, &self.lat).is_some()
            && axis_permutation(&other.lon, &self.lon).is_some()
    }
}

/// Index map taking labels in `from` order to `to` order, if both axes hold
/// the same set of labels.
pub fn axis_permutation(from: &[f64], to: &[f64]) -> Option<Vec<usize>> {
    if from.len() != to.len() {
        return None;
    }
    let mut used = vec![false; from.len()];
    let mut perm = Vec::with_capacity(to.len());
    for target in to {
        let idx = from
            .iter()
            .enumerate()
            .position(|(i, v)| !used[i] && (v - target).abs() <= LABEL_TOLERANCE)?;
        used[idx] = true;
        perm.push(idx);
    }
    Some(perm)
}

/// Labels attached to one ensemble member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberLabels {
    /// `institution-source-member`, or `ens-mean`.
    pub ensemble: String,
    pub member_id: String,
    pub source_id: String,
    pub mip_id: String,
}

/// One variable over (time, lat, lon).
#[derive(Debug, Clone)]
pub struct GriddedField {
    pub variable: String,
    /// Monthly labels, first day of each month once normalised.
    pub times: Vec<NaiveDate>,
    pub grid: LatLonGrid,
    /// Values in (time, lat, lon) order.
    pub data: Array3<f32>,
    pub attrs: Attrs,
    pub labels: Option<MemberLabels>,
}

impl GriddedField {
    /// Build a field, checking the data shape against the labels.
    pub fn new(
        variable: impl Into<String>,
        times: Vec<NaiveDate>,
        grid: LatLonGrid,
        data: Array3<f32>,
        attrs: Attrs,
    ) -> Result<Self> {
        let expected = vec![times.len(), grid.lat.len(), grid.lon.len()];
        if data.shape() != expected.as_slice() {
            return Err(GridProcessorError::ShapeMismatch {
                expected,
                found: data.shape().to_vec(),
            });
        }
        Ok(Self {
            variable: variable.into(),
            times,
            grid,
            data,
            attrs,
            labels: None,
        })
    }

    /// (ntime, nlat, nlon)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Copy of the field restricted to a range of time indices.
    pub fn select_times(&self, range: Range<usize>) -> Self {
        Self {
            variable: self.variable.clone(),
            times: self.times[range.clone()].to_vec(),
            grid: self.grid.clone(),
            data: self.data.slice(s![range, .., ..]).to_owned(),
            attrs: self.attrs.clone(),
            labels: self.labels.clone(),
        }
    }

    /// Multiply every value by `factor`.
    pub fn scale(&mut self, factor: f32) {
        self.data.mapv_inplace(|v| v * factor);
    }

    /// Replace every value with NaN.
    pub fn fill_nan(&mut self) {
        self.data.fill(f32::NAN);
    }

    /// Reverse the latitude labels, leaving the values in place.
    pub fn reverse_lat_labels(&mut self) {
        self.grid.lat.reverse();
    }

    /// Data reordered so its lat/lon axes follow `grid`'s label order.
    /// `None` when the label sets differ.
    pub fn aligned_to(&self, grid: &LatLonGrid) -> Option<Array3<f32>> {
        let lat_perm = axis_permutation(&self.grid.lat, &grid.lat)?;
        let lon_perm = axis_permutation(&self.grid.lon, &grid.lon)?;
        fn identity(p: &[usize]) -> bool {
            p.iter().enumerate().all(|(i, &j)| i == j)
        }
        if identity(&lat_perm) && identity(&lon_perm) {
            return Some(self.data.clone());
        }
        Some(
            self.data
                .select(Axis(1), &lat_perm)
                .select(Axis(2), &lon_perm),
        )
    }

    /// NaN-skipping mean over the time axis.
    pub fn time_mean(&self) -> ClimatologyField {
        let (_, nlat, nlon) = self.shape();
        let data = Array2::from_shape_fn((nlat, nlon), |(j, i)| {
            nan_mean(self.data.slice(s![.., j, i]).iter().copied())
        });
        ClimatologyField {
            variable: self.variable.clone(),
            grid: self.grid.clone(),
            data,
            attrs: self.attrs.clone(),
        }
    }
}

/// A time-averaged (lat, lon) field.
#[derive(Debug, Clone)]
pub struct ClimatologyField {
    pub variable: String,
    pub grid: LatLonGrid,
    pub data: Array2<f32>,
    pub attrs: Attrs,
}

impl ClimatologyField {
    /// Build a climatology, checking the data shape against the labels.
    pub fn new(
        variable: impl Into<String>,
        grid: LatLonGrid,
        data: Array2<f32>,
        attrs: Attrs,
    ) -> Result<Self> {
        let expected = vec![grid.lat.len(), grid.lon.len()];
        if data.shape() != expected.as_slice() {
            return Err(GridProcessorError::ShapeMismatch {
                expected,
                found: data.shape().to_vec(),
            });
        }
        Ok(Self {
            variable: variable.into(),
            grid,
            data,
            attrs,
        })
    }

    /// Multiply every value by `factor`.
    pub fn scale(&mut self, factor: f32) {
        self.data.mapv_inplace(|v| v * factor);
    }
}

/// Statistics about the regrid weight cache.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

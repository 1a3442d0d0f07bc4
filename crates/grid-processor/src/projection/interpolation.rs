//! Bilinear interpolation between rectilinear grids.
//!
//! Weights are separable: each target latitude and longitude is bracketed
//! by two source labels independently, so the per-cell cost is four reads
//! and one blend. Longitude is periodic: the bracket for a target east of
//! the last source column wraps to the first column. Target latitudes
//! outside the source span have no bracket and come out NaN.

use ndarray::{s, Array2, Array3, ArrayView2};
use tracing::debug;

use crate::error::{GridProcessorError, Result};
use crate::types::{ClimatologyField, GriddedField, LatLonGrid};

/// Blend four corner values.
///
/// `xf`/`yf` are the fractional offsets from the `v00` corner along the two
/// axes. If any corner is NaN the result is NaN.
#[inline]
pub fn bilinear_blend(v00: f32, v10: f32, v01: f32, v11: f32, xf: f32, yf: f32) -> f32 {
    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Source indices and fractional weight along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisWeight {
    lo: usize,
    hi: usize,
    frac: f32,
}

/// Labels closer than this (in degrees) are the same longitude.
const LON_TOLERANCE: f64 = 1e-9;

/// Sorted view of an axis: (label, original index), strictly increasing.
///
/// With `merge_repeats`, a label equal to an earlier one is dropped and the
/// lowest index wins; otherwise repeats are an error.
fn sorted_axis(
    name: &str,
    labels: impl Iterator<Item = f64>,
    merge_repeats: bool,
) -> Result<Vec<(f64, usize)>> {
    let mut sorted: Vec<(f64, usize)> = labels.enumerate().map(|(i, v)| (v, i)).collect();
    if sorted.is_empty() {
        return Err(GridProcessorError::regrid(format!("source {name} axis is empty")));
    }
    if sorted.iter().any(|(v, _)| !v.is_finite()) {
        return Err(GridProcessorError::regrid(format!(
            "source {name} axis has non-finite labels"
        )));
    }
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    if merge_repeats {
        sorted.dedup_by(|next, prev| next.0 - prev.0 <= LON_TOLERANCE);
    }
    if sorted.windows(2).any(|w| w[1].0 - w[0].0 <= 0.0) {
        return Err(GridProcessorError::regrid(format!(
            "source {name} axis has duplicate labels"
        )));
    }
    Ok(sorted)
}

fn lat_weights(source: &[f64], target: &[f64]) -> Result<Vec<Option<AxisWeight>>> {
    let sorted = sorted_axis("lat", source.iter().copied(), false)?;
    let first = sorted[0].0;
    let last = sorted[sorted.len() - 1].0;

    Ok(target
        .iter()
        .map(|&y| {
            if y < first || y > last {
                return None;
            }
            if sorted.len() == 1 {
                let idx = sorted[0].1;
                return Some(AxisWeight { lo: idx, hi: idx, frac: 0.0 });
            }
            let p = sorted.partition_point(|(v, _)| *v <= y);
            let k = p.saturating_sub(1).min(sorted.len() - 2);
            let (y0, i0) = sorted[k];
            let (y1, i1) = sorted[k + 1];
            Some(AxisWeight {
                lo: i0,
                hi: i1,
                frac: ((y - y0) / (y1 - y0)) as f32,
            })
        })
        .collect())
}

/// Longitudes are taken mod 360, so a repeated wrap-around column (0 and
/// 360, or -180 and 180) collapses onto its first occurrence.
fn lon_weights(source: &[f64], target: &[f64]) -> Result<Vec<AxisWeight>> {
    let sorted = sorted_axis("lon", source.iter().map(|v| v.rem_euclid(360.0)), true)?;
    let n = sorted.len();
    let (first, first_idx) = sorted[0];
    let (last, last_idx) = sorted[n - 1];
    let wrap_span = first + 360.0 - last;

    Ok(target
        .iter()
        .map(|&x| {
            let x = x.rem_euclid(360.0);
            let p = sorted.partition_point(|(v, _)| *v <= x);
            if p == 0 || p == n {
                // Between the last column and the first one, across the seam.
                let offset = if p == 0 { x + 360.0 - last } else { x - last };
                AxisWeight {
                    lo: last_idx,
                    hi: first_idx,
                    frac: (offset / wrap_span) as f32,
                }
            } else {
                let (x0, i0) = sorted[p - 1];
                let (x1, i1) = sorted[p];
                AxisWeight {
                    lo: i0,
                    hi: i1,
                    frac: ((x - x0) / (x1 - x0)) as f32,
                }
            }
        })
        .collect())
}

/// Precomputed bilinear weights from one source grid onto one target grid.
#[derive(Debug, Clone)]
pub struct Regridder {
    source_shape: (usize, usize),
    source_fingerprint: u64,
    target: LatLonGrid,
    lat: Vec<Option<AxisWeight>>,
    lon: Vec<AxisWeight>,
}

impl Regridder {
    /// Compute weights. Fails when a source axis is empty or non-finite, or
    /// when latitude has repeated labels.
    pub fn new(source: &LatLonGrid, target: &LatLonGrid) -> Result<Self> {
        let lat = lat_weights(&source.lat, &target.lat)?;
        let lon = lon_weights(&source.lon, &target.lon)?;

        let unmapped = lat.iter().filter(|w| w.is_none()).count();
        debug!(
            source_lat = source.lat.len(),
            source_lon = source.lon.len(),
            target_lat = target.lat.len(),
            target_lon = target.lon.len(),
            unmapped_lat = unmapped,
            "Computed bilinear weights"
        );

        Ok(Self {
            source_shape: source.shape(),
            source_fingerprint: source.fingerprint(),
            target: target.clone(),
            lat,
            lon,
        })
    }

    /// The grid this regridder produces.
    pub fn target(&self) -> &LatLonGrid {
        &self.target
    }

    /// Whether these weights were built for `grid`.
    pub fn matches_source(&self, grid: &LatLonGrid) -> bool {
        grid.shape() == self.source_shape && grid.fingerprint() == self.source_fingerprint
    }

    /// Regrid one (lat, lon) slice.
    pub fn regrid_slice(&self, data: ArrayView2<f32>) -> Result<Array2<f32>> {
        if data.dim() != self.source_shape {
            return Err(GridProcessorError::ShapeMismatch {
                expected: vec![self.source_shape.0, self.source_shape.1],
                found: data.shape().to_vec(),
            });
        }

        let out = Array2::from_shape_fn((self.lat.len(), self.lon.len()), |(j, i)| {
            let Some(wy) = self.lat[j] else {
                return f32::NAN;
            };
            let wx = self.lon[i];
            bilinear_blend(
                data[[wy.lo, wx.lo]],
                data[[wy.lo, wx.hi]],
                data[[wy.hi, wx.lo]],
                data[[wy.hi, wx.hi]],
                wx.frac,
                wy.frac,
            )
        });
        Ok(out)
    }

    fn check_source(&self, grid: &LatLonGrid) -> Result<()> {
        if self.matches_source(grid) {
            Ok(())
        } else {
            Err(GridProcessorError::regrid(
                "field grid differs from the grid these weights were built for",
            ))
        }
    }

    /// Regrid every time step. Attrs and member labels are copied across.
    pub fn regrid_field(&self, field: &GriddedField) -> Result<GriddedField> {
        self.check_source(&field.grid)?;

        let (nt, _, _) = field.shape();
        let (ny, nx) = self.target.shape();
        let mut data = Array3::from_elem((nt, ny, nx), f32::NAN);
        for t in 0..nt {
            let slice = self.regrid_slice(field.data.slice(s![t, .., ..]))?;
            data.slice_mut(s![t, .., ..]).assign(&slice);
        }

        Ok(GriddedField {
            variable: field.variable.clone(),
            times: field.times.clone(),
            grid: self.target.clone(),
            data,
            attrs: field.attrs.clone(),
            labels: field.labels.clone(),
        })
    }

    /// Regrid a climatology.
    pub fn regrid_climatology(&self, field: &ClimatologyField) -> Result<ClimatologyField> {
        self.check_source(&field.grid)?;
        Ok(ClimatologyField {
            variable: field.variable.clone(),
            grid: self.target.clone(),
            data: self.regrid_slice(field.data.view())?,
            attrs: field.attrs.clone(),
        })
    }
}

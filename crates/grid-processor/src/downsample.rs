//! Block-mean coarsening of gridded fields.
//!
//! Coarsening reduces the (lat, lon) resolution by averaging fixed-size
//! blocks. Alignment is exact: an axis whose length is not a multiple of
//! the block size is an error rather than being trimmed or padded.

use ndarray::{s, Array2, Array3, ArrayView2};
use num_traits::Float;

use crate::error::{GridProcessorError, Result};
use crate::types::{ClimatologyField, GriddedField, LatLonGrid};

/// Mean of the non-NaN values. All-NaN (or empty) input gives NaN.
pub fn nan_mean<T: Float>(values: impl IntoIterator<Item = T>) -> T {
    let mut sum = T::zero();
    let mut count = 0usize;

    for v in values {
        if !v.is_nan() {
            sum = sum + v;
            count += 1;
        }
    }

    if count == 0 {
        T::nan()
    } else {
        sum / <T as num_traits::NumCast>::from(count).unwrap_or_else(T::one)
    }
}

fn check_exact(axis: &str, len: usize, factor: usize) -> Result<()> {
    if factor == 0 {
        return Err(GridProcessorError::coarsen("block size must be > 0"));
    }
    if len % factor != 0 {
        return Err(GridProcessorError::coarsen(format!(
            "{axis} length {len} is not a multiple of block size {factor}"
        )));
    }
    Ok(())
}

/// Coarsen a (lat, lon) slice by averaging `factor`×`factor` blocks.
///
/// NaN values are skipped inside each block; a block with no valid value
/// stays NaN.
pub fn coarsen_mean(data: ArrayView2<f32>, factor: usize) -> Result<Array2<f32>> {
    let (ny, nx) = data.dim();
    check_exact("lat", ny, factor)?;
    check_exact("lon", nx, factor)?;

    let out = Array2::from_shape_fn((ny / factor, nx / factor), |(j, i)| {
        let block = data.slice(s![j * factor..(j + 1) * factor, i * factor..(i + 1) * factor]);
        nan_mean(block.iter().copied())
    });
    Ok(out)
}

/// Block-average coordinate labels.
pub fn coarsen_labels(labels: &[f64], factor: usize) -> Result<Vec<f64>> {
    check_exact("coordinate", labels.len(), factor)?;
    Ok(labels
        .chunks(factor)
        .map(|block| block.iter().sum::<f64>() / factor as f64)
        .collect())
}

fn coarsen_grid(grid: &LatLonGrid, factor: usize) -> Result<LatLonGrid> {
    check_exact("lat", grid.lat.len(), factor)?;
    check_exact("lon", grid.lon.len(), factor)?;
    Ok(LatLonGrid::new(
        coarsen_labels(&grid.lat, factor)?,
        coarsen_labels(&grid.lon, factor)?,
    ))
}

/// Coarsen every time step of a field. Time labels, attrs and member
/// labels are carried over unchanged.
pub fn coarsen_field(field: &GriddedField, factor: usize) -> Result<GriddedField> {
    let grid = coarsen_grid(&field.grid, factor)?;
    let (nt, _, _) = field.shape();
    let (ny, nx) = grid.shape();

    let mut data = Array3::from_elem((nt, ny, nx), f32::NAN);
    for t in 0..nt {
        let coarse = coarsen_mean(field.data.slice(s![t, .., ..]), factor)?;
        data.slice_mut(s![t, .., ..]).assign(&coarse);
    }

    Ok(GriddedField {
        variable: field.variable.clone(),
        times: field.times.clone(),
        grid,
        data,
        attrs: field.attrs.clone(),
        labels: field.labels.clone(),
    })
}

/// Coarsen a climatology.
pub fn coarsen_climatology(field: &ClimatologyField, factor: usize) -> Result<ClimatologyField> {
    let grid = coarsen_grid(&field.grid, factor)?;
    let data = coarsen_mean(field.data.view(), factor)?;
    Ok(ClimatologyField {
        variable: field.variable.clone(),
        grid,
        data,
        attrs: field.attrs.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Attrs;
    use chrono::NaiveDate;

    #[test]
    fn test_coarsen_mean_4x4() {
        // 4x4 grid with values 1-16
        let data = Array2::from_shape_fn((4, 4), |(j, i)| (j * 4 + i + 1) as f32);
        let result = coarsen_mean(data.view(), 2).unwrap();

        assert_eq!(result.dim(), (2, 2));
        // Top-left 2x2 block: 1,2,5,6 -> mean = 3.5
        assert!((result[[0, 0]] - 3.5).abs() < 0.001);
        // Top-right 2x2 block: 3,4,7,8 -> mean = 5.5
        assert!((result[[0, 1]] - 5.5).abs() < 0.001);
        assert!((result[[1, 1]] - 13.5).abs() < 0.001);
    }

    #[test]
    fn test_coarsen_handles_nan() {
        let data = Array2::from_shape_vec((2, 2), vec![1.0, f32::NAN, 3.0, 4.0]).unwrap();
        let result = coarsen_mean(data.view(), 2).unwrap();
        // Mean of 1, 3, 4 (ignoring NaN)
        assert!((result[[0, 0]] - 8.0 / 3.0).abs() < 0.001);

        let all_nan = Array2::from_elem((2, 2), f32::NAN);
        assert!(coarsen_mean(all_nan.view(), 2).unwrap()[[0, 0]].is_nan());
    }

    #[test]
    fn test_coarsen_rejects_inexact() {
        let data = Array2::<f32>::zeros((3, 4));
        let err = coarsen_mean(data.view(), 2).unwrap_err();
        assert!(matches!(err, GridProcessorError::CoarsenError(_)));
        assert!(coarsen_labels(&[1.0, 2.0, 3.0], 2).is_err());
    }

    #[test]
    fn test_coarsen_labels() {
        let labels = coarsen_labels(&[-89.5, -88.5, -87.5, -86.5], 2).unwrap();
        assert_eq!(labels, vec![-89.0, -87.0]);
    }

    #[test]
    fn test_coarsen_common_grid_halves_axes() {
        let grid = LatLonGrid::common();
        let times = vec![NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()];
        let data = Array3::from_elem((1, 180, 360), 2.0f32);
        let field = GriddedField::new("tas", times, grid, data, Attrs::new()).unwrap();

        let coarse = coarsen_field(&field, 2).unwrap();
        assert_eq!(coarse.shape(), (1, 90, 180));
        assert_eq!(coarse.grid.lat[0], -89.0);
        assert_eq!(coarse.grid.lon[179], 359.0);
        assert!(coarse.data.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_nan_mean_generic() {
        assert_eq!(nan_mean([1.0f64, 2.0, 3.0]), 2.0);
        assert!(nan_mean(Vec::<f32>::new()).is_nan());
    }
}

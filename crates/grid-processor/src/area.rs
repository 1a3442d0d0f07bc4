//! Grid-cell areas on a spherical Earth.

use ndarray::Array2;

use crate::downsample::coarsen_mean;
use crate::error::Result;
use crate::types::LatLonGrid;

/// Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6.378e6;

/// Area in m² of each (lat, lon) cell of `grid`, for cells of `dlat`×`dlon`
/// degrees centred on the grid labels.
///
/// With `coarsen_size > 1` the areas are block-averaged with the same exact
/// alignment rules as [`coarsen_mean`].
pub fn calc_area(grid: &LatLonGrid, dlat: f64, dlon: f64, coarsen_size: usize) -> Result<Array2<f32>> {
    let (ny, nx) = grid.shape();
    let dy = dlat.to_radians() * EARTH_RADIUS_M;
    let areas = Array2::from_shape_fn((ny, nx), |(j, _)| {
        let dx = dlon.to_radians() * EARTH_RADIUS_M * grid.lat[j].to_radians().cos();
        (dy * dx) as f32
    });

    if coarsen_size > 1 {
        coarsen_mean(areas.view(), coarsen_size)
    } else {
        Ok(areas)
    }
}

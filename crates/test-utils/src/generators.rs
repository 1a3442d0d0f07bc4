//! Generators for synthetic climate-model-like axes and fields.
//!
//! Values follow simple closed-form patterns so tests can check results
//! without reference files.

/// Days in each month of a 365-day (noleap) year.
pub const NOLEAP_MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// An evenly spaced axis: `start, start + step, ...` (`n` values).
///
/// ```
/// use test_utils::regular_axis;
///
/// assert_eq!(regular_axis(-60.0, 60.0, 3), vec![-60.0, 0.0, 60.0]);
/// ```
pub fn regular_axis(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// A typical model latitude axis: cell centres from south to north with
/// spacing `step`, e.g. 2.5° gives -88.75..88.75.
pub fn model_lat_axis(step: f64) -> Vec<f64> {
    let n = (180.0 / step).round() as usize;
    regular_axis(-90.0 + step / 2.0, step, n)
}

/// A typical model longitude axis starting at 0° with spacing `step`.
pub fn model_lon_axis(step: f64) -> Vec<f64> {
    let n = (360.0 / step).round() as usize;
    regular_axis(0.0, step, n)
}

/// Mid-month time values in "days since `epoch_year`-01-01" on a noleap
/// calendar, for `n_months` months starting January of `start_year`.
///
/// ```
/// use test_utils::noleap_mid_month_days;
///
/// let days = noleap_mid_month_days(1850, 1850, 2);
/// assert_eq!(days, vec![14.0, 45.0]);
/// ```
pub fn noleap_mid_month_days(epoch_year: i32, start_year: i32, n_months: usize) -> Vec<f64> {
    (0..n_months)
        .map(|i| {
            let year = start_year + (i / 12) as i32;
            let month = i % 12;
            let before: u32 = NOLEAP_MONTH_DAYS[..month].iter().sum();
            ((year - epoch_year) as i64 * 365 + before as i64 + 14) as f64
        })
        .collect()
}

/// Mid-month time values in "days since `epoch_year`-01-01" on a 360-day
/// calendar.
pub fn day360_mid_month_days(epoch_year: i32, start_year: i32, n_months: usize) -> Vec<f64> {
    (0..n_months)
        .map(|i| ((start_year - epoch_year) as i64 * 360 + i as i64 * 30 + 14) as f64)
        .collect()
}

/// A (time, lat, lon) cube in C order where each value is
/// `t * 10000 + j * 100 + i`.
///
/// ```
/// use test_utils::create_index_cube;
///
/// let cube = create_index_cube(2, 3, 4);
/// assert_eq!(cube.len(), 24);
/// assert_eq!(cube[23], 10203.0);
/// ```
pub fn create_index_cube(nt: usize, nlat: usize, nlon: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(nt * nlat * nlon);
    for t in 0..nt {
        for j in 0..nlat {
            for i in 0..nlon {
                data.push((t * 10000 + j * 100 + i) as f32);
            }
        }
    }
    data
}

/// A constant cube.
pub fn create_constant_cube(nt: usize, nlat: usize, nlon: usize, value: f32) -> Vec<f32> {
    vec![value; nt * nlat * nlon]
}

/// A temperature-like cube in Kelvin: warm at the equator, cold at the
/// poles, with a small seasonal offset per time step.
pub fn create_temperature_cube(nt: usize, lat: &[f64], nlon: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(nt * lat.len() * nlon);
    for t in 0..nt {
        let seasonal = ((t % 12) as f64 / 12.0 * std::f64::consts::TAU).sin() * 2.0;
        for &y in lat {
            let base = 300.0 - 50.0 * y.to_radians().sin().powi(2);
            data.extend(std::iter::repeat((base + seasonal) as f32).take(nlon));
        }
    }
    data
}

/// A cube with NaN in the given (t, j, i) cells.
pub fn create_cube_with_nans(
    nt: usize,
    nlat: usize,
    nlon: usize,
    value: f32,
    nan_cells: &[(usize, usize, usize)],
) -> Vec<f32> {
    let mut data = create_constant_cube(nt, nlat, nlon, value);
    for &(t, j, i) in nan_cells {
        if t < nt && j < nlat && i < nlon {
            data[(t * nlat + j) * nlon + i] = f32::NAN;
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_axes() {
        let lat = model_lat_axis(2.5);
        assert_eq!(lat.len(), 72);
        assert_eq!(lat[0], -88.75);
        assert_eq!(lat[71], 88.75);

        let lon = model_lon_axis(3.75);
        assert_eq!(lon.len(), 96);
        assert_eq!(lon[95], 356.25);
    }

    #[test]
    fn test_noleap_days_cross_year() {
        let days = noleap_mid_month_days(1850, 1851, 13);
        assert_eq!(days[0], 379.0);
        assert_eq!(days[12], 744.0);
    }

    #[test]
    fn test_day360_days() {
        let days = day360_mid_month_days(1850, 1850, 3);
        assert_eq!(days, vec![14.0, 44.0, 74.0]);
    }

    #[test]
    fn test_temperature_cube_shape() {
        let lat = vec![-45.0, 0.0, 45.0];
        let cube = create_temperature_cube(2, &lat, 4);
        assert_eq!(cube.len(), 24);
        // equator warmer than mid-latitudes
        assert!(cube[4] > cube[0]);
    }

    #[test]
    fn test_cube_with_nans() {
        let cube = create_cube_with_nans(1, 2, 2, 1.0, &[(0, 1, 1), (5, 0, 0)]);
        assert!(cube[3].is_nan());
        assert_eq!(cube.iter().filter(|v| v.is_nan()).count(), 1);
    }
}

//! Reanalysis reference climatology from a local NetCDF file.
//!
//! Every (time, lat, lon) variable is averaged over the requested months,
//! renamed to its model-archive name, converted to model units, regridded
//! onto the common grid and coarsened like the model members.

use std::path::Path;

use ndarray::Array3;
use serde_json::json;
use tracing::{debug, info};

use cmip_common::{decode_cf_times, replace_dates, TimeSlice};
use grid_processor::{
    coarsen_climatology, Attrs, ClimatologyField, GriddedField, LatLonGrid, WeightCache,
};
use netcdf_parser::{NetCdfDataset, NetCdfVariable};

use crate::error::{IngestionError, Result};
use crate::normalize::{canonical_dim, TIME_DIM};
use crate::quiet::HiddenOutput;

/// Reanalysis short names and their model-archive equivalents.
pub const VARIABLE_RENAMES: [(&str, &str); 3] = [("msl", "psl"), ("t2m", "tas"), ("tp", "pr")];

/// m/day of water to kg m⁻² s⁻¹.
pub const M_PER_DAY_TO_FLUX: f32 = 1000.0 / (24.0 * 60.0 * 60.0);

/// Model-archive name for a reanalysis variable.
pub fn archive_name(name: &str) -> &str {
    VARIABLE_RENAMES
        .iter()
        .find(|(from, _)| *from == name)
        .map_or(name, |&(_, to)| to)
}

/// Time-mean reference fields on the (coarsened) common grid.
#[derive(Debug, Clone)]
pub struct ReanalysisClimatology {
    pub fields: Vec<ClimatologyField>,
    pub attrs: Attrs,
}

impl ReanalysisClimatology {
    pub fn get(&self, variable: &str) -> Option<&ClimatologyField> {
        self.fields.iter().find(|f| f.variable == variable)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.variable.as_str())
    }
}

/// Load and reduce a reanalysis file.
pub fn load_reanalysis(
    path: impl AsRef<Path>,
    timeslice: Option<&TimeSlice>,
    coarsen_size: usize,
    weights: &mut WeightCache,
) -> Result<ReanalysisClimatology> {
    let path = path.as_ref();
    let dataset = NetCdfDataset::open(path)?;

    let time = dataset.variable(TIME_DIM)?;
    let units = time
        .attr_str("units")
        .ok_or_else(|| IngestionError::MissingMetadata("time units".to_string()))?;
    let raw_times = dataset.read_f64(TIME_DIM)?;
    let dates = decode_cf_times(&raw_times, units, time.attr_str("calendar"))?;
    let times = replace_dates(&dates, None, None, None)?;
    let range = match timeslice {
        Some(slice) => slice.select(&times)?,
        None => 0..times.len(),
    };

    let target = LatLonGrid::common();
    let mut fields = Vec::new();

    for name in dataset.variable_names() {
        let info = dataset.variable(&name)?;
        if !is_time_lat_lon(&info) {
            debug!(variable = %name, dims = ?info.dims, "Skipping non-gridded variable");
            continue;
        }

        let grid = LatLonGrid::new(dataset.read_f64(&info.dims[1])?, dataset.read_f64(&info.dims[2])?);
        let values = dataset.read_f32(&name)?;
        let data = Array3::from_shape_vec((times.len(), grid.lat.len(), grid.lon.len()), values)
            .map_err(|e| IngestionError::layout(&name, e.to_string()))?;

        let field = GriddedField::new(name.as_str(), times.clone(), grid, data, info.attrs.clone())?;
        let mut climatology = field.select_times(range.clone()).time_mean();
        climatology.variable = archive_name(&name).to_string();
        if climatology.variable == "pr" {
            climatology.scale(M_PER_DAY_TO_FLUX);
        }

        let regridded = {
            let _quiet = HiddenOutput::new();
            let regridder = weights.get_or_build(&climatology.grid, &target)?;
            regridder.regrid_climatology(&climatology)?
        };
        fields.push(coarsen_climatology(&regridded, coarsen_size)?);
    }

    let mut attrs = dataset.global_attrs();
    attrs.insert("months".to_string(), json!(range.len()));

    info!(
        path = %path.display(),
        variables = fields.len(),
        months = range.len(),
        "Loaded reanalysis climatology"
    );

    Ok(ReanalysisClimatology { fields, attrs })
}

fn is_time_lat_lon(info: &NetCdfVariable) -> bool {
    let dims: Vec<&str> = info.dims.iter().map(|d| canonical_dim(d)).collect();
    dims == [TIME_DIM, "lat", "lon"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_names() {
        assert_eq!(archive_name("msl"), "psl");
        assert_eq!(archive_name("t2m"), "tas");
        assert_eq!(archive_name("tp"), "pr");
        assert_eq!(archive_name("u10"), "u10");
    }

    #[test]
    fn test_precip_factor() {
        // 1 mm/day is 1/86400 kg m⁻² s⁻¹
        let expected = 1.0 / 86400.0;
        assert!((0.001 * M_PER_DAY_TO_FLUX - expected).abs() / expected < 1e-5);
    }

    #[test]
    fn test_time_lat_lon_detection() {
        let var = |dims: &[&str]| NetCdfVariable {
            name: "t2m".into(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            shape: vec![1; dims.len()],
            attrs: Attrs::new(),
        };
        assert!(is_time_lat_lon(&var(&["time", "latitude", "longitude"])));
        assert!(is_time_lat_lon(&var(&["time", "lat", "lon"])));
        assert!(!is_time_lat_lon(&var(&["latitude"])));
        assert!(!is_time_lat_lon(&var(&["time", "expver", "latitude", "longitude"])));
    }

    #[test]
    fn test_missing_file_errors() {
        let mut weights = WeightCache::new(1);
        let err = load_reanalysis("/no/such/era5.nc", None, 2, &mut weights);
        assert!(matches!(err, Err(IngestionError::NetCdf(_))));
    }
}

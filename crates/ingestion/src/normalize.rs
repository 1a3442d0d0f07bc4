//! Harmonising a catalogued store into a (time, lat, lon) field.
//!
//! Stores differ in dimension names (`latitude` vs `lat`), time encoding
//! (units, calendars, mid-month vs start-of-month stamps) and extra
//! singleton dimensions such as `member_id`. [`MemberSource`] resolves all
//! of that from metadata so the values can then be read in time blocks.

use std::ops::Range;

use chrono::NaiveDate;
use ndarray::{s, Array3, ArrayD, IxDyn};
use tracing::debug;

use cmip_common::{decode_cf_times, truncate_to_month, CmipResult, TimeSlice};
use grid_processor::{Attrs, GriddedField, LatLonGrid, VariableInfo, ZarrDatasetReader};

use crate::error::{IngestionError, Result};

/// Name of the time coordinate.
pub const TIME_DIM: &str = "time";

/// Map long horizontal dimension names onto `lat`/`lon`.
pub fn canonical_dim(name: &str) -> &str {
    match name {
        "latitude" => "lat",
        "longitude" => "lon",
        other => other,
    }
}

/// Decode a CF time coordinate and force every stamp to the first of its month.
pub fn decode_monthly_times(raw: &[f64], attrs: &Attrs) -> Result<Vec<NaiveDate>> {
    let units = attrs
        .get("units")
        .and_then(|v| v.as_str())
        .ok_or_else(|| IngestionError::MissingMetadata("time units".to_string()))?;
    let calendar = attrs.get("calendar").and_then(|v| v.as_str());

    let dates = decode_cf_times(raw, units, calendar)?;
    Ok(truncate_to_month(&dates)?)
}

/// Whether any two labels are equal.
pub fn has_duplicate_times(times: &[NaiveDate]) -> bool {
    let mut sorted = times.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).any(|w| w[0] == w[1])
}

/// Axis positions of a variable stored with any dimension order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableLayout {
    /// Dimension names as stored.
    pub source_dims: Vec<String>,
    pub shape: Vec<u64>,
    pub time: usize,
    pub lat: usize,
    pub lon: usize,
}

impl VariableLayout {
    /// Locate time/lat/lon. Every other dimension must be a singleton and is
    /// squeezed away on read.
    pub fn from_info(info: &VariableInfo) -> Result<Self> {
        let find = |want: &str| {
            info.dims
                .iter()
                .position(|d| canonical_dim(d) == want)
                .ok_or_else(|| IngestionError::layout(&info.name, format!("no {want} dimension in {:?}", info.dims)))
        };
        let time = find(TIME_DIM)?;
        let lat = find("lat")?;
        let lon = find("lon")?;

        for (axis, (dim, len)) in info.dims.iter().zip(&info.shape).enumerate() {
            if axis != time && axis != lat && axis != lon && *len != 1 {
                return Err(IngestionError::layout(
                    &info.name,
                    format!("extra dimension {dim} has length {len}"),
                ));
            }
        }

        Ok(Self {
            source_dims: info.dims.clone(),
            shape: info.shape.clone(),
            time,
            lat,
            lon,
        })
    }

    pub fn lat_name(&self) -> &str {
        &self.source_dims[self.lat]
    }

    pub fn lon_name(&self) -> &str {
        &self.source_dims[self.lon]
    }

    /// Axis order putting time, lat, lon first, followed by the singletons.
    fn read_order(&self) -> Vec<usize> {
        let mut order = vec![self.time, self.lat, self.lon];
        order.extend((0..self.shape.len()).filter(|a| !order.contains(a)));
        order
    }
}

/// Metadata of one variable in one store, ready to be read.
#[derive(Debug, Clone)]
pub struct MemberSource {
    pub variable: String,
    pub layout: VariableLayout,
    /// First-of-month labels.
    pub times: Vec<NaiveDate>,
    pub grid: LatLonGrid,
    /// Store-level attributes.
    pub attrs: Attrs,
}

impl MemberSource {
    /// Resolve layout, time axis and native grid of `variable`.
    pub fn open(reader: &ZarrDatasetReader, variable: &str) -> Result<Self> {
        let info = reader.variable(variable)?;
        let layout = VariableLayout::from_info(&info)?;

        let time_info = reader.variable(&layout.source_dims[layout.time])?;
        let raw_times = reader.read_raw_f64(&time_info.name)?;
        let times = decode_monthly_times(&raw_times, &time_info.attrs)?;

        let grid = LatLonGrid::new(
            reader.read_f64(layout.lat_name())?,
            reader.read_f64(layout.lon_name())?,
        );

        let expected = [times.len(), grid.lat.len(), grid.lon.len()];
        let found = [
            layout.shape[layout.time] as usize,
            layout.shape[layout.lat] as usize,
            layout.shape[layout.lon] as usize,
        ];
        if expected != found {
            return Err(IngestionError::layout(
                variable,
                format!("coordinate lengths {expected:?} do not match data shape {found:?}"),
            ));
        }

        debug!(
            store = %reader.location(),
            variable = %variable,
            ntime = times.len(),
            nlat = grid.lat.len(),
            nlon = grid.lon.len(),
            "Resolved member layout"
        );

        Ok(Self {
            variable: variable.to_string(),
            layout,
            times,
            grid,
            attrs: reader.attrs().clone(),
        })
    }

    pub fn has_duplicate_times(&self) -> bool {
        has_duplicate_times(&self.times)
    }

    /// Time indices selected by an optional slice; `None` selects everything.
    pub fn select(&self, slice: Option<&TimeSlice>) -> CmipResult<Range<usize>> {
        match slice {
            Some(slice) => slice.select(&self.times),
            None => Ok(0..self.times.len()),
        }
    }

    /// Read `range` of the time axis in blocks of `time_chunk` months.
    pub fn read(&self, reader: &ZarrDatasetReader, range: Range<usize>, time_chunk: usize) -> Result<GriddedField> {
        let (nlat, nlon) = self.grid.shape();
        let mut data = Array3::from_elem((range.len(), nlat, nlon), f32::NAN);
        let order = self.layout.read_order();
        let step = time_chunk.max(1);

        let mut t0 = range.start;
        while t0 < range.end {
            let count = step.min(range.end - t0);
            let mut start = vec![0u64; self.layout.shape.len()];
            let mut shape = self.layout.shape.clone();
            for (axis, len) in shape.iter_mut().enumerate() {
                if axis != self.layout.lat && axis != self.layout.lon {
                    *len = 1;
                }
            }
            start[self.layout.time] = t0 as u64;
            shape[self.layout.time] = count as u64;

            let values = reader.read_f32_block(&self.variable, &start, &shape)?;
            let dims: Vec<usize> = shape.iter().map(|&n| n as usize).collect();
            let block = ArrayD::from_shape_vec(IxDyn(&dims), values)
                .map_err(|e| IngestionError::layout(&self.variable, e.to_string()))?;
            let ordered: Vec<f32> = block.permuted_axes(IxDyn(&order)).iter().copied().collect();
            let block = Array3::from_shape_vec((count, nlat, nlon), ordered)
                .map_err(|e| IngestionError::layout(&self.variable, e.to_string()))?;

            let offset = t0 - range.start;
            data.slice_mut(s![offset..offset + count, .., ..]).assign(&block);
            t0 += count;
        }

        Ok(GriddedField::new(
            self.variable.clone(),
            self.times[range].to_vec(),
            self.grid.clone(),
            data,
            self.attrs.clone(),
        )?)
    }
}

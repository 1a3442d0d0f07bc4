//! Fixtures that materialise small datasets and catalogs on local disk.
//!
//! [`ZarrStoreFixture`] writes a CF-style Zarr store laid out like the
//! public CMIP archives (root group attrs, one array per variable, 1-D
//! coordinate arrays). [`write_catalog`] writes an ESM collection JSON
//! plus its CSV record table pointing at such stores.

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Map, Value};
use zarrs::array::{ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

/// Columns written to fixture catalogs, in order.
pub const CATALOG_COLUMNS: [&str; 10] = [
    "activity_id",
    "institution_id",
    "source_id",
    "experiment_id",
    "member_id",
    "table_id",
    "variable_id",
    "grid_label",
    "zstore",
    "version",
];

/// A CF-style (time, lat, lon) dataset to be written as a Zarr store.
#[derive(Debug, Clone)]
pub struct ZarrStoreFixture {
    pub variable: String,
    pub lat_name: String,
    pub lon_name: String,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub time: Vec<f64>,
    pub time_units: String,
    pub calendar: Option<String>,
    /// Leading singleton dimension (e.g. `member_id`) on the variable.
    pub singleton_dim: Option<String>,
    /// Write dimension names as the `_ARRAY_DIMENSIONS` attribute instead
    /// of array metadata.
    pub dims_as_attribute: bool,
    /// Values in (time, lat, lon) C order.
    pub values: Vec<f32>,
    pub global_attrs: Map<String, Value>,
    pub variable_attrs: Map<String, Value>,
}

impl ZarrStoreFixture {
    /// A dataset with noleap time in days since 1850-01-01.
    pub fn new(
        variable: &str,
        lat: Vec<f64>,
        lon: Vec<f64>,
        time: Vec<f64>,
        values: Vec<f32>,
    ) -> Self {
        Self {
            variable: variable.to_string(),
            lat_name: "lat".to_string(),
            lon_name: "lon".to_string(),
            lat,
            lon,
            time,
            time_units: "days since 1850-01-01".to_string(),
            calendar: Some("noleap".to_string()),
            singleton_dim: None,
            dims_as_attribute: false,
            values,
            global_attrs: Map::new(),
            variable_attrs: Map::new(),
        }
    }

    /// A dataset filled with one value.
    pub fn constant(variable: &str, lat: Vec<f64>, lon: Vec<f64>, time: Vec<f64>, value: f32) -> Self {
        let n = time.len() * lat.len() * lon.len();
        Self::new(variable, lat, lon, time, vec![value; n])
    }

    pub fn with_time_units(mut self, units: &str) -> Self {
        self.time_units = units.to_string();
        self
    }

    pub fn with_calendar(mut self, calendar: Option<&str>) -> Self {
        self.calendar = calendar.map(str::to_string);
        self
    }

    /// Use other names for the horizontal dimensions (e.g. latitude/longitude).
    pub fn with_dim_names(mut self, lat: &str, lon: &str) -> Self {
        self.lat_name = lat.to_string();
        self.lon_name = lon.to_string();
        self
    }

    pub fn with_singleton_dim(mut self, name: &str) -> Self {
        self.singleton_dim = Some(name.to_string());
        self
    }

    pub fn with_dims_as_attribute(mut self) -> Self {
        self.dims_as_attribute = true;
        self
    }

    pub fn with_global_attr(mut self, key: &str, value: Value) -> Self {
        self.global_attrs.insert(key.to_string(), value);
        self
    }

    pub fn with_variable_attr(mut self, key: &str, value: Value) -> Self {
        self.variable_attrs.insert(key.to_string(), value);
        self
    }

    /// Write the store at `path` (created if missing).
    pub fn write(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        fs::create_dir_all(path)?;
        let store = Arc::new(FilesystemStore::new(path)?);

        GroupBuilder::new()
            .attributes(self.global_attrs.clone())
            .build(store.clone(), "/")?
            .store_metadata()?;

        let mut time_attrs = Map::new();
        time_attrs.insert("units".into(), json!(self.time_units));
        if let Some(calendar) = &self.calendar {
            time_attrs.insert("calendar".into(), json!(calendar));
        }
        self.write_f64(&store, "time", &["time"], &self.time, time_attrs)?;
        self.write_f64(&store, &self.lat_name, &[self.lat_name.as_str()], &self.lat, Map::new())?;
        self.write_f64(&store, &self.lon_name, &[self.lon_name.as_str()], &self.lon, Map::new())?;

        let mut dims = Vec::new();
        let mut shape = Vec::new();
        if let Some(extra) = &self.singleton_dim {
            dims.push(extra.as_str());
            shape.push(1u64);
        }
        dims.extend(["time", self.lat_name.as_str(), self.lon_name.as_str()]);
        shape.extend([
            self.time.len() as u64,
            self.lat.len() as u64,
            self.lon.len() as u64,
        ]);

        let expected: u64 = shape.iter().product();
        if expected != self.values.len() as u64 {
            return Err(format!(
                "fixture values hold {} elements, shape {:?} needs {}",
                self.values.len(),
                shape,
                expected
            )
            .into());
        }

        let mut chunks = shape.clone();
        let time_axis = dims.len() - 3;
        chunks[time_axis] = chunks[time_axis].clamp(1, 12);

        let mut attrs = self.variable_attrs.clone();
        let mut builder = ArrayBuilder::new(
            shape.clone(),
            DataType::Float32,
            chunks.try_into()?,
            FillValue::from(f32::NAN),
        );
        if self.dims_as_attribute {
            attrs.insert("_ARRAY_DIMENSIONS".into(), json!(dims));
        } else {
            builder.dimension_names(Some(dims.clone()));
        }
        let array = builder.attributes(attrs).build(store.clone(), &format!("/{}", self.variable))?;
        array.store_metadata()?;
        if !self.values.is_empty() {
            let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)?;
            array.store_array_subset_elements(&subset, &self.values)?;
        }
        Ok(())
    }

    fn write_f64(
        &self,
        store: &Arc<FilesystemStore>,
        name: &str,
        dims: &[&str],
        values: &[f64],
        mut attrs: Map<String, Value>,
    ) -> Result<(), Box<dyn Error>> {
        let len = values.len() as u64;
        let mut builder = ArrayBuilder::new(
            vec![len],
            DataType::Float64,
            vec![len.max(1)].try_into()?,
            FillValue::from(f64::NAN),
        );
        if self.dims_as_attribute {
            attrs.insert("_ARRAY_DIMENSIONS".into(), json!(dims));
        } else {
            builder.dimension_names(Some(dims.to_vec()));
        }
        let array = builder.attributes(attrs).build(store.clone(), &format!("/{name}"))?;
        array.store_metadata()?;
        if !values.is_empty() {
            let subset = ArraySubset::new_with_start_shape(vec![0], vec![len])?;
            array.store_array_subset_elements(&subset, values)?;
        }
        Ok(())
    }
}

/// One catalog record.
#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub activity_id: String,
    pub institution_id: String,
    pub source_id: String,
    pub experiment_id: String,
    pub member_id: String,
    pub table_id: String,
    pub variable_id: String,
    pub grid_label: String,
    pub zstore: String,
    pub version: String,
}

impl CatalogRow {
    /// A historical monthly (`Amon`, `gn`) record.
    pub fn historical(
        activity: &str,
        institution: &str,
        source: &str,
        member: &str,
        variable: &str,
        zstore: impl Into<String>,
    ) -> Self {
        Self {
            activity_id: activity.to_string(),
            institution_id: institution.to_string(),
            source_id: source.to_string(),
            experiment_id: "historical".to_string(),
            member_id: member.to_string(),
            table_id: "Amon".to_string(),
            variable_id: variable.to_string(),
            grid_label: "gn".to_string(),
            zstore: zstore.into(),
            version: "20190101".to_string(),
        }
    }

    pub fn with_experiment(mut self, experiment: &str) -> Self {
        self.experiment_id = experiment.to_string();
        self
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table_id = table.to_string();
        self
    }

    /// Dataset key `activity.institution.source.experiment.member.table.variable.grid`.
    pub fn key(&self) -> String {
        [
            self.activity_id.as_str(),
            self.institution_id.as_str(),
            self.source_id.as_str(),
            self.experiment_id.as_str(),
            self.member_id.as_str(),
            self.table_id.as_str(),
            self.variable_id.as_str(),
            self.grid_label.as_str(),
        ]
        .join(".")
    }

    fn csv_line(&self) -> String {
        [
            self.activity_id.as_str(),
            self.institution_id.as_str(),
            self.source_id.as_str(),
            self.experiment_id.as_str(),
            self.member_id.as_str(),
            self.table_id.as_str(),
            self.variable_id.as_str(),
            self.grid_label.as_str(),
            self.zstore.as_str(),
            self.version.as_str(),
        ]
        .join(",")
    }
}

/// Write `<dir>/<name>.json` and its record table `<name>.csv` (or
/// `<name>.csv.gz` when `gzip`). Returns the JSON path.
pub fn write_catalog(
    dir: &Path,
    name: &str,
    rows: &[CatalogRow],
    gzip: bool,
) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(dir)?;

    let mut table = CATALOG_COLUMNS.join(",");
    table.push('\n');
    for row in rows {
        table.push_str(&row.csv_line());
        table.push('\n');
    }

    let csv_name = if gzip {
        let file_name = format!("{name}.csv.gz");
        let mut encoder = GzEncoder::new(fs::File::create(dir.join(&file_name))?, Compression::default());
        encoder.write_all(table.as_bytes())?;
        encoder.finish()?;
        file_name
    } else {
        let file_name = format!("{name}.csv");
        fs::write(dir.join(&file_name), table)?;
        file_name
    };

    let collection = json!({
        "esmcat_version": "0.1.0",
        "id": name,
        "description": format!("{name} test collection"),
        "catalog_file": csv_name,
        "attributes": CATALOG_COLUMNS[..8]
            .iter()
            .map(|c| json!({"column_name": c, "vocabulary": ""}))
            .collect::<Vec<_>>(),
        "assets": {"column_name": "zstore", "format": "zarr"},
    });
    let json_path = dir.join(format!("{name}.json"));
    fs::write(&json_path, serde_json::to_string_pretty(&collection)?)?;
    Ok(json_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_row_key() {
        let row = CatalogRow::historical("CMIP", "NCAR", "CESM2", "r1i1p1f1", "tas", "/tmp/x.zarr");
        assert_eq!(row.key(), "CMIP.NCAR.CESM2.historical.r1i1p1f1.Amon.tas.gn");
    }

    #[test]
    fn test_write_catalog_files() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![CatalogRow::historical("CMIP", "NCAR", "CESM2", "r1i1p1f1", "tas", "a.zarr")];
        let json_path = write_catalog(dir.path(), "pangeo-cmip6", &rows, false).unwrap();

        let collection: Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(collection["catalog_file"], "pangeo-cmip6.csv");

        let table = fs::read_to_string(dir.path().join("pangeo-cmip6.csv")).unwrap();
        assert_eq!(table.lines().count(), 2);
        assert!(table.lines().nth(1).unwrap().starts_with("CMIP,NCAR,CESM2"));
    }

    #[test]
    fn test_zarr_fixture_writes_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("ds.zarr");
        ZarrStoreFixture::constant("tas", vec![-45.0, 45.0], vec![0.0, 180.0], vec![14.0], 280.0)
            .with_global_attr("source_id", json!("CESM2"))
            .write(&store)
            .unwrap();
        for name in ["tas", "time", "lat", "lon"] {
            assert!(store.join(name).join("zarr.json").exists(), "{name} missing");
        }
    }

    #[test]
    fn test_zarr_fixture_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = ZarrStoreFixture::new("tas", vec![0.0], vec![0.0], vec![0.0], vec![1.0, 2.0]);
        assert!(fixture.write(&dir.path().join("bad.zarr")).is_err());
    }
}

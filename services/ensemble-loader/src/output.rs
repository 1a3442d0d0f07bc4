//! Writing assembled ensembles as Zarr V3 stores plus a JSON run summary.
//!
//! Layout under the output directory:
//!
//! ```text
//! <dir>/<mip>/<var>.zarr     (ensemble, time, lat, lon) f32, plus cell_area
//! <dir>/reanalysis.zarr      (lat, lon) f32 per variable
//! <dir>/summary.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use zarrs_filesystem::FilesystemStore;

use grid_processor::{Attrs, ZarrWriter};
use ingestion::{EnsembleDataset, EnsembleField, ReanalysisClimatology};

const ENSEMBLE_DIMS: [&str; 4] = ["ensemble", "time", "lat", "lon"];

/// What a run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub archives: Vec<ArchiveSummary>,
    pub reanalysis: Option<ReanalysisSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub mip: String,
    pub variables: Vec<VariableSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSummary {
    pub variable: String,
    pub members: Vec<String>,
    /// (ensemble, time, lat, lon)
    pub shape: [usize; 4],
    pub first_month: Option<String>,
    pub last_month: Option<String>,
    pub store: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReanalysisSummary {
    pub source: PathBuf,
    pub variables: Vec<String>,
    pub store: Option<PathBuf>,
}

impl RunSummary {
    pub fn from_ensembles(ensembles: &[EnsembleDataset]) -> Self {
        let archives = ensembles
            .iter()
            .map(|dataset| ArchiveSummary {
                mip: dataset.mip.to_string(),
                variables: dataset.fields.iter().map(summarize_field).collect(),
            })
            .collect();
        Self {
            archives,
            reanalysis: None,
        }
    }

    fn variable_mut(&mut self, mip: &str, variable: &str) -> Option<&mut VariableSummary> {
        self.archives
            .iter_mut()
            .find(|a| a.mip == mip)?
            .variables
            .iter_mut()
            .find(|v| v.variable == variable)
    }
}

fn summarize_field(field: &EnsembleField) -> VariableSummary {
    let (n, nt, nlat, nlon) = field.shape();
    VariableSummary {
        variable: field.variable.clone(),
        members: field.members.iter().map(|m| m.ensemble.clone()).collect(),
        shape: [n, nt, nlat, nlon],
        first_month: field.times.first().map(|t| t.format("%Y-%m").to_string()),
        last_month: field.times.last().map(|t| t.format("%Y-%m").to_string()),
        store: None,
    }
}

fn open_store(path: &Path) -> Result<Arc<FilesystemStore>> {
    fs::create_dir_all(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let store = FilesystemStore::new(path).with_context(|| format!("Failed to open store {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Write one store per variable of `dataset` and record the paths in `summary`.
///
/// `areas` is written as `cell_area` into every store whose grid has the
/// same shape.
pub fn write_ensemble(
    writer: &ZarrWriter,
    dir: &Path,
    dataset: &EnsembleDataset,
    areas: Option<&Array2<f32>>,
    summary: &mut RunSummary,
) -> Result<Vec<PathBuf>> {
    let mip = dataset.mip.to_string();
    let mut written = Vec::with_capacity(dataset.fields.len());

    for field in &dataset.fields {
        let path = dir.join(&mip).join(format!("{}.zarr", field.variable));
        let store = open_store(&path)?;

        let mut attrs = field.attrs.clone();
        attrs.extend(dataset.attrs.clone());
        writer.write_group(&store, attrs)?;
        writer.write_times(&store, &field.times)?;
        writer.write_grid(&store, &field.grid)?;

        let index: Vec<f64> = (0..field.members.len()).map(|i| i as f64).collect();
        writer.write_coordinate(&store, "ensemble", &index, member_attrs(field))?;

        let (_, _, nlat, nlon) = field.shape();
        let result = writer.write_ndarray(&store, &field.variable, &ENSEMBLE_DIMS, field.data.view(), Attrs::new())?;

        if let Some(areas) = areas.filter(|a| a.dim() == (nlat, nlon)) {
            let mut area_attrs = Attrs::new();
            area_attrs.insert("units".into(), json!("m2"));
            area_attrs.insert("standard_name".into(), json!("cell_area"));
            writer.write_ndarray(&store, "cell_area", &["lat", "lon"], areas.view(), area_attrs)?;
        }

        info!(
            mip = %mip,
            variable = %field.variable,
            path = %path.display(),
            bytes = result.bytes_written,
            "Wrote ensemble store"
        );
        if let Some(entry) = summary.variable_mut(&mip, &field.variable) {
            entry.store = Some(path.clone());
        }
        written.push(path);
    }

    Ok(written)
}

/// Member labels, one entry per position on the ensemble axis.
fn member_attrs(field: &EnsembleField) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert(
        "labels".into(),
        json!(field.members.iter().map(|m| &m.ensemble).collect::<Vec<_>>()),
    );
    attrs.insert(
        "member_id".into(),
        json!(field.members.iter().map(|m| &m.member_id).collect::<Vec<_>>()),
    );
    attrs.insert(
        "source_id".into(),
        json!(field.members.iter().map(|m| &m.source_id).collect::<Vec<_>>()),
    );
    attrs.insert(
        "mip_id".into(),
        json!(field.members.iter().map(|m| &m.mip_id).collect::<Vec<_>>()),
    );
    attrs
}

/// Write the reference climatology to `<dir>/reanalysis.zarr`.
pub fn write_reanalysis(writer: &ZarrWriter, dir: &Path, climatology: &ReanalysisClimatology) -> Result<PathBuf> {
    let path = dir.join("reanalysis.zarr");
    let store = open_store(&path)?;
    writer.write_group(&store, climatology.attrs.clone())?;

    if let Some(first) = climatology.fields.first() {
        writer.write_grid(&store, &first.grid)?;
    }
    for field in &climatology.fields {
        writer.write_ndarray(&store, &field.variable, &["lat", "lon"], field.data.view(), field.attrs.clone())?;
    }

    info!(path = %path.display(), variables = climatology.fields.len(), "Wrote reanalysis store");
    Ok(path)
}

/// Write `<dir>/summary.json`.
pub fn write_summary(dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("summary.json");
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

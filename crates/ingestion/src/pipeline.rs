//! The load-and-normalise loop over catalogs.
//!
//! For every archive and variable the catalog is searched for historical
//! monthly stores. Each store is opened, normalised, regridded onto the
//! common grid, corrected, labelled and coarsened. Datasets with duplicate
//! months, a failing time slice or a failing regrid are skipped with a
//! warning; any other failure aborts the load.

use std::fmt;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{debug, info, warn};

use cmip_common::{DatasetKey, MipId};
use esm_catalog::{CatalogQuery, CatalogRecord, CatalogSet, EsmCatalog};
use grid_processor::{
    coarsen_field, CacheStats, GriddedField, LatLonGrid, MemberLabels, Regridder, StoreLocation, WeightCache,
    ZarrDatasetReader,
};

use crate::config::PipelineOptions;
use crate::error::{IngestionError, Result};
use crate::normalize::MemberSource;
use crate::qc::quality_control;
use crate::quiet::HiddenOutput;

/// Why a dataset was left out of the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Two timestamps fell into the same month.
    DuplicateTimes,
    /// The time slice selected nothing.
    TimeSlice(String),
    /// The native grid could not be regridded.
    Regrid(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DuplicateTimes => write!(f, "datetime conflict"),
            SkipReason::TimeSlice(msg) => write!(f, "time-slicing error: {msg}"),
            SkipReason::Regrid(msg) => write!(f, "regridding conflict: {msg}"),
        }
    }
}

/// Result of loading one catalog record.
#[derive(Debug)]
pub enum MemberOutcome {
    Loaded(Box<GriddedField>),
    Skipped(SkipReason),
}

/// Loaded members of one variable, in catalog order.
#[derive(Debug, Default)]
pub struct VariableMembers {
    pub variable: String,
    pub members: Vec<(DatasetKey, GriddedField)>,
}

/// Everything loaded from one archive, variables in request order.
#[derive(Debug)]
pub struct MipMembers {
    pub mip: MipId,
    pub variables: Vec<VariableMembers>,
}

impl MipMembers {
    pub fn get(&self, variable: &str) -> Option<&VariableMembers> {
        self.variables.iter().find(|v| v.variable == variable)
    }

    /// Number of loaded members over all variables.
    pub fn member_count(&self) -> usize {
        self.variables.iter().map(|v| v.members.len()).sum()
    }
}

/// Stateful loader: holds the options, the target grid and the regrid
/// weight cache shared by every dataset of a run.
pub struct Pipeline {
    options: PipelineOptions,
    target: LatLonGrid,
    weights: WeightCache,
    skipped: Vec<(DatasetKey, SkipReason)>,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Result<Self> {
        options.validate().map_err(IngestionError::InvalidConfig)?;
        let weights = WeightCache::new(options.weight_cache_entries);
        Ok(Self {
            options,
            target: LatLonGrid::common(),
            weights,
            skipped: Vec::new(),
        })
    }

    /// Regrid onto `target` instead of the common 1°×1° grid.
    pub fn with_target(mut self, target: LatLonGrid) -> Self {
        self.target = target;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.weights.stats()
    }

    /// Datasets skipped so far, with the reason.
    pub fn skipped(&self) -> &[(DatasetKey, SkipReason)] {
        &self.skipped
    }

    /// Load every requested variable from every catalog in `catalogs`.
    pub fn load_collections(&mut self, catalogs: &CatalogSet) -> Result<Vec<MipMembers>> {
        let progress = self.progress_bar(catalogs.len() as u64);
        let mut out = Vec::with_capacity(catalogs.len());

        for (mip, catalog) in catalogs.iter() {
            progress.set_message(mip.to_string());
            let mut variables = Vec::new();
            for variable in self.options.variables.clone() {
                if let Some(members) = self.load_variable(mip, catalog, &variable)? {
                    variables.push(members);
                }
            }
            out.push(MipMembers { mip, variables });
            progress.inc(1);
        }

        progress.finish_and_clear();
        let stats = self.weights.stats();
        info!(
            archives = out.len(),
            members = out.iter().map(MipMembers::member_count).sum::<usize>(),
            skipped = self.skipped.len(),
            weight_cache_hits = stats.hits,
            weight_cache_misses = stats.misses,
            weight_cache_hit_rate = stats.hit_rate(),
            "Finished loading collections"
        );
        Ok(out)
    }

    /// Load all historical monthly members of `variable` in one catalog.
    ///
    /// `None` when the catalog has no matching records.
    pub fn load_variable(
        &mut self,
        mip: MipId,
        catalog: &EsmCatalog,
        variable: &str,
    ) -> Result<Option<VariableMembers>> {
        let records = catalog.search(&CatalogQuery::historical_monthly(variable));
        if records.is_empty() {
            debug!(mip = %mip, variable = %variable, "No matching records");
            return Ok(None);
        }
        info!(mip = %mip, variable = %variable, records = records.len(), "Loading variable");

        let mut members = VariableMembers {
            variable: variable.to_string(),
            members: Vec::new(),
        };
        for record in records {
            let key = record.dataset_key();
            match self.load_member(mip, record)? {
                MemberOutcome::Loaded(field) => members.members.push((key, *field)),
                MemberOutcome::Skipped(reason) => self.skipped.push((key, reason)),
            }
        }
        Ok(Some(members))
    }

    /// Load, normalise, regrid, correct, label and coarsen one record.
    pub fn load_member(&mut self, mip: MipId, record: &CatalogRecord) -> Result<MemberOutcome> {
        let key = record.dataset_key();
        let variable = record.variable_id.as_str();
        let location = StoreLocation::parse(&record.zstore);

        let (reader, source) = {
            let _quiet = HiddenOutput::new();
            let reader = ZarrDatasetReader::open(&location)?;
            let source = MemberSource::open(&reader, variable)?;
            (reader, source)
        };

        if source.has_duplicate_times() {
            warn!("Skip {key} before datetime conflict.");
            return Ok(MemberOutcome::Skipped(SkipReason::DuplicateTimes));
        }

        let range = match source.select(self.options.timeslice.as_ref()) {
            Ok(range) => range,
            Err(e) => {
                warn!(error = %e, "Skip {key} due to time-slicing error.");
                return Ok(MemberOutcome::Skipped(SkipReason::TimeSlice(e.to_string())));
            }
        };

        let native = source.read(&reader, range, self.options.time_chunk)?;

        let regridded = {
            let _quiet = HiddenOutput::new();
            self.regridder_for(&native.grid)
                .and_then(|regridder| regridder.regrid_field(&native).map_err(Into::into))
        };
        let mut field = match regridded {
            Ok(field) => field,
            Err(e) => {
                warn!(error = %e, "Skip {key} due to regridding conflict.");
                return Ok(MemberOutcome::Skipped(SkipReason::Regrid(e.to_string())));
            }
        };

        quality_control(&mut field, variable, &key, mip);
        label_member(&mut field, &key, mip);

        let field = coarsen_field(&field, self.options.coarsen_size)?;
        debug!(key = %key, shape = ?field.shape(), "Loaded member");
        Ok(MemberOutcome::Loaded(Box::new(field)))
    }

    fn regridder_for(&mut self, source: &LatLonGrid) -> Result<Arc<Regridder>> {
        Ok(self.weights.get_or_build(source, &self.target)?)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("##-"));
        }
        bar
    }
}

/// Attach the `name`/`mip_id` attrs and the ensemble labels of `key`.
pub fn label_member(field: &mut GriddedField, key: &DatasetKey, mip: MipId) {
    field.attrs.insert("name".to_string(), json!(key.name()));
    field.attrs.insert("mip_id".to_string(), json!(mip.as_str()));
    field.labels = Some(MemberLabels {
        ensemble: key.ensemble_label(),
        member_id: key.member_id.clone(),
        source_id: key.source_id.clone(),
        mip_id: key.activity_id.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use grid_processor::Attrs;
    use ndarray::Array3;

    #[test]
    fn test_label_member() {
        let mut field = GriddedField::new(
            "tas",
            vec![NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()],
            LatLonGrid::regular(0.0, 1.0, 1, 0.0, 1.0, 1),
            Array3::zeros((1, 1, 1)),
            Attrs::new(),
        )
        .unwrap();
        let key: DatasetKey = "CMIP.NCAR.CESM2.historical.r1i1p1f1.Amon.tas.gn".parse().unwrap();
        label_member(&mut field, &key, MipId::Cmip6);

        assert_eq!(field.attrs["name"], json!("NCAR-CESM2"));
        assert_eq!(field.attrs["mip_id"], json!("cmip6"));
        let labels = field.labels.unwrap();
        assert_eq!(labels.ensemble, "NCAR-CESM2-r1i1p1f1");
        assert_eq!(labels.member_id, "r1i1p1f1");
        assert_eq!(labels.source_id, "CESM2");
        assert_eq!(labels.mip_id, "CMIP");
    }

    #[test]
    fn test_pipeline_rejects_invalid_options() {
        let options = PipelineOptions {
            coarsen_size: 0,
            ..Default::default()
        };
        assert!(matches!(Pipeline::new(options), Err(IngestionError::InvalidConfig(_))));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::DuplicateTimes.to_string(), "datetime conflict");
        assert!(SkipReason::Regrid("x".into()).to_string().contains("regridding"));
    }
}

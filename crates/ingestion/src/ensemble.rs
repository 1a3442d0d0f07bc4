//! Ensemble assembly: per-member fields stacked along an `ensemble` axis.

use chrono::NaiveDate;
use ndarray::{concatenate, s, Array3, Array4, Axis};
use serde_json::json;
use tracing::{debug, info};

use cmip_common::{DatasetKey, MipId};
use grid_processor::downsample::nan_mean;
use grid_processor::{Attrs, GriddedField, LatLonGrid, MemberLabels};

use crate::error::{IngestionError, Result};
use crate::pipeline::{MipMembers, VariableMembers};

/// Label of the synthetic cross-member mean.
pub const ENSEMBLE_MEAN_LABEL: &str = "ens-mean";

/// `source_id`/`member_id` of the synthetic mean.
pub const ALL_MEMBERS: &str = "All";

/// One variable over (ensemble, time, lat, lon).
#[derive(Debug, Clone)]
pub struct EnsembleField {
    pub variable: String,
    /// One entry per position on the ensemble axis.
    pub members: Vec<MemberLabels>,
    /// Union of the members' months, ascending.
    pub times: Vec<NaiveDate>,
    pub grid: LatLonGrid,
    pub data: Array4<f32>,
    pub attrs: Attrs,
}

impl EnsembleField {
    /// Stack members in order. Months missing from a member are NaN.
    ///
    /// `None` for an empty member list.
    pub fn assemble(variable: &str, members: &[(DatasetKey, GriddedField)]) -> Result<Option<Self>> {
        let Some((_, first)) = members.first() else {
            return Ok(None);
        };

        let mut grid = first.grid.clone();
        grid.lat.sort_by(f64::total_cmp);
        grid.lon.sort_by(f64::total_cmp);

        let mut times: Vec<NaiveDate> = members.iter().flat_map(|(_, f)| f.times.iter().copied()).collect();
        times.sort_unstable();
        times.dedup();

        let (nlat, nlon) = grid.shape();
        let mut data = Array4::from_elem((members.len(), times.len(), nlat, nlon), f32::NAN);
        let mut labels = Vec::with_capacity(members.len());

        for (m, (key, field)) in members.iter().enumerate() {
            let aligned = field.aligned_to(&grid).ok_or_else(|| IngestionError::GridMismatch {
                variable: variable.to_string(),
                member: key.to_string(),
            })?;
            for (t, time) in field.times.iter().enumerate() {
                if let Ok(pos) = times.binary_search(time) {
                    data.slice_mut(s![m, pos, .., ..]).assign(&aligned.slice(s![t, .., ..]));
                }
            }
            labels.push(field.labels.clone().unwrap_or_else(|| MemberLabels {
                ensemble: key.ensemble_label(),
                member_id: key.member_id.clone(),
                source_id: key.source_id.clone(),
                mip_id: key.activity_id.clone(),
            }));
        }

        debug!(variable = %variable, members = labels.len(), ntime = times.len(), "Assembled ensemble");

        Ok(Some(Self {
            variable: variable.to_string(),
            members: labels,
            times,
            grid,
            data,
            attrs: first.attrs.clone(),
        }))
    }

    /// (ensemble, time, lat, lon)
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }

    /// Position of a member by its ensemble label.
    pub fn member_index(&self, ensemble: &str) -> Option<usize> {
        self.members.iter().position(|m| m.ensemble == ensemble)
    }

    pub fn has_ensemble_mean(&self) -> bool {
        self.member_index(ENSEMBLE_MEAN_LABEL).is_some()
    }

    /// NaN-skipping mean over the ensemble axis.
    pub fn ensemble_mean(&self) -> Array3<f32> {
        let (_, nt, nlat, nlon) = self.shape();
        Array3::from_shape_fn((nt, nlat, nlon), |(t, j, i)| {
            nan_mean(self.data.slice(s![.., t, j, i]).iter().copied())
        })
    }

    /// Prepend the ensemble mean as member `ens-mean`. No-op if present.
    pub fn prepend_ensemble_mean(&mut self, mip: MipId) -> Result<()> {
        if self.has_ensemble_mean() || self.members.is_empty() {
            return Ok(());
        }
        let mean = self.ensemble_mean().insert_axis(Axis(0));
        self.data = concatenate(Axis(0), &[mean.view(), self.data.view()])
            .map_err(|e| IngestionError::layout(&self.variable, e.to_string()))?;
        self.members.insert(
            0,
            MemberLabels {
                ensemble: ENSEMBLE_MEAN_LABEL.to_string(),
                member_id: ALL_MEMBERS.to_string(),
                source_id: ALL_MEMBERS.to_string(),
                mip_id: mip.as_str().to_string(),
            },
        );
        Ok(())
    }
}

/// All variables of one archive.
#[derive(Debug, Clone)]
pub struct EnsembleDataset {
    pub mip: MipId,
    pub fields: Vec<EnsembleField>,
    pub attrs: Attrs,
}

impl EnsembleDataset {
    /// Assemble each variable of `members`. Variables without members are dropped.
    pub fn assemble(loaded: &MipMembers) -> Result<Self> {
        let mut fields = Vec::new();
        for VariableMembers { variable, members } in &loaded.variables {
            if let Some(field) = EnsembleField::assemble(variable, members)? {
                fields.push(field);
            }
        }
        Ok(Self {
            mip: loaded.mip,
            fields,
            attrs: Attrs::new(),
        })
    }

    pub fn get(&self, variable: &str) -> Option<&EnsembleField> {
        self.fields.iter().find(|f| f.variable == variable)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.variable.as_str())
    }

    /// Prepend `ens-mean` to every variable and name the dataset after the archive.
    pub fn add_ensemble_mean(&mut self) -> Result<()> {
        for field in &mut self.fields {
            field.prepend_ensemble_mean(self.mip)?;
        }
        self.attrs.insert("name".to_string(), json!(self.mip.as_str()));
        Ok(())
    }
}

/// Assemble one dataset per archive, keeping archive order.
pub fn assemble_ensembles(loaded: &[MipMembers]) -> Result<Vec<EnsembleDataset>> {
    loaded.iter().map(EnsembleDataset::assemble).collect()
}

/// Add the ensemble mean to every archive.
pub fn add_ensemble_mean(datasets: &mut [EnsembleDataset]) -> Result<()> {
    for dataset in datasets.iter_mut() {
        dataset.add_ensemble_mean()?;
        info!(mip = %dataset.mip, variables = dataset.fields.len(), "Added ensemble mean");
    }
    Ok(())
}

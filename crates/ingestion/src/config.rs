//! Options controlling a pipeline run.

use serde::{Deserialize, Serialize};

use cmip_common::{MipId, TimeSlice};
use esm_catalog::DEFAULT_BASE_URL;
use grid_processor::GridProcessorConfig;

/// What to load and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Archives to load, in output order.
    pub mips: Vec<MipId>,
    /// Variable ids (e.g. `tas`, `pr`, `psl`).
    pub variables: Vec<String>,
    /// Inclusive month range applied to every dataset.
    pub timeslice: Option<TimeSlice>,
    /// Block size of the final coarsening step.
    pub coarsen_size: usize,
    /// Months read per block from each store.
    pub time_chunk: usize,
    /// Base URL (or local directory) of the catalog bucket layout.
    pub catalog_base_url: String,
    /// Capacity of the regrid weight cache.
    pub weight_cache_entries: usize,
    /// Draw a progress bar over archives.
    pub show_progress: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mips: MipId::ALL.to_vec(),
            variables: Vec::new(),
            timeslice: None,
            coarsen_size: 2,
            time_chunk: 30,
            catalog_base_url: DEFAULT_BASE_URL.to_string(),
            weight_cache_entries: 16,
            show_progress: true,
        }
    }
}

impl PipelineOptions {
    /// Options for `variables`, taking grid settings from a processor config.
    pub fn from_grid_config(variables: Vec<String>, grid: &GridProcessorConfig) -> Self {
        Self {
            variables,
            coarsen_size: grid.coarsen_size,
            time_chunk: grid.time_chunk,
            weight_cache_entries: grid.weight_cache_entries,
            ..Default::default()
        }
    }

    pub fn with_mips(mut self, mips: Vec<MipId>) -> Self {
        self.mips = mips;
        self
    }

    pub fn with_timeslice(mut self, timeslice: Option<TimeSlice>) -> Self {
        self.timeslice = timeslice;
        self
    }

    pub fn with_catalog_base_url(mut self, base: impl Into<String>) -> Self {
        self.catalog_base_url = base.into();
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Validate option values.
    pub fn validate(&self) -> Result<(), String> {
        if self.coarsen_size == 0 {
            return Err("coarsen_size must be > 0".to_string());
        }
        if self.time_chunk == 0 {
            return Err("time_chunk must be > 0".to_string());
        }
        if self.weight_cache_entries == 0 {
            return Err("weight_cache_entries must be > 0".to_string());
        }
        if self.catalog_base_url.trim().is_empty() {
            return Err("catalog_base_url must not be empty".to_string());
        }
        Ok(())
    }
}

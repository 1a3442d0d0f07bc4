//! Model-ensemble ingestion.
//!
//! Turns ESM catalogs of the model archives (FAR, SAR, TAR, CMIP3, CMIP5,
//! CMIP6) into per-archive ensembles on a common grid.
//!
//! # Architecture
//!
//! ```text
//! open_collections (one catalog per archive)
//!      │
//!      ▼
//! Pipeline::load_collections
//!      │  per record: open store → normalise times/dims → time slice
//!      │              → regrid (cached weights) → QC → label → coarsen
//!      ▼
//! assemble_ensembles  ──►  EnsembleDataset per archive
//!      │
//!      └─► add_ensemble_mean (optional `ens-mean` member)
//! ```
//!
//! A reanalysis reference climatology is loaded separately with
//! [`load_reanalysis`].

pub mod config;
pub mod ensemble;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod qc;
pub mod quiet;
pub mod reanalysis;

use reqwest::Client;
use tracing::info;

use esm_catalog::open_collections;

pub use config::PipelineOptions;
pub use ensemble::{
    add_ensemble_mean, assemble_ensembles, EnsembleDataset, EnsembleField, ALL_MEMBERS, ENSEMBLE_MEAN_LABEL,
};
pub use error::{IngestionError, Result};
pub use normalize::{canonical_dim, decode_monthly_times, has_duplicate_times, MemberSource, VariableLayout};
pub use pipeline::{label_member, MemberOutcome, MipMembers, Pipeline, SkipReason, VariableMembers};
pub use qc::{corrections_for, quality_control, Correction, REVERSE_LAT_GROUPS};
pub use quiet::HiddenOutput;
pub use reanalysis::{archive_name, load_reanalysis, ReanalysisClimatology};

/// Open the catalogs, load every member and assemble one ensemble per archive.
///
/// The ensemble mean is not added; see [`add_ensemble_mean`].
pub async fn load_ensembles(options: &PipelineOptions, client: &Client) -> Result<Vec<EnsembleDataset>> {
    let mut pipeline = Pipeline::new(options.clone())?;
    let catalogs = open_collections(&options.mips, &options.catalog_base_url, client).await?;
    let loaded = pipeline.load_collections(&catalogs)?;
    let ensembles = assemble_ensembles(&loaded)?;
    info!(
        archives = ensembles.len(),
        skipped = pipeline.skipped().len(),
        "Loaded ensembles"
    );
    Ok(ensembles)
}

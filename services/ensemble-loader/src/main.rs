//! Ensemble loader.
//!
//! Searches the archive catalogs, loads every matching member onto the
//! common grid, assembles one ensemble per archive and variable, and
//! optionally writes the result as Zarr stores.

mod config;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cmip_common::{MipId, TimeSlice};
use grid_processor::{calc_area, LatLonGrid, WeightCache, ZarrWriter};
use ingestion::{add_ensemble_mean, load_ensembles, load_reanalysis};

use config::{LoaderConfig, ReanalysisConfig};
use output::{write_ensemble, write_reanalysis, write_summary, ReanalysisSummary, RunSummary};

#[derive(Parser, Debug)]
#[command(name = "ensemble-loader")]
#[command(about = "Load CMIP model ensembles onto a common grid")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "ENSEMBLE_LOADER_CONFIG")]
    config: Option<PathBuf>,

    /// Archive to load (repeatable): far, sar, tar, cmip3, cmip5, cmip6
    #[arg(long = "mip")]
    mips: Vec<String>,

    /// Variable id to load (repeatable)
    #[arg(long = "var")]
    variables: Vec<String>,

    /// Time range START/END as YYYY-MM[-DD]
    #[arg(long)]
    timeslice: Option<String>,

    /// Skip the ensemble-mean member
    #[arg(long)]
    no_ens_mean: bool,

    /// Reference reanalysis NetCDF file
    #[arg(long)]
    reanalysis: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut LoaderConfig) -> Result<()> {
        if !self.mips.is_empty() {
            config.mips = self
                .mips
                .iter()
                .map(|m| m.parse::<MipId>())
                .collect::<std::result::Result<_, _>>()
                .context("Invalid --mip")?;
        }
        if !self.variables.is_empty() {
            config.variables = self.variables.clone();
        }
        if let Some(slice) = &self.timeslice {
            config.timeslice = Some(slice.parse::<TimeSlice>().context("Invalid --timeslice")?);
        }
        if self.no_ens_mean {
            config.ensemble_mean = false;
        }
        if let Some(path) = &self.reanalysis {
            config.reanalysis = Some(ReanalysisConfig { path: path.clone() });
        }
        if let Some(dir) = &self.output {
            config.output.dir = Some(dir.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.to_lowercase();
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LoaderConfig::from_yaml(path)?,
        None => LoaderConfig::default(),
    };
    config.apply_env_overrides();
    args.apply(&mut config)?;
    config.validate()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    info!(
        mips = ?config.mips,
        variables = ?config.variables,
        timeslice = ?config.timeslice.map(|t| t.to_string()),
        catalog = %config.catalog.base_url,
        "Starting ensemble loader"
    );

    run(&config).await
}

async fn run(config: &LoaderConfig) -> Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("ensemble-loader/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let options = config.pipeline_options();
    let mut ensembles = load_ensembles(&options, &client)
        .await
        .context("Failed to load ensembles")?;

    if config.ensemble_mean {
        add_ensemble_mean(&mut ensembles)?;
    }

    for dataset in &ensembles {
        for field in &dataset.fields {
            let (members, months, nlat, nlon) = field.shape();
            info!(
                mip = %dataset.mip,
                variable = %field.variable,
                members,
                months,
                nlat,
                nlon,
                "Assembled ensemble"
            );
        }
        if dataset.fields.is_empty() {
            warn!(mip = %dataset.mip, "No members loaded");
        }
    }

    let climatology = match &config.reanalysis {
        Some(reanalysis) => {
            let mut weights = WeightCache::new(config.grid.weight_cache_entries);
            let clim = load_reanalysis(
                &reanalysis.path,
                config.timeslice.as_ref(),
                config.grid.coarsen_size,
                &mut weights,
            )
            .with_context(|| format!("Failed to load reanalysis from {}", reanalysis.path.display()))?;
            info!(variables = ?clim.variables().collect::<Vec<_>>(), "Loaded reanalysis climatology");
            Some((reanalysis, clim))
        }
        None => None,
    };

    let Some(dir) = &config.output.dir else {
        info!("No output directory configured, nothing written");
        return Ok(());
    };

    let writer = ZarrWriter::new(config.grid.clone());
    let areas = calc_area(&LatLonGrid::common(), 1.0, 1.0, config.grid.coarsen_size)?;
    let mut summary = RunSummary::from_ensembles(&ensembles);
    for dataset in &ensembles {
        write_ensemble(&writer, dir, dataset, Some(&areas), &mut summary)?;
    }
    if let Some((reanalysis, clim)) = &climatology {
        let store = write_reanalysis(&writer, dir, clim)?;
        summary.reanalysis = Some(ReanalysisSummary {
            source: reanalysis.path.clone(),
            variables: clim.variables().map(str::to_string).collect(),
            store: Some(store),
        });
    }
    let path = write_summary(dir, &summary)?;
    info!(summary = %path.display(), "Ensemble loader finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "ensemble-loader",
            "--mip",
            "cmip5",
            "--mip",
            "tar",
            "--var",
            "pr",
            "--timeslice",
            "1980-01/2009-12",
            "--no-ens-mean",
            "--output",
            "/tmp/ens",
            "--log-level",
            "DEBUG",
        ]);
        let mut config = LoaderConfig::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.mips, vec![MipId::Cmip5, MipId::Tar]);
        assert_eq!(config.variables, vec!["pr".to_string()]);
        assert!(config.timeslice.is_some());
        assert!(!config.ensemble_mean);
        assert_eq!(config.output.dir, Some(PathBuf::from("/tmp/ens")));
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_rejects_unknown_mip() {
        let args = Args::parse_from(["ensemble-loader", "--mip", "cmip4"]);
        let mut config = LoaderConfig::default();
        assert!(args.apply(&mut config).is_err());
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let args = Args::parse_from(["ensemble-loader"]);
        let mut config = LoaderConfig::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config, LoaderConfig::default());
    }
}

//! Loader configuration.
//!
//! Read from a YAML file with `${VAR}` / `${VAR:-default}` substitution,
//! then overridden by environment variables and finally by CLI flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cmip_common::{MipId, TimeSlice};
use grid_processor::GridProcessorConfig;
use ingestion::PipelineOptions;

/// Top-level loader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub catalog: CatalogConfig,
    /// Archives to load.
    pub mips: Vec<MipId>,
    /// Variable ids to load from every archive.
    pub variables: Vec<String>,
    pub timeslice: Option<TimeSlice>,
    /// Prepend the `ens-mean` member.
    pub ensemble_mean: bool,
    pub grid: GridProcessorConfig,
    pub output: OutputConfig,
    pub reanalysis: Option<ReanalysisConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Bucket base URL, or a local directory with the same layout.
    pub base_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write `<dir>/<mip>/<var>.zarr` and `<dir>/summary.json`. Nothing is
    /// written when unset.
    pub dir: Option<PathBuf>,
}

/// Reference climatology from a local NetCDF file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReanalysisConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            mips: MipId::ALL.to_vec(),
            variables: vec!["tas".to_string(), "pr".to_string(), "psl".to_string()],
            timeslice: None,
            ensemble_mean: true,
            grid: GridProcessorConfig::default(),
            output: OutputConfig::default(),
            reanalysis: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: PipelineOptions::default().catalog_base_url,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoaderConfig {
    /// Load a YAML file, expanding `${VAR}` references.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read loader config from {:?}", path.as_ref()))?;
        let expanded = expand_env_vars(&content)?;
        serde_yaml::from_str(&expanded)
            .with_context(|| format!("Failed to parse loader config from {:?}", path.as_ref()))
    }

    /// Apply `CMIP_CATALOG_BASE_URL` plus the grid overrides read by
    /// [`GridProcessorConfig::apply_env`].
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base) = env::var("CMIP_CATALOG_BASE_URL") {
            if !base.is_empty() {
                self.catalog.base_url = base;
            }
        }
        self.grid.apply_env();
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.mips.is_empty(), "At least one archive must be configured");
        anyhow::ensure!(!self.variables.is_empty(), "At least one variable must be configured");
        anyhow::ensure!(
            !self.catalog.base_url.trim().is_empty(),
            "Catalog base URL cannot be empty"
        );
        self.grid
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid grid configuration: {e}"))?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        anyhow::ensure!(
            valid_levels.contains(&self.logging.level.as_str()),
            "Invalid log level: {}",
            self.logging.level
        );
        Ok(())
    }

    /// Options handed to the ingestion pipeline.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions::from_grid_config(self.variables.clone(), &self.grid)
            .with_mips(self.mips.clone())
            .with_timeslice(self.timeslice)
            .with_catalog_base_url(self.catalog.base_url.clone())
    }
}

/// Expand `${VAR}` and `${VAR:-default}` in YAML content.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", expr),
                }
            }
            result.push_str(&resolve_var_expr(&expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = LoaderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.catalog.base_url, "https://storage.googleapis.com");
        assert!(config.ensemble_mean);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
mips: [cmip5, cmip6]
variables: [pr]
timeslice: "1980-01/2009-12"
ensemble_mean: false
grid:
  coarsen_size: 3
output:
  dir: /tmp/out
logging:
  level: debug
"#;
        let config: LoaderConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.mips, vec![MipId::Cmip5, MipId::Cmip6]);
        assert_eq!(config.variables, vec!["pr".to_string()]);
        assert!(!config.ensemble_mean);
        assert_eq!(config.grid.coarsen_size, 3);
        assert_eq!(config.grid.time_chunk, 30);
        assert_eq!(config.output.dir, Some(PathBuf::from("/tmp/out")));
        assert!(config.validate().is_ok());

        let options = config.pipeline_options();
        assert_eq!(options.coarsen_size, 3);
        assert_eq!(options.mips.len(), 2);
        assert!(options.timeslice.is_some());
    }

    #[test]
    fn test_from_yaml_expands_env() {
        std::env::set_var("LOADER_TEST_BASE", "/data/catalogs");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.yaml");
        fs::write(&path, "catalog:\n  base_url: ${LOADER_TEST_BASE}\nvariables: [${LOADER_TEST_VAR:-tas}]\n").unwrap();

        let config = LoaderConfig::from_yaml(&path).unwrap();
        assert_eq!(config.catalog.base_url, "/data/catalogs");
        assert_eq!(config.variables, vec!["tas".to_string()]);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("CMIP_TIME_CHUNK", "12");
        let mut config = LoaderConfig::default();
        config.apply_env_overrides();
        std::env::remove_var("CMIP_TIME_CHUNK");
        assert_eq!(config.grid.time_chunk, 12);
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("LOADER_REQUIRED_VAR");
        assert!(expand_env_vars("${LOADER_REQUIRED_VAR}").is_err());
        assert!(expand_env_vars("${UNCLOSED").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = LoaderConfig::default();
        config.logging.level = "verbose".into();
        assert!(config.validate().is_err());

        let mut config = LoaderConfig::default();
        config.variables.clear();
        assert!(config.validate().is_err());

        let mut config = LoaderConfig::default();
        config.grid.coarsen_size = 0;
        assert!(config.validate().is_err());
    }
}

//! Catalog records and record search.

use serde::{Deserialize, Serialize};

use cmip_common::DatasetKey;

/// One row of a catalog table. Columns not listed here are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub activity_id: String,
    pub institution_id: String,
    pub source_id: String,
    pub experiment_id: String,
    pub member_id: String,
    pub table_id: String,
    pub variable_id: String,
    pub grid_label: String,
    /// Store location (`gs://`, `https://`, or local path).
    pub zstore: String,
    #[serde(default)]
    pub dcpp_init_year: Option<f64>,
    #[serde(default)]
    pub version: Option<String>,
}

impl CatalogRecord {
    /// Key `activity.institution.source.experiment.member.table.variable.grid`.
    pub fn dataset_key(&self) -> DatasetKey {
        DatasetKey::new(
            self.activity_id.as_str(),
            self.institution_id.as_str(),
            self.source_id.as_str(),
            self.experiment_id.as_str(),
            self.member_id.as_str(),
            self.table_id.as_str(),
            self.variable_id.as_str(),
            self.grid_label.as_str(),
        )
    }
}

/// Exact-match filter over catalog records. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub experiment_id: Option<String>,
    pub variable_id: Option<String>,
    pub table_id: Option<String>,
}

impl CatalogQuery {
    /// Historical-experiment monthly atmosphere (`Amon`) records of one variable.
    pub fn historical_monthly(variable: &str) -> Self {
        Self {
            experiment_id: Some("historical".to_string()),
            variable_id: Some(variable.to_string()),
            table_id: Some("Amon".to_string()),
        }
    }

    pub fn matches(&self, record: &CatalogRecord) -> bool {
        fn field(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }
        field(&self.experiment_id, &record.experiment_id)
            && field(&self.variable_id, &record.variable_id)
            && field(&self.table_id, &record.table_id)
    }
}

//! Dataset keys.
//!
//! A key identifies one catalogued store and is written as
//! `activity.institution.source.experiment.member.table.variable.grid`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CmipError;

const FIELD_COUNT: usize = 8;

/// Parsed dot-delimited dataset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetKey {
    pub activity_id: String,
    pub institution_id: String,
    pub source_id: String,
    pub experiment_id: String,
    pub member_id: String,
    pub table_id: String,
    pub variable_id: String,
    pub grid_label: String,
}

impl DatasetKey {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        activity_id: impl Into<String>,
        institution_id: impl Into<String>,
        source_id: impl Into<String>,
        experiment_id: impl Into<String>,
        member_id: impl Into<String>,
        table_id: impl Into<String>,
        variable_id: impl Into<String>,
        grid_label: impl Into<String>,
    ) -> Self {
        Self {
            activity_id: activity_id.into(),
            institution_id: institution_id.into(),
            source_id: source_id.into(),
            experiment_id: experiment_id.into(),
            member_id: member_id.into(),
            table_id: table_id.into(),
            variable_id: variable_id.into(),
            grid_label: grid_label.into(),
        }
    }

    /// The key with member and variable removed, i.e. the identifier of the
    /// model/experiment group: `activity.institution.source.experiment.table.grid`.
    pub fn group_key(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}.{}",
            self.activity_id,
            self.institution_id,
            self.source_id,
            self.experiment_id,
            self.table_id,
            self.grid_label
        )
    }

    /// Short model name, `institution-source`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.institution_id, self.source_id)
    }

    /// Label of this dataset along the ensemble axis, `institution-source-member`.
    pub fn ensemble_label(&self) -> String {
        format!("{}-{}", self.name(), self.member_id)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}.{}.{}.{}",
            self.activity_id,
            self.institution_id,
            self.source_id,
            self.experiment_id,
            self.member_id,
            self.table_id,
            self.variable_id,
            self.grid_label
        )
    }
}

impl FromStr for DatasetKey {
    type Err = CmipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != FIELD_COUNT {
            return Err(CmipError::InvalidDatasetKey {
                key: s.to_string(),
                message: format!("expected {} fields, found {}", FIELD_COUNT, parts.len()),
            });
        }
        if let Some(pos) = parts.iter().position(|p| p.is_empty()) {
            return Err(CmipError::InvalidDatasetKey {
                key: s.to_string(),
                message: format!("field {} is empty", pos),
            });
        }

        Ok(Self::new(
            parts[0], parts[1], parts[2], parts[3], parts[4], parts[5], parts[6], parts[7],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hadcm3() -> DatasetKey {
        DatasetKey::new(
            "CMIP5", "MOHC", "HadCM3", "historical", "r1i1p1", "Amon", "tas", "gn",
        )
    }

    #[test]
    fn test_display_roundtrip() {
        let key = hadcm3();
        let text = key.to_string();
        assert_eq!(text, "CMIP5.MOHC.HadCM3.historical.r1i1p1.Amon.tas.gn");
        assert_eq!(text.parse::<DatasetKey>().unwrap(), key);
    }

    #[test]
    fn test_positional_fields() {
        let text = "CMIP6.UA.MCM-UA-1-0.historical.r1i1p1f2.Amon.pr.gn";
        let parts: Vec<&str> = text.split('.').collect();
        let key: DatasetKey = text.parse().unwrap();
        assert_eq!(key.activity_id, parts[0]);
        assert_eq!(key.source_id, parts[2]);
        assert_eq!(key.member_id, parts[4]);
    }

    #[test]
    fn test_group_key_and_labels() {
        let key = hadcm3();
        assert_eq!(key.group_key(), "CMIP5.MOHC.HadCM3.historical.Amon.gn");
        assert_eq!(key.name(), "MOHC-HadCM3");
        assert_eq!(key.ensemble_label(), "MOHC-HadCM3-r1i1p1");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("CMIP5.MOHC.HadCM3".parse::<DatasetKey>().is_err());
        assert!("CMIP5..HadCM3.historical.r1.Amon.tas.gn"
            .parse::<DatasetKey>()
            .is_err());
    }
}

//! Archive identifiers (the `mip_id` of a dataset).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CmipError;

/// One of the model-output collections a dataset can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MipId {
    /// First Assessment Report
    Far,
    /// Second Assessment Report
    Sar,
    /// Third Assessment Report
    Tar,
    Cmip3,
    Cmip5,
    Cmip6,
}

impl MipId {
    /// Every archive, in chronological order.
    pub const ALL: [MipId; 6] = [
        MipId::Far,
        MipId::Sar,
        MipId::Tar,
        MipId::Cmip3,
        MipId::Cmip5,
        MipId::Cmip6,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MipId::Far => "far",
            MipId::Sar => "sar",
            MipId::Tar => "tar",
            MipId::Cmip3 => "cmip3",
            MipId::Cmip5 => "cmip5",
            MipId::Cmip6 => "cmip6",
        }
    }

    /// Assessment-report archives live in their own `ipcc-*` buckets.
    pub fn is_assessment_report(&self) -> bool {
        self.as_str().contains("ar")
    }
}

impl fmt::Display for MipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MipId {
    type Err = CmipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "far" => Ok(MipId::Far),
            "sar" => Ok(MipId::Sar),
            "tar" => Ok(MipId::Tar),
            "cmip3" => Ok(MipId::Cmip3),
            "cmip5" => Ok(MipId::Cmip5),
            "cmip6" => Ok(MipId::Cmip6),
            _ => Err(CmipError::UnknownMipId(s.to_string())),
        }
    }
}

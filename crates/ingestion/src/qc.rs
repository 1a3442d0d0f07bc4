//! Per-model corrections applied after regridding.
//!
//! The rule table is static: unit fixes for one CMIP6 model, masking of
//! another, and a list of model groups whose latitude labels are stored
//! upside down.

use tracing::info;

use cmip_common::{DatasetKey, MipId};
use grid_processor::GriddedField;

const CM_TO_M: f32 = 1.0e-2;
const RHO_WATER: f32 = 1.0e3;
const DAY_IN_S: f32 = 24.0 * 60.0 * 60.0;

/// cm/day of water to kg m⁻² s⁻¹.
pub const CM_PER_DAY_TO_FLUX: f32 = CM_TO_M * RHO_WATER / DAY_IN_S;

/// Group keys (`activity.institution.source.experiment.table.grid`) whose
/// latitude labels are reversed.
pub const REVERSE_LAT_GROUPS: [&str; 6] = [
    "SAR.MPIfM.MPIfM-01.historical.Amon.gn",
    "SAR.HCCPR-HCCPR-01.historical.Amon.gn",
    "TAR.MPIfM.MPIfM.historical.Amon.gn",
    "CMIP3.IPSL.ipsl_cm4.historical.Amon.gn",
    "CMIP3.MOHC.ukmo_hadcm3.historical.Amon.gn",
    "CMIP5.MOHC.HadCM3.historical.Amon.gn",
];

/// A correction applied to one member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Multiply all values.
    Scale(f32),
    /// Replace all values with NaN.
    MaskAll,
    /// Reverse latitude labels, values untouched.
    ReverseLat,
}

/// Corrections that apply to `variable` of the dataset `key` in archive `mip`.
pub fn corrections_for(field: &GriddedField, variable: &str, key: &DatasetKey, mip: MipId) -> Vec<Correction> {
    let mut out = Vec::new();

    if mip == MipId::Cmip6 && variable == "pr" {
        if key.source_id.contains("MCM-UA-1-0") {
            out.push(Correction::Scale(CM_PER_DAY_TO_FLUX));
        }
        let parent = field
            .attrs
            .get("parent_source_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if parent.contains("THU-CIESM") {
            out.push(Correction::MaskAll);
        }
    }

    if REVERSE_LAT_GROUPS.contains(&key.group_key().as_str()) {
        out.push(Correction::ReverseLat);
    }

    out
}

/// Apply every matching correction in place and return what was applied.
pub fn quality_control(field: &mut GriddedField, variable: &str, key: &DatasetKey, mip: MipId) -> Vec<Correction> {
    let corrections = corrections_for(field, variable, key, mip);
    for correction in &corrections {
        match *correction {
            Correction::Scale(factor) => field.scale(factor),
            Correction::MaskAll => field.fill_nan(),
            Correction::ReverseLat => field.reverse_lat_labels(),
        }
        info!(key = %key, correction = ?correction, "Applied quality control");
    }
    corrections
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use grid_processor::{Attrs, LatLonGrid};
    use ndarray::Array3;
    use serde_json::json;

    fn field(value: f32, attrs: Attrs) -> GriddedField {
        GriddedField::new(
            "pr",
            vec![NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()],
            LatLonGrid::regular(-45.0, 90.0, 2, 0.0, 180.0, 2),
            Array3::from_elem((1, 2, 2), value),
            attrs,
        )
        .unwrap()
    }

    fn key(activity: &str, institution: &str, source: &str, variable: &str) -> DatasetKey {
        DatasetKey::new(activity, institution, source, "historical", "r1i1p1", "Amon", variable, "gn")
    }

    #[test]
    fn test_mcm_ua_precip_scaled() {
        let mut f = field(100.0, Attrs::new());
        let applied = quality_control(&mut f, "pr", &key("CMIP", "UA", "MCM-UA-1-0", "pr"), MipId::Cmip6);
        assert_eq!(applied, vec![Correction::Scale(CM_PER_DAY_TO_FLUX)]);
        let expected = 100.0 * (1e-2 * 1e3 / 86400.0);
        assert!((f.data[[0, 0, 0]] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_mcm_ua_only_in_cmip6() {
        let mut f = field(100.0, Attrs::new());
        let applied = quality_control(&mut f, "pr", &key("CMIP5", "UA", "MCM-UA-1-0", "pr"), MipId::Cmip5);
        assert!(applied.is_empty());
        assert_eq!(f.data[[0, 0, 0]], 100.0);

        let applied = quality_control(&mut f, "tas", &key("CMIP", "UA", "MCM-UA-1-0", "tas"), MipId::Cmip6);
        assert!(applied.is_empty());
    }

    #[test]
    fn test_thu_ciesm_masked() {
        let mut attrs = Attrs::new();
        attrs.insert("parent_source_id".into(), json!("THU-CIESM"));
        let mut f = field(1.0, attrs);
        quality_control(&mut f, "pr", &key("CMIP", "THU", "CIESM", "pr"), MipId::Cmip6);
        assert!(f.data.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_reverse_lat_groups() {
        let mut f = field(1.0, Attrs::new());
        let before = f.grid.lat.clone();
        let applied = quality_control(&mut f, "tas", &key("CMIP5", "MOHC", "HadCM3", "tas"), MipId::Cmip5);
        assert_eq!(applied, vec![Correction::ReverseLat]);
        let mut reversed = before.clone();
        reversed.reverse();
        assert_eq!(f.grid.lat, reversed);
        assert_eq!(f.data[[0, 0, 0]], 1.0);
    }

    #[test]
    fn test_unlisted_group_untouched() {
        let f = field(1.0, Attrs::new());
        let key = key("CMIP6", "MOHC", "HadGEM3-GC31-LL", "tas");
        assert!(corrections_for(&f, "tas", &key, MipId::Cmip6).is_empty());
    }
}

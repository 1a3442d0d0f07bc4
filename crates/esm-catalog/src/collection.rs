//! ESM collection description (the JSON half of a catalog).

use serde::{Deserialize, Serialize};

/// Column documented by the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub column_name: String,
    #[serde(default)]
    pub vocabulary: String,
}

/// Which column holds the asset location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub column_name: String,
    #[serde(default)]
    pub format: Option<String>,
}

/// Parsed collection JSON.
///
/// Unknown fields (aggregation control and the like) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    #[serde(default)]
    pub esmcat_version: Option<String>,
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Record table location: absolute URL/path or relative to the JSON.
    pub catalog_file: String,
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    pub assets: AssetSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pangeo_style_collection() {
        let json = r#"{
            "esmcat_version": "0.1.0",
            "id": "pangeo-cmip6",
            "description": "This is an ESM collection for CMIP6 Zarr data residing in Pangeo's Google Storage.",
            "catalog_file": "https://storage.googleapis.com/cmip6/pangeo-cmip6.csv",
            "attributes": [
                {"column_name": "activity_id", "vocabulary": "https://raw.githubusercontent.com/WCRP-CMIP/CMIP6_CVs/master/CMIP6_activity_id.json"},
                {"column_name": "source_id"}
            ],
            "assets": {"column_name": "zstore", "format": "zarr"},
            "aggregation_control": {"variable_column_name": "variable_id", "groupby_attrs": []}
        }"#;
        let spec: CollectionSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.id, "pangeo-cmip6");
        assert_eq!(spec.assets.column_name, "zstore");
        assert_eq!(spec.attributes.len(), 2);
        assert_eq!(spec.attributes[1].vocabulary, "");
    }
}

//! Opening catalogs and searching their records.

use reqwest::Client;
use tracing::{debug, info};

use cmip_common::MipId;

use crate::collection::CollectionSpec;
use crate::error::{CatalogError, CatalogResult};
use crate::location::CatalogLocation;
use crate::record::{CatalogQuery, CatalogRecord};

/// Default host of the public archive catalogs.
pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// Collection JSON location for an archive.
///
/// Assessment-report archives (far, sar, tar) live under `ipcc-{id}`,
/// the others under `cmip6`.
pub fn catalog_url(mip: MipId, base: &str) -> String {
    let base = base.trim_end_matches('/');
    let id = mip.as_str();
    if mip.is_assessment_report() {
        format!("{base}/ipcc-{id}/pangeo-{id}.json")
    } else {
        format!("{base}/cmip6/pangeo-{id}.json")
    }
}

/// An opened ESM collection: description plus record table.
#[derive(Debug, Clone)]
pub struct EsmCatalog {
    spec: CollectionSpec,
    location: CatalogLocation,
    records: Vec<CatalogRecord>,
}

impl EsmCatalog {
    /// Fetch and parse the collection JSON at `location` and its record table.
    pub async fn open(location: &str, client: &Client) -> CatalogResult<Self> {
        let location = CatalogLocation::parse(location)?;
        let raw = location.fetch(client).await?;
        let spec: CollectionSpec =
            serde_json::from_slice(&raw).map_err(|e| CatalogError::InvalidCollection {
                location: location.to_string(),
                message: e.to_string(),
            })?;

        let table_location = location.resolve(&spec.catalog_file)?;
        let table = table_location.fetch_decoded(client).await?;
        let records = parse_records(&table, &spec.assets.column_name, &table_location)?;

        info!(
            catalog = %spec.id,
            records = records.len(),
            table = %table_location,
            "Opened catalog"
        );

        Ok(Self {
            spec,
            location,
            records,
        })
    }

    /// Build a catalog from already parsed parts.
    pub fn from_parts(spec: CollectionSpec, location: CatalogLocation, records: Vec<CatalogRecord>) -> Self {
        Self {
            spec,
            location,
            records,
        }
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    pub fn location(&self) -> &CatalogLocation {
        &self.location
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records matching `query`, in table order.
    pub fn search(&self, query: &CatalogQuery) -> Vec<&CatalogRecord> {
        let found: Vec<&CatalogRecord> = self.records.iter().filter(|r| query.matches(r)).collect();
        debug!(catalog = %self.spec.id, query = ?query, matches = found.len(), "Catalog search");
        found
    }
}

/// Parse a CSV record table. The asset column may be named anything in the
/// collection; it is mapped onto `zstore`.
fn parse_records(
    table: &[u8],
    asset_column: &str,
    location: &CatalogLocation,
) -> CatalogResult<Vec<CatalogRecord>> {
    let invalid = |message: String| CatalogError::InvalidTable {
        location: location.to_string(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(table);
    let mut headers = reader.headers().map_err(|e| invalid(e.to_string()))?.clone();
    if asset_column != "zstore" {
        headers = headers
            .iter()
            .map(|h| if h == asset_column { "zstore" } else { h })
            .collect();
    }

    reader
        .records()
        .map(|row| {
            let row = row.map_err(|e| invalid(e.to_string()))?;
            row.deserialize(Some(&headers)).map_err(|e| invalid(e.to_string()))
        })
        .collect()
}

/// Catalogs keyed by archive, in the order they were requested.
#[derive(Debug, Clone, Default)]
pub struct CatalogSet {
    entries: Vec<(MipId, EsmCatalog)>,
}

impl CatalogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the catalog for `mip`.
    pub fn insert(&mut self, mip: MipId, catalog: EsmCatalog) {
        match self.entries.iter_mut().find(|(m, _)| *m == mip) {
            Some(entry) => entry.1 = catalog,
            None => self.entries.push((mip, catalog)),
        }
    }

    pub fn get(&self, mip: MipId) -> Option<&EsmCatalog> {
        self.entries.iter().find(|(m, _)| *m == mip).map(|(_, c)| c)
    }

    pub fn mips(&self) -> impl Iterator<Item = MipId> + '_ {
        self.entries.iter().map(|(m, _)| *m)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MipId, &EsmCatalog)> {
        self.entries.iter().map(|(m, c)| (*m, c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Open one catalog per archive from `{base}` URL templates.
///
/// `base` may be a local directory laid out like the public bucket. No
/// retries; the first failure is returned.
pub async fn open_collections(mips: &[MipId], base: &str, client: &Client) -> CatalogResult<CatalogSet> {
    let mut set = CatalogSet::new();
    for &mip in mips {
        let url = catalog_url(mip, base);
        debug!(mip = %mip, url = %url, "Opening catalog");
        set.insert(mip, EsmCatalog::open(&url, client).await?);
    }
    Ok(set)
}

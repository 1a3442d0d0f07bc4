//! Integration tests: open catalogs written to a local directory laid out
//! like the public archive bucket.

use cmip_common::MipId;
use esm_catalog::{open_collections, CatalogQuery, EsmCatalog};
use reqwest::Client;
use test_utils::{write_catalog, CatalogRow};

fn rows() -> Vec<CatalogRow> {
    vec![
        CatalogRow::historical("CMIP", "NCAR", "CESM2", "r1i1p1f1", "tas", "gs://cmip6/CMIP6/CMIP/NCAR/CESM2/tas"),
        CatalogRow::historical("CMIP", "NCAR", "CESM2", "r2i1p1f1", "tas", "gs://cmip6/CMIP6/CMIP/NCAR/CESM2/tas2"),
        CatalogRow::historical("CMIP", "NCAR", "CESM2", "r1i1p1f1", "pr", "gs://cmip6/CMIP6/CMIP/NCAR/CESM2/pr"),
        CatalogRow::historical("ScenarioMIP", "NCAR", "CESM2", "r1i1p1f1", "tas", "gs://x")
            .with_experiment("ssp585"),
        CatalogRow::historical("CMIP", "NCAR", "CESM2", "r1i1p1f1", "tas", "gs://y").with_table("day"),
    ]
}

#[tokio::test]
async fn test_open_plain_csv_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let json = write_catalog(&dir.path().join("cmip6"), "pangeo-cmip6", &rows(), false).unwrap();

    let catalog = EsmCatalog::open(json.to_str().unwrap(), &Client::new()).await.unwrap();
    assert_eq!(catalog.spec().id, "pangeo-cmip6");
    assert_eq!(catalog.len(), 5);

    let tas = catalog.search(&CatalogQuery::historical_monthly("tas"));
    assert_eq!(tas.len(), 2);
    assert_eq!(tas[0].member_id, "r1i1p1f1");
    assert_eq!(tas[1].member_id, "r2i1p1f1");

    assert!(catalog.search(&CatalogQuery::historical_monthly("psl")).is_empty());
}

#[tokio::test]
async fn test_open_gzip_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let json = write_catalog(dir.path(), "pangeo-cmip5", &rows(), true).unwrap();

    let catalog = EsmCatalog::open(json.to_str().unwrap(), &Client::new()).await.unwrap();
    assert_eq!(catalog.len(), 5);
    assert_eq!(catalog.search(&CatalogQuery::historical_monthly("pr")).len(), 1);
}

#[tokio::test]
async fn test_open_collections_keeps_request_order() {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(&dir.path().join("ipcc-sar"), "pangeo-sar", &rows(), false).unwrap();
    write_catalog(&dir.path().join("cmip6"), "pangeo-cmip6", &rows(), true).unwrap();

    let base = dir.path().to_str().unwrap();
    let set = open_collections(&[MipId::Cmip6, MipId::Sar], base, &Client::new())
        .await
        .unwrap();

    assert_eq!(set.mips().collect::<Vec<_>>(), vec![MipId::Cmip6, MipId::Sar]);
    assert_eq!(set.get(MipId::Sar).unwrap().spec().id, "pangeo-sar");
    assert!(set.get(MipId::Tar).is_none());
}

#[tokio::test]
async fn test_missing_catalog_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_str().unwrap();
    let result = open_collections(&[MipId::Far], base, &Client::new()).await;
    assert!(result.is_err());
}

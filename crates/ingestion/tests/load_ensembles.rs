//! Integration tests: catalogs and Zarr stores written to a temp directory
//! laid out like the public archive bucket, loaded end to end.

use std::path::Path;

use chrono::NaiveDate;
use cmip_common::MipId;
use esm_catalog::{CatalogQuery, EsmCatalog};
use ingestion::{
    add_ensemble_mean, load_ensembles, MemberOutcome, Pipeline, PipelineOptions, SkipReason,
};
use reqwest::Client;
use serde_json::json;
use test_utils::{
    assert_approx_eq, model_lat_axis, model_lon_axis, noleap_mid_month_days, write_catalog, CatalogRow,
    ZarrStoreFixture,
};

const MONTHS: usize = 24;

fn store(dir: &Path, name: &str, fixture: ZarrStoreFixture) -> String {
    let path = dir.join("stores").join(name);
    fixture.write(&path).unwrap();
    path.to_str().unwrap().to_string()
}

fn constant(variable: &str, value: f32) -> ZarrStoreFixture {
    ZarrStoreFixture::constant(
        variable,
        model_lat_axis(10.0),
        model_lon_axis(10.0),
        noleap_mid_month_days(1850, 1850, MONTHS),
        value,
    )
}

/// Writes a CMIP6 and a CMIP5 catalog under `dir`.
fn write_archive(dir: &Path) {
    let r1 = store(dir, "cesm2-r1-tas", constant("tas", 280.0));
    let r2 = store(
        dir,
        "cesm2-r2-tas",
        constant("tas", 290.0)
            .with_dim_names("latitude", "longitude")
            .with_singleton_dim("member_id"),
    );

    let mut dup = constant("tas", 1.0);
    dup.time = vec![14.0, 20.0];
    dup.values.truncate(2 * 18 * 36);
    let dup = store(dir, "dup-tas", dup);

    let mut bad_grid = constant("tas", 1.0);
    bad_grid.lat = vec![0.0; 18];
    let bad_grid = store(dir, "badgrid-tas", bad_grid);

    let pr = store(
        dir,
        "mcm-pr",
        constant("pr", 100.0).with_global_attr("parent_source_id", json!("MCM-UA-1-0")),
    );
    let ciesm = store(
        dir,
        "ciesm-pr",
        constant("pr", 3e-5).with_global_attr("parent_source_id", json!("THU-CIESM")),
    );

    write_catalog(
        &dir.join("cmip6"),
        "pangeo-cmip6",
        &[
            CatalogRow::historical("CMIP", "NCAR", "CESM2", "r1i1p1f1", "tas", r1),
            CatalogRow::historical("CMIP", "NCAR", "CESM2", "r2i1p1f1", "tas", r2),
            CatalogRow::historical("CMIP", "BAD", "DUP", "r1i1p1f1", "tas", dup),
            CatalogRow::historical("CMIP", "BAD", "GRID", "r1i1p1f1", "tas", bad_grid),
            CatalogRow::historical("CMIP", "UA", "MCM-UA-1-0", "r1i1p1f2", "pr", pr),
            CatalogRow::historical("CMIP", "THU", "CIESM", "r1i1p1f1", "pr", ciesm),
        ],
        false,
    )
    .unwrap();

    let hadcm3 = store(dir, "hadcm3-tas", constant("tas", 270.0));
    write_catalog(
        &dir.join("cmip6"),
        "pangeo-cmip5",
        &[CatalogRow::historical("CMIP5", "MOHC", "HadCM3", "r1i1p1", "tas", hadcm3)],
        true,
    )
    .unwrap();
}

fn options(dir: &Path, mips: Vec<MipId>) -> PipelineOptions {
    PipelineOptions {
        variables: vec!["tas".to_string(), "pr".to_string()],
        ..Default::default()
    }
    .with_mips(mips)
    .with_catalog_base_url(dir.to_str().unwrap())
    .with_progress(false)
}

#[tokio::test]
async fn test_load_ensembles_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_archive(dir.path());

    let opts = options(dir.path(), vec![MipId::Cmip6, MipId::Cmip5]);
    let mut ensembles = load_ensembles(&opts, &Client::new()).await.unwrap();

    assert_eq!(ensembles.len(), 2);
    assert_eq!(ensembles[0].mip, MipId::Cmip6);
    assert_eq!(ensembles[1].mip, MipId::Cmip5);

    let tas = ensembles[0].get("tas").unwrap();
    // Duplicate-month and bad-grid stores are skipped
    assert_eq!(tas.shape(), (2, MONTHS, 90, 180));
    assert_eq!(tas.members[0].ensemble, "NCAR-CESM2-r1i1p1f1");
    assert_eq!(tas.members[1].ensemble, "NCAR-CESM2-r2i1p1f1");
    assert_eq!(tas.members[1].mip_id, "CMIP");
    assert_eq!(tas.times[0], NaiveDate::from_ymd_opt(1850, 1, 1).unwrap());
    assert_eq!(tas.attrs["name"], json!("NCAR-CESM2"));
    assert_eq!(tas.attrs["mip_id"], json!("cmip6"));

    // Coarse row 45 is centred on 1°N
    assert_approx_eq!(tas.grid.lat[45], 1.0, 1e-9);
    assert_approx_eq!(tas.data[[0, 0, 45, 10]], 280.0, 1e-3);
    assert_approx_eq!(tas.data[[1, 5, 45, 10]], 290.0, 1e-3);
    // Outside the source latitude span
    assert!(tas.data[[0, 0, 0, 0]].is_nan());

    let pr = ensembles[0].get("pr").unwrap();
    assert_eq!(pr.shape().0, 2);
    assert_approx_eq!(pr.data[[0, 0, 45, 0]], 100.0 * (1e-2 * 1e3 / 86400.0), 1e-6);
    // CIESM precipitation is masked out entirely
    assert_eq!(pr.members[1].ensemble, "THU-CIESM-r1i1p1f1");
    assert!(pr.data.index_axis(ndarray::Axis(0), 1).iter().all(|v| v.is_nan()));

    // CMIP5 has no pr records, so no pr entry
    assert!(ensembles[1].get("pr").is_none());

    add_ensemble_mean(&mut ensembles).unwrap();
    let tas = ensembles[0].get("tas").unwrap();
    assert_eq!(tas.shape().0, 3);
    assert_eq!(tas.members[0].ensemble, "ens-mean");
    assert_eq!(tas.members[0].mip_id, "cmip6");
    assert_approx_eq!(tas.data[[0, 3, 45, 10]], 285.0, 1e-3);
    assert_eq!(ensembles[0].attrs["name"], json!("cmip6"));
}

#[tokio::test]
async fn test_skip_reasons_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    write_archive(dir.path());

    let json = dir.path().join("cmip6").join("pangeo-cmip6.json");
    let catalog = EsmCatalog::open(json.to_str().unwrap(), &Client::new()).await.unwrap();

    let mut pipeline = Pipeline::new(options(dir.path(), vec![MipId::Cmip6])).unwrap();
    let members = pipeline.load_variable(MipId::Cmip6, &catalog, "tas").unwrap().unwrap();
    assert_eq!(members.members.len(), 2);

    let skipped = pipeline.skipped();
    assert_eq!(skipped.len(), 2);
    assert_eq!(skipped[0].0.to_string(), "CMIP.BAD.DUP.historical.r1i1p1f1.Amon.tas.gn");
    assert_eq!(skipped[0].1, SkipReason::DuplicateTimes);
    assert!(matches!(skipped[1].1, SkipReason::Regrid(_)));

    // Both CESM2 members share a native grid, so weights are built once
    assert_eq!(pipeline.cache_stats().hits, 1);

    assert!(pipeline.load_variable(MipId::Cmip6, &catalog, "psl").unwrap().is_none());
}

#[tokio::test]
async fn test_timeslice_selects_months() {
    let dir = tempfile::tempdir().unwrap();
    write_archive(dir.path());

    let opts = options(dir.path(), vec![MipId::Cmip6])
        .with_timeslice(Some("1850-06/1850-12".parse().unwrap()));
    let ensembles = load_ensembles(&opts, &Client::new()).await.unwrap();

    let tas = ensembles[0].get("tas").unwrap();
    assert_eq!(tas.times.len(), 7);
    assert_eq!(tas.times[0], NaiveDate::from_ymd_opt(1850, 6, 1).unwrap());
    assert_eq!(tas.times[6], NaiveDate::from_ymd_opt(1850, 12, 1).unwrap());
}

#[tokio::test]
async fn test_timeslice_outside_data_skips_members() {
    let dir = tempfile::tempdir().unwrap();
    write_archive(dir.path());

    let json = dir.path().join("cmip6").join("pangeo-cmip6.json");
    let catalog = EsmCatalog::open(json.to_str().unwrap(), &Client::new()).await.unwrap();
    let record = catalog.search(&CatalogQuery::historical_monthly("tas"))[0].clone();

    let opts = options(dir.path(), vec![MipId::Cmip6])
        .with_timeslice(Some("1900-01/1900-12".parse().unwrap()));
    let mut pipeline = Pipeline::new(opts).unwrap();
    match pipeline.load_member(MipId::Cmip6, &record).unwrap() {
        MemberOutcome::Skipped(SkipReason::TimeSlice(_)) => {}
        other => panic!("expected time-slice skip, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reverse_latitude_group() {
    let dir = tempfile::tempdir().unwrap();
    write_archive(dir.path());

    let json = dir.path().join("cmip6").join("pangeo-cmip5.json");
    let catalog = EsmCatalog::open(json.to_str().unwrap(), &Client::new()).await.unwrap();
    let record = catalog.search(&CatalogQuery::historical_monthly("tas"))[0].clone();

    let mut pipeline = Pipeline::new(options(dir.path(), vec![MipId::Cmip5])).unwrap();
    let field = match pipeline.load_member(MipId::Cmip5, &record).unwrap() {
        MemberOutcome::Loaded(field) => field,
        other => panic!("expected a loaded member, got {other:?}"),
    };

    assert_eq!(field.grid.lat.len(), 90);
    assert_approx_eq!(field.grid.lat[0], 89.0, 1e-9);
    assert_approx_eq!(field.grid.lat[89], -89.0, 1e-9);
}

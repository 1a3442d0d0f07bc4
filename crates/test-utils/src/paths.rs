//! Locating optional sample files (reanalysis NetCDF extracts) that are not
//! checked into the repository.

use std::path::PathBuf;

/// Workspace root, two levels above this crate's manifest.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Look for `name` under `$TEST_DATA_DIR`, then the `testdata/` directories
/// of the crates that read sample files, then `testdata/` at the root.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let root = workspace_root();
    let mut candidates: Vec<PathBuf> = std::env::var("TEST_DATA_DIR")
        .map(|dir| vec![PathBuf::from(dir).join(name)])
        .unwrap_or_default();
    candidates.extend(
        ["crates/netcdf-parser/testdata", "crates/ingestion/testdata", "testdata"]
            .iter()
            .map(|dir| root.join(dir).join(name)),
    );
    candidates.into_iter().find(|path| path.exists())
}

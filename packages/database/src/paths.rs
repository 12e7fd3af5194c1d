#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the `DuckDB` data directory.
//!
//! All paths are relative to the project root's `data/` directory unless
//! overridden by the `SAFETY_MAP_DB` environment variable.

use std::path::{Path, PathBuf};

/// Environment variable that overrides the store location.
pub const DB_PATH_ENV: &str = "SAFETY_MAP_DB";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`, falling back to the
/// current directory when the manifest is not nested as expected.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the path of the safety map `DuckDB` file.
///
/// Uses `SAFETY_MAP_DB` when set, otherwise `data/safety_map.duckdb`.
#[must_use]
pub fn db_path() -> PathBuf {
    std::env::var_os(DB_PATH_ENV).map_or_else(|| data_dir().join("safety_map.duckdb"), PathBuf::from)
}

/// Returns the `data/generated/` directory for output artifacts.
#[must_use]
pub fn generated_dir() -> PathBuf {
    data_dir().join("generated")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Choropleth `GeoJSON` export of published area scores.
//!
//! Areas are read page by page in area ID order and written straight to
//! the output file, so memory stays constant regardless of how many areas
//! are stored. The same pages back the paginated HTTP endpoint.

pub mod choropleth;

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use duckdb::Connection;
use safety_map_database::DbError;
use safety_map_database::paths;
use safety_map_database::scores::latest_year;
use safety_map_scoring::progress::ProgressCallback;
use safety_map_scoring_models::PopulationKind;

pub use choropleth::{ChoroplethPage, area_feature, fetch_page, reassemble};

/// File name of the full choropleth collection under the generated dir.
pub const CHOROPLETH_FILE: &str = "area_scores.geojson";

/// Errors that can occur while exporting choropleth data.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored area boundary could not be read as a geometry.
    #[error("Invalid boundary for area {area_id}: {message}")]
    Geometry {
        /// The area whose boundary failed to parse.
        area_id: i64,
        /// Parser message.
        message: String,
    },

    /// Pages handed to [`reassemble`] do not form one collection.
    #[error("Pagination error: {message}")]
    Pagination {
        /// What did not line up.
        message: String,
    },

    /// A page size of zero was requested.
    #[error("Page size must be at least 1")]
    InvalidPageSize,

    /// No area scores have been published yet.
    #[error("No area scores have been published")]
    NoScores,
}

impl ExportError {
    pub(crate) fn pagination(message: impl Into<String>) -> Self {
        Self::Pagination {
            message: message.into(),
        }
    }
}

/// Result of a completed file export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Score year exported.
    pub year: i32,
    /// Features written.
    pub features: u64,
    /// Output file.
    pub path: PathBuf,
}

/// Default output path, `data/generated/area_scores.geojson`.
#[must_use]
pub fn default_output_path() -> PathBuf {
    paths::generated_dir().join(CHOROPLETH_FILE)
}

/// Resolves `year`, falling back to the latest published area year.
///
/// # Errors
///
/// Returns [`ExportError::NoScores`] if `year` is `None` and nothing has
/// been published.
pub fn resolve_year(conn: &Connection, year: Option<i32>) -> Result<i32, ExportError> {
    match year {
        Some(year) => Ok(year),
        None => latest_year(conn, PopulationKind::Area)?.ok_or(ExportError::NoScores),
    }
}

/// Writes every area as one `FeatureCollection` to `path`.
///
/// The file is assembled from consecutive pages of `page_size` areas and
/// is identical to what [`reassemble`] builds from the same pages.
///
/// # Errors
///
/// Returns [`ExportError`] if a query, a boundary, or a write fails.
pub fn export_geojson(
    conn: &Connection,
    year: Option<i32>,
    page_size: u64,
    path: &Path,
    progress: &dyn ProgressCallback,
) -> Result<ExportSummary, ExportError> {
    let year = resolve_year(conn, year)?;
    if let Some(parent) = path.parent() {
        paths::ensure_dir(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(b"{\"type\":\"FeatureCollection\",\"features\":[")?;

    let mut written = 0u64;
    let mut offset = Some(0);
    while let Some(current) = offset {
        let page = fetch_page(conn, year, current, page_size)?;
        if current == 0 {
            progress.set_total(page.total);
            progress.set_message(format!("Exporting {year} area scores"));
        }

        for feature in &page.collection.features {
            if written > 0 {
                writer.write_all(b",")?;
            }
            serde_json::to_writer(&mut writer, feature)?;
            written += 1;
        }
        progress.inc(page.collection.features.len() as u64);
        offset = page.next_offset;
    }

    writer.write_all(b"]}")?;
    writer.flush()?;

    progress.finish(format!("Exported {written} areas"));
    log::info!("Exported {written} area features for {year} to {}", path.display());

    Ok(ExportSummary {
        year,
        features: written,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use geojson::FeatureCollection;
    use safety_map_database::open_in_memory;
    use safety_map_database::units::upsert_areas;
    use safety_map_geography_models::{Area, LatLng, Municipality};
    use safety_map_scoring::progress::null_progress;

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("safety_map_generate_{}", std::process::id()))
            .join(name)
    }

    fn areas(count: i64) -> Vec<Area> {
        (1..=count)
            .map(|id| Area {
                id,
                name: format!("千代田区丸の内{id}丁目"),
                slug: format!("marunouchi-{id}"),
                location: Some(LatLng::new(35.68, 139.76)),
                municipality: Municipality::Chiyoda,
                boundary_geojson: None,
            })
            .collect()
    }

    #[test]
    fn file_matches_reassembled_pages() {
        let conn = open_in_memory().unwrap();
        upsert_areas(&conn, &areas(7)).unwrap();
        let path = temp_path("full.geojson");

        let summary = export_geojson(&conn, Some(2024), 3, &path, null_progress().as_ref()).unwrap();
        assert_eq!(summary.features, 7);

        let text = std::fs::read_to_string(&path).unwrap();
        let from_file: FeatureCollection = text.parse().unwrap();

        let pages = [0, 3, 6]
            .into_iter()
            .map(|offset| fetch_page(&conn, 2024, offset, 3).unwrap());
        assert_eq!(from_file, reassemble(pages).unwrap());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_store_writes_empty_collection() {
        let conn = open_in_memory().unwrap();
        let path = temp_path("empty.geojson");

        let summary = export_geojson(&conn, Some(2024), 10, &path, null_progress().as_ref()).unwrap();
        assert_eq!(summary.features, 0);
        let from_file: FeatureCollection =
            std::fs::read_to_string(&path).unwrap().parse().unwrap();
        assert!(from_file.features.is_empty());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn latest_year_required_when_unspecified() {
        let conn = open_in_memory().unwrap();
        assert!(matches!(
            resolve_year(&conn, None),
            Err(ExportError::NoScores)
        ));
        assert_eq!(resolve_year(&conn, Some(2019)).unwrap(), 2019);
    }
}

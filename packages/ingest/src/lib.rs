#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CSV ingestion for stations, areas, and crime records.
//!
//! Every row is validated before it is stored. Invalid rows are rejected
//! individually with their line number and reason; valid rows in the same
//! file are still ingested. Nothing here computes scores.

pub mod rows;

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use duckdb::Connection;
use safety_map_crime_models::{CrimeRecord, RecordSubject};
use safety_map_database::DbError;
use safety_map_geography_models::{Area, Municipality, Station};
use safety_map_ingest_models::{Dataset, IngestReport, Rejection};
use serde::de::DeserializeOwned;

use crate::rows::{AreaCrimeRow, AreaRow, MunicipalityCrimeRow, StationRow};

/// Errors that abort an ingest. Individual bad rows are never errors; they
/// are reported as [`Rejection`]s.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The file is not readable CSV.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Database error.
    #[error(transparent)]
    Database(#[from] DbError),
}

/// Rows that passed validation and the ones that did not.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    /// Valid rows, in file order.
    pub items: Vec<T>,
    /// Rejected rows, in file order.
    pub rejected: Vec<Rejection>,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// Slugs already published for one unit kind. Slugs are external
/// identifiers, so a stored unit may not change its slug and no other unit
/// may take it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedSlugs {
    by_id: BTreeMap<i64, String>,
    by_slug: BTreeMap<String, i64>,
}

impl PublishedSlugs {
    /// Builds the index from stored `(id, slug)` pairs.
    #[must_use]
    pub fn new(pairs: impl IntoIterator<Item = (i64, String)>) -> Self {
        let mut published = Self::default();
        for (id, slug) in pairs {
            published.by_slug.insert(slug.clone(), id);
            published.by_id.insert(id, slug);
        }
        published
    }

    fn check(&self, kind: &str, id: i64, slug: &str) -> Result<(), String> {
        match self.by_id.get(&id) {
            Some(stored) if stored != slug => {
                return Err(format!(
                    "{kind} {id} is published as {stored:?}; its slug cannot change to {slug:?}"
                ));
            }
            _ => {}
        }
        match self.by_slug.get(slug) {
            Some(&owner) if owner != id => {
                Err(format!("{kind} slug {slug:?} already belongs to {kind} {owner}"))
            }
            _ => Ok(()),
        }
    }
}

/// Reads every record, validating each with `validate`. Rows that fail to
/// deserialize are rejected with the deserialization error.
fn read_rows<R: Read, T: DeserializeOwned, U>(
    reader: R,
    mut validate: impl FnMut(T) -> Result<U, String>,
) -> Result<Parsed<U>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut parsed = Parsed::default();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, csv::Position::line);
        match record
            .deserialize::<T>(Some(&headers))
            .map_err(|e| e.to_string())
            .and_then(&mut validate)
        {
            Ok(item) => parsed.items.push(item),
            Err(reason) => parsed.rejected.push(Rejection { line, reason }),
        }
    }
    Ok(parsed)
}

/// Parses a stations CSV. Duplicate IDs or slugs after the first are
/// rejected, as are rows that conflict with `published`.
///
/// # Errors
///
/// Returns [`csv::Error`] if the input is not readable CSV.
pub fn parse_stations<R: Read>(
    reader: R,
    published: &PublishedSlugs,
) -> Result<Parsed<Station>, csv::Error> {
    let mut ids = BTreeSet::new();
    let mut slugs = BTreeSet::new();
    read_rows(reader, |row: StationRow| {
        let station = row.into_station()?;
        published.check("station", station.id, &station.slug)?;
        if !ids.insert(station.id) {
            return Err(format!("duplicate station id {}", station.id));
        }
        if !slugs.insert(station.slug.clone()) {
            return Err(format!("duplicate station slug {:?}", station.slug));
        }
        Ok(station)
    })
}

/// Parses an areas CSV. Duplicate IDs or slugs after the first are
/// rejected, as are rows that conflict with `published`.
///
/// # Errors
///
/// Returns [`csv::Error`] if the input is not readable CSV.
pub fn parse_areas<R: Read>(
    reader: R,
    published: &PublishedSlugs,
) -> Result<Parsed<Area>, csv::Error> {
    let mut ids = BTreeSet::new();
    let mut slugs = BTreeSet::new();
    read_rows(reader, |row: AreaRow| {
        let area = row.into_area()?;
        published.check("area", area.id, &area.slug)?;
        if !ids.insert(area.id) {
            return Err(format!("duplicate area id {}", area.id));
        }
        if !slugs.insert(area.slug.clone()) {
            return Err(format!("duplicate area slug {:?}", area.slug));
        }
        Ok(area)
    })
}

/// Parses area-level crime records. `areas` maps each known area to its
/// municipality; records for unknown areas or for areas in
/// municipality-only regions are rejected.
///
/// # Errors
///
/// Returns [`csv::Error`] if the input is not readable CSV.
pub fn parse_area_crimes<R: Read>(
    reader: R,
    areas: &BTreeMap<i64, Municipality>,
) -> Result<Parsed<CrimeRecord>, csv::Error> {
    let mut seen = BTreeSet::new();
    read_rows(reader, |row: AreaCrimeRow| {
        let municipality = areas.get(&row.area_id).copied();
        unique(&mut seen, row.into_record(municipality)?)
    })
}

/// Parses municipality-level crime records. Only municipalities that do
/// not publish area-level data may have them.
///
/// # Errors
///
/// Returns [`csv::Error`] if the input is not readable CSV.
pub fn parse_municipality_crimes<R: Read>(reader: R) -> Result<Parsed<CrimeRecord>, csv::Error> {
    let mut seen = BTreeSet::new();
    read_rows(reader, |row: MunicipalityCrimeRow| {
        unique(&mut seen, row.into_record()?)
    })
}

fn unique(
    seen: &mut BTreeSet<(RecordSubject, i32)>,
    record: CrimeRecord,
) -> Result<CrimeRecord, String> {
    if seen.insert((record.subject(), record.year())) {
        Ok(record)
    } else {
        Err(format!(
            "duplicate record for {:?} in {}",
            record.subject(),
            record.year()
        ))
    }
}

/// Ingests one CSV file into the store.
///
/// Area crime files are validated against the areas already stored, so
/// areas must be ingested first.
///
/// # Errors
///
/// Returns [`IngestError`] if the file is unreadable or a database write
/// fails.
pub fn ingest_file(
    conn: &Connection,
    dataset: Dataset,
    path: &Path,
) -> Result<IngestReport, IngestError> {
    let csv_err = |source| IngestError::Csv {
        path: path.display().to_string(),
        source,
    };
    let file = std::fs::File::open(path).map_err(|e| csv_err(csv::Error::from(e)))?;
    log::info!("Ingesting {dataset} from {}", path.display());

    let report = ingest_reader(conn, dataset, file).map_err(|e| match e {
        ReaderError::Csv(source) => csv_err(source),
        ReaderError::Database(e) => IngestError::Database(e),
    })?;

    for rejection in &report.rejected {
        log::error!(
            "{dataset} {} line {}: {}",
            path.display(),
            rejection.line,
            rejection.reason
        );
    }
    log::info!(
        "Ingested {dataset}: {} accepted, {} rejected",
        report.accepted,
        report.rejected.len()
    );
    Ok(report)
}

#[derive(Debug)]
enum ReaderError {
    Csv(csv::Error),
    Database(DbError),
}

impl From<csv::Error> for ReaderError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<DbError> for ReaderError {
    fn from(e: DbError) -> Self {
        Self::Database(e)
    }
}

fn ingest_reader<R: Read>(
    conn: &Connection,
    dataset: Dataset,
    reader: R,
) -> Result<IngestReport, ReaderError> {
    use safety_map_database::{crimes, units};

    let (accepted, rejected) = match dataset {
        Dataset::Stations => {
            let published =
                PublishedSlugs::new(units::load_stations(conn)?.into_iter().map(|s| (s.id, s.slug)));
            let parsed = parse_stations(reader, &published)?;
            (units::upsert_stations(conn, &parsed.items)?, parsed.rejected)
        }
        Dataset::Areas => {
            let published =
                PublishedSlugs::new(units::load_areas(conn)?.into_iter().map(|a| (a.id, a.slug)));
            let parsed = parse_areas(reader, &published)?;
            (units::upsert_areas(conn, &parsed.items)?, parsed.rejected)
        }
        Dataset::AreaCrimes => {
            let areas: BTreeMap<i64, Municipality> = units::load_areas(conn)?
                .into_iter()
                .map(|a| (a.id, a.municipality))
                .collect();
            let parsed = parse_area_crimes(reader, &areas)?;
            (crimes::upsert_crime_records(conn, &parsed.items)?, parsed.rejected)
        }
        Dataset::MunicipalityCrimes => {
            let parsed = parse_municipality_crimes(reader)?;
            (crimes::upsert_crime_records(conn, &parsed.items)?, parsed.rejected)
        }
    };

    Ok(IngestReport {
        dataset,
        accepted,
        rejected,
    })
}

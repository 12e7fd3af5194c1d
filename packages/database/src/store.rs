//! Opening the store and creating its schema.

use std::path::Path;

use duckdb::Connection;
use safety_map_geography_models::Municipality;

use crate::DbError;

/// Opens (or creates) the safety map `DuckDB` and ensures the schema and
/// municipality reference rows exist.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;

    init(&conn)?;

    Ok(conn)
}

/// Opens the store at [`crate::paths::db_path`].
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default() -> Result<Connection, DbError> {
    let path = crate::paths::db_path();
    log::debug!("Opening safety map store at {}", path.display());
    open(&path)
}

/// Opens a read-only connection to an existing store. Used by the server,
/// which never writes.
///
/// # Errors
///
/// Returns [`DbError`] if the file does not exist or cannot be opened.
pub fn open_read_only(path: &Path) -> Result<Connection, DbError> {
    let config = duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?;
    Ok(Connection::open_with_flags(path, config)?)
}

/// Opens a fresh in-memory store with the full schema.
///
/// # Errors
///
/// Returns [`DbError`] if schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

fn init(conn: &Connection) -> Result<(), DbError> {
    create_schema(conn)?;
    seed_municipalities(conn)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS municipalities (
            code INTEGER PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            publishes_area_data BOOLEAN NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stations (
            id BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            lat DOUBLE,
            lng DOUBLE,
            municipality_code INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS station_lines (
            station_id BIGINT NOT NULL,
            position INTEGER NOT NULL,
            line TEXT NOT NULL,
            PRIMARY KEY (station_id, line)
        );

        CREATE TABLE IF NOT EXISTS areas (
            id BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            lat DOUBLE,
            lng DOUBLE,
            municipality_code INTEGER NOT NULL,
            boundary_geojson TEXT
        );

        CREATE TABLE IF NOT EXISTS area_crimes (
            area_id BIGINT NOT NULL,
            year INTEGER NOT NULL,
            violent BIGINT NOT NULL,
            assault BIGINT NOT NULL,
            theft BIGINT NOT NULL,
            intellectual BIGINT NOT NULL,
            other BIGINT NOT NULL,
            PRIMARY KEY (area_id, year)
        );

        CREATE TABLE IF NOT EXISTS municipality_crimes (
            municipality_code INTEGER NOT NULL,
            year INTEGER NOT NULL,
            violent BIGINT NOT NULL,
            assault BIGINT NOT NULL,
            theft BIGINT NOT NULL,
            intellectual BIGINT NOT NULL,
            other BIGINT NOT NULL,
            PRIMARY KEY (municipality_code, year)
        );

        CREATE TABLE IF NOT EXISTS partial_years (
            year INTEGER PRIMARY KEY,
            cutoff_month SMALLINT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS safety_scores (
            unit_kind TEXT NOT NULL,
            unit_id BIGINT NOT NULL,
            year INTEGER NOT NULL,
            score DOUBLE,
            rank INTEGER,
            total_crimes BIGINT,
            violent BIGINT,
            assault BIGINT,
            theft BIGINT,
            intellectual BIGINT,
            other BIGINT,
            previous_year_total BIGINT,
            data_granularity TEXT NOT NULL,
            partial_cutoff_month SMALLINT
        );

        CREATE TABLE IF NOT EXISTS score_runs (
            unit_kind TEXT NOT NULL,
            year INTEGER NOT NULL,
            status TEXT NOT NULL,
            ranked BIGINT NOT NULL,
            units BIGINT NOT NULL,
            computed_at TIMESTAMP NOT NULL,
            PRIMARY KEY (unit_kind, year)
        );",
    )?;

    Ok(())
}

fn seed_municipalities(conn: &Connection) -> Result<(), DbError> {
    let mut stmt = conn.prepare(
        "INSERT INTO municipalities (code, slug, name, kind, publishes_area_data)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (code) DO UPDATE SET
            slug = EXCLUDED.slug,
            name = EXCLUDED.name,
            kind = EXCLUDED.kind,
            publishes_area_data = EXCLUDED.publishes_area_data",
    )?;

    for m in Municipality::all() {
        stmt.execute(duckdb::params![
            m.code(),
            m.slug(),
            m.name(),
            m.kind().to_string(),
            m.publishes_area_data(),
        ])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_has_reference_data() {
        let conn = open_in_memory().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM municipalities", [], |row| row.get(0))
            .unwrap();
        assert_eq!(usize::try_from(count).unwrap(), Municipality::all().len());

        let islands: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM municipalities WHERE NOT publishes_area_data",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(islands, 9);
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init(&conn).unwrap();
    }
}

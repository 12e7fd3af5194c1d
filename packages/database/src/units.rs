//! Station and area reference data.

use std::collections::BTreeMap;

use duckdb::{Connection, Row};
use safety_map_geography_models::{Area, LatLng, Municipality, Station};

use crate::DbError;

const STATION_COLUMNS: &str = "id, name, slug, lat, lng, municipality_code";
const AREA_COLUMNS: &str = "id, name, slug, lat, lng, municipality_code, boundary_geojson";

/// Inserts or replaces stations and their line memberships. A stored
/// station keeps its published slug.
///
/// Returns the number of stations written.
///
/// # Errors
///
/// Returns [`DbError`] if any database operation fails.
pub fn upsert_stations(conn: &Connection, stations: &[Station]) -> Result<u64, DbError> {
    if stations.is_empty() {
        return Ok(0);
    }

    let mut station_stmt = conn.prepare(
        "INSERT INTO stations (id, name, slug, lat, lng, municipality_code)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            lat = EXCLUDED.lat,
            lng = EXCLUDED.lng,
            municipality_code = EXCLUDED.municipality_code",
    )?;
    let mut clear_lines = conn.prepare("DELETE FROM station_lines WHERE station_id = ?")?;
    let mut line_stmt =
        conn.prepare("INSERT INTO station_lines (station_id, position, line) VALUES (?, ?, ?)")?;

    let mut total = 0u64;
    for station in stations {
        let rows = station_stmt.execute(duckdb::params![
            station.id,
            station.name,
            station.slug,
            station.location.map(|l| l.lat),
            station.location.map(|l| l.lng),
            station.municipality.code(),
        ])?;
        total += u64::try_from(rows).unwrap_or(0);

        clear_lines.execute([station.id])?;
        let mut seen = Vec::with_capacity(station.lines.len());
        for line in &station.lines {
            if seen.contains(&line) {
                continue;
            }
            let position = i32::try_from(seen.len())
                .map_err(|_| DbError::conversion("too many lines for one station"))?;
            line_stmt.execute(duckdb::params![station.id, position, line])?;
            seen.push(line);
        }
    }

    Ok(total)
}

/// Inserts or replaces areas. A stored area keeps its published slug.
///
/// Returns the number of areas written.
///
/// # Errors
///
/// Returns [`DbError`] if any database operation fails.
pub fn upsert_areas(conn: &Connection, areas: &[Area]) -> Result<u64, DbError> {
    if areas.is_empty() {
        return Ok(0);
    }

    let mut stmt = conn.prepare(
        "INSERT INTO areas (id, name, slug, lat, lng, municipality_code, boundary_geojson)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            lat = EXCLUDED.lat,
            lng = EXCLUDED.lng,
            municipality_code = EXCLUDED.municipality_code,
            boundary_geojson = EXCLUDED.boundary_geojson",
    )?;

    let mut total = 0u64;
    for area in areas {
        let rows = stmt.execute(duckdb::params![
            area.id,
            area.name,
            area.slug,
            area.location.map(|l| l.lat),
            area.location.map(|l| l.lng),
            area.municipality.code(),
            area.boundary_geojson.as_deref(),
        ])?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

/// Loads every station, ordered by ID.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row references an unknown
/// municipality.
pub fn load_stations(conn: &Connection) -> Result<Vec<Station>, DbError> {
    let lines = load_lines(conn)?;
    let mut stmt = conn.prepare(&format!("SELECT {STATION_COLUMNS} FROM stations ORDER BY id"))?;
    let mut rows = stmt.query([])?;

    let mut stations = Vec::new();
    while let Some(row) = rows.next()? {
        stations.push(station_from_row(row, &lines)?);
    }
    Ok(stations)
}

/// Loads every area, ordered by ID.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row references an unknown
/// municipality.
pub fn load_areas(conn: &Connection) -> Result<Vec<Area>, DbError> {
    let mut stmt = conn.prepare(&format!("SELECT {AREA_COLUMNS} FROM areas ORDER BY id"))?;
    let mut rows = stmt.query([])?;

    let mut areas = Vec::new();
    while let Some(row) = rows.next()? {
        areas.push(area_from_row(row)?);
    }
    Ok(areas)
}

/// Looks up a station by slug.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn station_by_slug(conn: &Connection, slug: &str) -> Result<Option<Station>, DbError> {
    let mut stmt = conn.prepare(&format!("SELECT {STATION_COLUMNS} FROM stations WHERE slug = ?"))?;
    let mut rows = stmt.query([slug])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let id: i64 = row.get(0)?;
    let lines = lines_for(conn, id)?;
    let mut by_station = BTreeMap::new();
    by_station.insert(id, lines);
    station_from_row(row, &by_station).map(Some)
}

/// Looks up an area by slug.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn area_by_slug(conn: &Connection, slug: &str) -> Result<Option<Area>, DbError> {
    let mut stmt = conn.prepare(&format!("SELECT {AREA_COLUMNS} FROM areas WHERE slug = ?"))?;
    let mut rows = stmt.query([slug])?;
    match rows.next()? {
        Some(row) => area_from_row(row).map(Some),
        None => Ok(None),
    }
}

fn load_lines(conn: &Connection) -> Result<BTreeMap<i64, Vec<String>>, DbError> {
    let mut stmt =
        conn.prepare("SELECT station_id, line FROM station_lines ORDER BY station_id, position")?;
    let mut rows = stmt.query([])?;

    let mut map: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let station_id: i64 = row.get(0)?;
        let line: String = row.get(1)?;
        map.entry(station_id).or_default().push(line);
    }
    Ok(map)
}

fn lines_for(conn: &Connection, station_id: i64) -> Result<Vec<String>, DbError> {
    let mut stmt =
        conn.prepare("SELECT line FROM station_lines WHERE station_id = ? ORDER BY position")?;
    let mut rows = stmt.query([station_id])?;
    let mut lines = Vec::new();
    while let Some(row) = rows.next()? {
        lines.push(row.get(0)?);
    }
    Ok(lines)
}

fn station_from_row(row: &Row<'_>, lines: &BTreeMap<i64, Vec<String>>) -> Result<Station, DbError> {
    let id: i64 = row.get(0)?;
    Ok(Station {
        id,
        name: row.get(1)?,
        slug: row.get(2)?,
        location: location(row.get(3)?, row.get(4)?),
        municipality: municipality(row.get(5)?)?,
        lines: lines.get(&id).cloned().unwrap_or_default(),
    })
}

fn area_from_row(row: &Row<'_>) -> Result<Area, DbError> {
    Ok(Area {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        location: location(row.get(3)?, row.get(4)?),
        municipality: municipality(row.get(5)?)?,
        boundary_geojson: row.get(6)?,
    })
}

const fn location(lat: Option<f64>, lng: Option<f64>) -> Option<LatLng> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
        _ => None,
    }
}

/// Resolves a stored municipality code.
pub(crate) fn municipality(code: i64) -> Result<Municipality, DbError> {
    u32::try_from(code)
        .ok()
        .and_then(Municipality::from_code)
        .ok_or_else(|| DbError::conversion(format!("unknown municipality code {code}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_in_memory;

    fn shinjuku() -> Station {
        Station {
            id: 1,
            name: "新宿".to_string(),
            slug: "shinjuku".to_string(),
            location: Some(LatLng::new(35.6896, 139.7006)),
            municipality: Municipality::Shinjuku,
            lines: vec!["JR山手線".to_string(), "都営新宿線".to_string()],
        }
    }

    #[test]
    fn stations_round_trip_with_lines_in_order() {
        let conn = open_in_memory().unwrap();
        let mut ikebukuro = shinjuku();
        ikebukuro.id = 2;
        ikebukuro.slug = "ikebukuro".to_string();
        ikebukuro.municipality = Municipality::Toshima;
        ikebukuro.location = None;
        ikebukuro.lines = vec!["東武東上線".to_string(), "JR山手線".to_string(), "東武東上線".to_string()];

        assert_eq!(upsert_stations(&conn, &[shinjuku(), ikebukuro]).unwrap(), 2);

        let stations = load_stations(&conn).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0], shinjuku());
        assert_eq!(stations[1].location, None);
        assert_eq!(stations[1].lines, vec!["東武東上線", "JR山手線"]);
    }

    #[test]
    fn upsert_replaces_lines() {
        let conn = open_in_memory().unwrap();
        upsert_stations(&conn, &[shinjuku()]).unwrap();
        let mut changed = shinjuku();
        changed.lines = vec!["京王線".to_string()];
        upsert_stations(&conn, &[changed]).unwrap();

        let found = station_by_slug(&conn, "shinjuku").unwrap().unwrap();
        assert_eq!(found.lines, vec!["京王線"]);
        assert!(station_by_slug(&conn, "nowhere").unwrap().is_none());
    }

    #[test]
    fn upsert_never_rewrites_a_published_slug() {
        let conn = open_in_memory().unwrap();
        upsert_stations(&conn, &[shinjuku()]).unwrap();
        let mut renamed = shinjuku();
        renamed.name = "新宿駅".to_string();
        renamed.slug = "shinjuku-station".to_string();
        upsert_stations(&conn, &[renamed]).unwrap();

        let found = station_by_slug(&conn, "shinjuku").unwrap().unwrap();
        assert_eq!(found.name, "新宿駅");
        assert!(station_by_slug(&conn, "shinjuku-station").unwrap().is_none());
    }

    #[test]
    fn areas_round_trip() {
        let conn = open_in_memory().unwrap();
        let area = Area {
            id: 10,
            name: "西新宿一丁目".to_string(),
            slug: "nishishinjuku-1".to_string(),
            location: Some(LatLng::new(35.69, 139.70)),
            municipality: Municipality::Shinjuku,
            boundary_geojson: Some(r#"{"type":"Point","coordinates":[139.7,35.69]}"#.to_string()),
        };
        upsert_areas(&conn, std::slice::from_ref(&area)).unwrap();
        assert_eq!(load_areas(&conn).unwrap(), vec![area.clone()]);
        assert_eq!(area_by_slug(&conn, "nishishinjuku-1").unwrap(), Some(area));
    }

    #[test]
    fn unknown_municipality_code_is_rejected() {
        assert!(municipality(99_999).is_err());
        assert_eq!(municipality(13_104).unwrap(), Municipality::Shinjuku);
    }
}

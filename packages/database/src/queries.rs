//! Read-model queries backing the API and the choropleth export.
//!
//! All queries are parameterised by year. Callers resolve "latest" with
//! [`crate::scores::latest_year`] before calling.

use std::collections::BTreeMap;

use duckdb::{Connection, Row};
use safety_map_database_models::{
    AreaScoreRow, LineSummary, MunicipalityYearStats, NamedScore, RankingEnd,
};
use safety_map_geography_models::{Area, LatLng, Municipality, UnitKind};
use safety_map_scoring_models::{PopulationKind, SafetyScore};

use crate::crimes::{counts_at, partial_year};
use crate::scores::{SCORE_COLUMNS, score_from_row};
use crate::units::municipality;
use crate::{DbError, to_i64, to_u64};

const fn unit_table(population: PopulationKind) -> &'static str {
    match population {
        PopulationKind::Station => "stations",
        PopulationKind::Area => "areas",
    }
}

/// Scored units from one end of the ranking, `limit` at most.
///
/// Units without a score are never included.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn ranked_units(
    conn: &Connection,
    population: PopulationKind,
    year: i32,
    end: RankingEnd,
    limit: u64,
) -> Result<Vec<NamedScore>, DbError> {
    let direction = match end {
        RankingEnd::Safest => "DESC",
        RankingEnd::LeastSafe => "ASC",
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.name, u.slug, u.municipality_code, {SCORE_COLUMNS}
         FROM safety_scores s
         JOIN {table} u ON u.id = s.unit_id
         WHERE s.unit_kind = ? AND s.year = ? AND s.score IS NOT NULL
         ORDER BY s.score {direction}, s.unit_id ASC
         LIMIT ?",
        table = unit_table(population),
    ))?;
    let mut rows = stmt.query(duckdb::params![
        population.unit_kind().to_string(),
        year,
        to_i64(limit, "limit")?,
    ])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(named_score_from_row(row)?);
    }
    Ok(out)
}

/// Every unit of `population` in a municipality with its score for `year`,
/// ordered by rank (unranked last) then name.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn units_in_municipality(
    conn: &Connection,
    population: PopulationKind,
    municipality: Municipality,
    year: i32,
) -> Result<Vec<NamedScore>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.name, u.slug, u.municipality_code, {SCORE_COLUMNS}
         FROM {table} u
         JOIN safety_scores s ON s.unit_id = u.id AND s.unit_kind = ? AND s.year = ?
         WHERE u.municipality_code = ?
         ORDER BY s.rank ASC NULLS LAST, u.name ASC",
        table = unit_table(population),
    ))?;
    let mut rows = stmt.query(duckdb::params![
        population.unit_kind().to_string(),
        year,
        municipality.code(),
    ])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(named_score_from_row(row)?);
    }
    Ok(out)
}

fn named_score_from_row(row: &Row<'_>) -> Result<NamedScore, DbError> {
    Ok(NamedScore {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        municipality: municipality(row.get(3)?)?,
        score: score_from_row(row, 4)?,
    })
}

/// Published scores for specific units in one year, keyed by unit ID.
/// Units without a row are absent.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn scores_for_units(
    conn: &Connection,
    kind: UnitKind,
    year: i32,
    ids: &[i64],
) -> Result<BTreeMap<i64, SafetyScore>, DbError> {
    let mut out = BTreeMap::new();
    if ids.is_empty() {
        return Ok(out);
    }

    for chunk in ids.chunks(1000) {
        let placeholders: String = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCORE_COLUMNS} FROM safety_scores s
             WHERE s.unit_kind = '{kind}' AND s.year = {year} AND s.unit_id IN ({placeholders})"
        ))?;

        let mut rows = stmt.query(duckdb::params_from_iter(chunk))?;
        while let Some(row) = rows.next()? {
            let score = score_from_row(row, 0)?;
            out.insert(score.unit.id, score);
        }
    }
    Ok(out)
}

/// Whole-municipality crime totals per year, newest first, each carrying
/// the year's partial marker.
///
/// Municipalities that publish area data are summed from their areas'
/// records; the rest read their municipality-level record.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn municipality_stats(
    conn: &Connection,
    municipality: Municipality,
) -> Result<Vec<MunicipalityYearStats>, DbError> {
    let totals = if municipality.publishes_area_data() {
        "SELECT c.year AS year,
                SUM(c.violent)::BIGINT, SUM(c.assault)::BIGINT, SUM(c.theft)::BIGINT,
                SUM(c.intellectual)::BIGINT, SUM(c.other)::BIGINT,
                COUNT(*)
         FROM area_crimes c
         JOIN areas a ON a.id = c.area_id
         WHERE a.municipality_code = ?
         GROUP BY c.year"
    } else {
        "SELECT year, violent, assault, theft, intellectual, other, 0
         FROM municipality_crimes
         WHERE municipality_code = ?"
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT t.*, p.cutoff_month
         FROM ({totals}) t
         LEFT JOIN partial_years p ON p.year = t.year
         ORDER BY t.year DESC"
    ))?;
    let mut rows = stmt.query([municipality.code()])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let year: i32 = row.get(0)?;
        let cutoff: Option<i16> = row.get(7)?;
        out.push(MunicipalityYearStats {
            year,
            counts: counts_at(row, 1)?,
            area_count: to_u64(row.get(6)?, "area_count")?,
            partial_year: cutoff.map(|m| partial_year(year, m)).transpose()?,
        });
    }
    Ok(out)
}

/// Station count and mean station score per line for `year`, ordered by
/// line name.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn line_summaries(conn: &Connection, year: i32) -> Result<Vec<LineSummary>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT l.line, COUNT(*), ROUND(AVG(s.score), 1)
         FROM station_lines l
         LEFT JOIN safety_scores s
            ON s.unit_kind = 'station' AND s.unit_id = l.station_id AND s.year = ?
         GROUP BY l.line
         ORDER BY l.line ASC",
    )?;
    let mut rows = stmt.query([year])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(LineSummary {
            line: row.get(0)?,
            station_count: to_u64(row.get(1)?, "station_count")?,
            average_score: row.get(2)?,
        });
    }
    Ok(out)
}

/// Number of stored areas.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn area_count(conn: &Connection) -> Result<u64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM areas", [], |row| row.get(0))?;
    to_u64(count, "area count")
}

/// One page of areas joined with their scores for `year`, ordered by area
/// ID so that consecutive pages never overlap.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn area_score_page(
    conn: &Connection,
    year: i32,
    offset: u64,
    limit: u64,
) -> Result<Vec<AreaScoreRow>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT a.id, a.name, a.slug, a.lat, a.lng, a.municipality_code, a.boundary_geojson,
                {SCORE_COLUMNS}
         FROM areas a
         LEFT JOIN safety_scores s
            ON s.unit_kind = 'area' AND s.unit_id = a.id AND s.year = ?
         ORDER BY a.id ASC
         LIMIT ? OFFSET ?"
    ))?;
    let mut rows = stmt.query(duckdb::params![
        year,
        to_i64(limit, "limit")?,
        to_i64(offset, "offset")?,
    ])?;

    let mut out = Vec::with_capacity(usize::try_from(limit).unwrap_or(0).min(10_000));
    while let Some(row) = rows.next()? {
        let area = Area {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            location: match (row.get::<_, Option<f64>>(3)?, row.get::<_, Option<f64>>(4)?) {
                (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
                _ => None,
            },
            municipality: municipality(row.get(5)?)?,
            boundary_geojson: row.get(6)?,
        };
        let has_score = row.get::<_, Option<String>>(7)?.is_some();
        let score = if has_score {
            Some(score_from_row(row, 7)?)
        } else {
            None
        };
        out.push(AreaScoreRow { area, score });
    }
    Ok(out)
}

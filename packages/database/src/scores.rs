//! Published safety scores.
//!
//! A population (one year of stations, or one year of areas) is always
//! replaced as a whole: the old rows are deleted, the new rows inserted,
//! and the audit row written inside one transaction. Readers see either
//! the previous population or the new one, never a mix.

use std::str::FromStr as _;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{Connection, Row};
use safety_map_crime_models::CategoryCounts;
use safety_map_database_models::ScoreRun;
use safety_map_geography_models::{UnitKind, UnitRef};
use safety_map_scoring_models::{
    Granularity, PopulationKind, SafetyScore, ScoreTarget, ScoredPopulation,
};

use crate::crimes::partial_year;
use crate::{DbError, to_i64, to_u64};

/// Columns read by [`score_from_row`], qualified with the `s` alias.
pub(crate) const SCORE_COLUMNS: &str = "s.unit_kind, s.unit_id, s.year, s.score, s.rank, \
     s.total_crimes, s.violent, s.assault, s.theft, s.intellectual, s.other, \
     s.previous_year_total, s.data_granularity, s.partial_cutoff_month";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Atomically replaces the stored rows for `population.target`.
///
/// Returns the number of score rows written.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails, in which case the
/// transaction is rolled back and the previous population stays visible.
pub fn publish_population(
    conn: &mut Connection,
    population: &ScoredPopulation,
    computed_at: DateTime<Utc>,
) -> Result<u64, DbError> {
    let target = population.target;
    let kind = target.population.unit_kind().to_string();
    let tx = conn.transaction()?;

    let written = {
        tx.execute(
            "DELETE FROM safety_scores WHERE unit_kind = ? AND year = ?",
            duckdb::params![kind, target.year],
        )?;

        let mut stmt = tx.prepare(
            "INSERT INTO safety_scores (
                unit_kind, unit_id, year, score, rank, total_crimes,
                violent, assault, theft, intellectual, other,
                previous_year_total, data_granularity, partial_cutoff_month
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;

        let mut written = 0u64;
        for score in &population.scores {
            if score.unit.kind != target.population.unit_kind() || score.year != target.year {
                return Err(DbError::conversion(format!(
                    "score for {:?} {} does not belong to population {target}",
                    score.unit, score.year
                )));
            }
            let [violent, assault, theft, intellectual, other] = count_columns(score.counts)?;

            let rows = stmt.execute(duckdb::params![
                kind,
                score.unit.id,
                score.year,
                score.score,
                score.rank,
                score.total_crimes.map(|t| to_i64(t, "total_crimes")).transpose()?,
                violent,
                assault,
                theft,
                intellectual,
                other,
                score
                    .previous_year_total
                    .map(|t| to_i64(t, "previous_year_total"))
                    .transpose()?,
                score.data_granularity.to_string(),
                score.partial_year.map(|p| i16::from(p.cutoff_month())),
            ])?;
            written += u64::try_from(rows).unwrap_or(0);
        }

        tx.execute(
            "INSERT INTO score_runs (unit_kind, year, status, ranked, units, computed_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (unit_kind, year) DO UPDATE SET
                status = EXCLUDED.status,
                ranked = EXCLUDED.ranked,
                units = EXCLUDED.units,
                computed_at = EXCLUDED.computed_at",
            duckdb::params![
                kind,
                target.year,
                population.status.label(),
                to_i64(population.status.ranked_size() as u64, "ranked")?,
                to_i64(population.scores.len() as u64, "units")?,
                computed_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;

        written
    };

    tx.commit()?;
    log::info!("Published {written} scores for {target}");
    Ok(written)
}

/// Category columns for an insert; all `NULL` when the unit has no figure.
fn count_columns(counts: Option<CategoryCounts>) -> Result<[Option<i64>; 5], DbError> {
    let Some(c) = counts else {
        return Ok([None; 5]);
    };
    Ok([
        Some(to_i64(c.violent, "violent")?),
        Some(to_i64(c.assault, "assault")?),
        Some(to_i64(c.theft, "theft")?),
        Some(to_i64(c.intellectual, "intellectual")?),
        Some(to_i64(c.other, "other")?),
    ])
}

/// Loads a published population, ordered by rank (unranked last), then
/// total, then unit ID.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn load_population(conn: &Connection, target: ScoreTarget) -> Result<Vec<SafetyScore>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCORE_COLUMNS} FROM safety_scores s
         WHERE s.unit_kind = ? AND s.year = ?
         ORDER BY s.rank ASC NULLS LAST, s.total_crimes ASC NULLS LAST, s.unit_id ASC"
    ))?;
    let mut rows = stmt.query(duckdb::params![
        target.population.unit_kind().to_string(),
        target.year
    ])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(score_from_row(row, 0)?);
    }
    Ok(out)
}

/// Every published year for one unit, newest first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn unit_series(conn: &Connection, unit: UnitRef) -> Result<Vec<SafetyScore>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCORE_COLUMNS} FROM safety_scores s
         WHERE s.unit_kind = ? AND s.unit_id = ?
         ORDER BY s.year DESC"
    ))?;
    let mut rows = stmt.query(duckdb::params![unit.kind.to_string(), unit.id])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(score_from_row(row, 0)?);
    }
    Ok(out)
}

/// The most recent year with a published population of this kind.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn latest_year(conn: &Connection, population: PopulationKind) -> Result<Option<i32>, DbError> {
    let year: Option<i32> = conn.query_row(
        "SELECT MAX(year) FROM score_runs WHERE unit_kind = ?",
        [population.unit_kind().to_string()],
        |row| row.get(0),
    )?;
    Ok(year)
}

/// All publish audit rows, newest year first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be decoded.
pub fn load_score_runs(conn: &Connection) -> Result<Vec<ScoreRun>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT unit_kind, year, status, ranked, units, computed_at::TEXT
         FROM score_runs ORDER BY year DESC, unit_kind",
    )?;
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let kind: String = row.get(0)?;
        let population = match parse_enum::<UnitKind>(&kind, "unit_kind")? {
            UnitKind::Station => PopulationKind::Station,
            UnitKind::Area => PopulationKind::Area,
        };
        let computed_at: String = row.get(5)?;
        out.push(ScoreRun {
            target: ScoreTarget::new(row.get(1)?, population),
            status: row.get(2)?,
            ranked: to_u64(row.get(3)?, "ranked")?,
            units: to_u64(row.get(4)?, "units")?,
            computed_at: parse_timestamp(&computed_at)?,
        });
    }
    Ok(out)
}

/// Decodes [`SCORE_COLUMNS`] starting at column `first`.
pub(crate) fn score_from_row(row: &Row<'_>, first: usize) -> Result<SafetyScore, DbError> {
    let col = |i: usize| first + i;

    let kind: String = row.get(col(0))?;
    let unit = UnitRef {
        kind: parse_enum(&kind, "unit_kind")?,
        id: row.get(col(1))?,
    };
    let year: i32 = row.get(col(2))?;

    let mut categories = [0u64; 5];
    let mut has_counts = true;
    for (i, slot) in categories.iter_mut().enumerate() {
        match row.get::<_, Option<i64>>(col(6 + i))? {
            Some(v) => *slot = to_u64(v, "category count")?,
            None => has_counts = false,
        }
    }
    let [violent, assault, theft, intellectual, other] = categories;
    let counts = has_counts.then_some(CategoryCounts {
        violent,
        assault,
        theft,
        intellectual,
        other,
    });

    let granularity: String = row.get(col(12))?;

    Ok(SafetyScore {
        unit,
        year,
        score: row.get(col(3))?,
        rank: row
            .get::<_, Option<i64>>(col(4))?
            .map(|r| u32::try_from(r).map_err(|_| DbError::conversion(format!("bad rank {r}"))))
            .transpose()?,
        total_crimes: row
            .get::<_, Option<i64>>(col(5))?
            .map(|t| to_u64(t, "total_crimes"))
            .transpose()?,
        counts,
        previous_year_total: row
            .get::<_, Option<i64>>(col(11))?
            .map(|t| to_u64(t, "previous_year_total"))
            .transpose()?,
        data_granularity: parse_enum::<Granularity>(&granularity, "data_granularity")?,
        partial_year: row
            .get::<_, Option<i16>>(col(13))?
            .map(|m| partial_year(year, m))
            .transpose()?,
    })
}

fn parse_enum<T: std::str::FromStr>(value: &str, column: &str) -> Result<T, DbError> {
    T::from_str(value).map_err(|_| DbError::conversion(format!("invalid {column}: {value:?}")))
}

/// Parses `DuckDB`'s `TIMESTAMP::TEXT` form, with or without fractional
/// seconds.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DbError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .map_err(|e| DbError::conversion(format!("invalid timestamp {s:?}: {e}")))
}

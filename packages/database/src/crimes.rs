//! Validated crime records and partial-year markers.
//!
//! Area-level and municipality-level records live in separate tables so
//! that a subject can only ever be one or the other.

use duckdb::{Connection, Row};
use safety_map_crime_models::{CategoryCounts, CrimeRecord, PartialYear, RecordSubject};

use crate::units::municipality;
use crate::{DbError, to_i64, to_u64};

/// Inserts or replaces crime records. A record for an existing
/// `(subject, year)` overwrites it.
///
/// Returns the number of records written.
///
/// # Errors
///
/// Returns [`DbError`] if any database operation fails.
pub fn upsert_crime_records(conn: &Connection, records: &[CrimeRecord]) -> Result<u64, DbError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut area_stmt = conn.prepare(
        "INSERT INTO area_crimes (area_id, year, violent, assault, theft, intellectual, other)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (area_id, year) DO UPDATE SET
            violent = EXCLUDED.violent,
            assault = EXCLUDED.assault,
            theft = EXCLUDED.theft,
            intellectual = EXCLUDED.intellectual,
            other = EXCLUDED.other",
    )?;
    let mut municipality_stmt = conn.prepare(
        "INSERT INTO municipality_crimes
            (municipality_code, year, violent, assault, theft, intellectual, other)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (municipality_code, year) DO UPDATE SET
            violent = EXCLUDED.violent,
            assault = EXCLUDED.assault,
            theft = EXCLUDED.theft,
            intellectual = EXCLUDED.intellectual,
            other = EXCLUDED.other",
    )?;

    let mut total = 0u64;
    for record in records {
        let c = record.counts();
        let counts = [
            to_i64(c.violent, "violent")?,
            to_i64(c.assault, "assault")?,
            to_i64(c.theft, "theft")?,
            to_i64(c.intellectual, "intellectual")?,
            to_i64(c.other, "other")?,
        ];
        let rows = match record.subject() {
            RecordSubject::Area(id) => area_stmt.execute(duckdb::params![
                id,
                record.year(),
                counts[0],
                counts[1],
                counts[2],
                counts[3],
                counts[4],
            ])?,
            RecordSubject::Municipality(m) => municipality_stmt.execute(duckdb::params![
                m.code(),
                record.year(),
                counts[0],
                counts[1],
                counts[2],
                counts[3],
                counts[4],
            ])?,
        };
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

/// Loads every crime record, area records first, each ordered by subject
/// then year.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored count is negative.
pub fn load_crime_records(conn: &Connection) -> Result<Vec<CrimeRecord>, DbError> {
    let mut records = Vec::new();

    let mut stmt = conn.prepare(
        "SELECT area_id, year, violent, assault, theft, intellectual, other
         FROM area_crimes ORDER BY area_id, year",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let subject = RecordSubject::Area(row.get(0)?);
        records.push(CrimeRecord::from_counts(subject, row.get(1)?, counts_at(row, 2)?));
    }

    let mut stmt = conn.prepare(
        "SELECT municipality_code, year, violent, assault, theft, intellectual, other
         FROM municipality_crimes ORDER BY municipality_code, year",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let subject = RecordSubject::Municipality(municipality(row.get(0)?)?);
        records.push(CrimeRecord::from_counts(subject, row.get(1)?, counts_at(row, 2)?));
    }

    log::debug!("Loaded {} crime records", records.len());
    Ok(records)
}

/// Reads five category columns starting at `first`.
pub(crate) fn counts_at(row: &Row<'_>, first: usize) -> Result<CategoryCounts, DbError> {
    Ok(CategoryCounts {
        violent: to_u64(row.get(first)?, "violent")?,
        assault: to_u64(row.get(first + 1)?, "assault")?,
        theft: to_u64(row.get(first + 2)?, "theft")?,
        intellectual: to_u64(row.get(first + 3)?, "intellectual")?,
        other: to_u64(row.get(first + 4)?, "other")?,
    })
}

/// Marks a year as incomplete, replacing any existing marker.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_partial_year(conn: &Connection, partial: PartialYear) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO partial_years (year, cutoff_month) VALUES (?, ?)
         ON CONFLICT (year) DO UPDATE SET cutoff_month = EXCLUDED.cutoff_month",
        duckdb::params![partial.year(), i16::from(partial.cutoff_month())],
    )?;
    Ok(())
}

/// Removes a year's partial marker once its figures are final.
///
/// # Errors
///
/// Returns [`DbError`] if the delete fails.
pub fn clear_partial_year(conn: &Connection, year: i32) -> Result<(), DbError> {
    conn.execute("DELETE FROM partial_years WHERE year = ?", [year])?;
    Ok(())
}

/// Loads all partial-year markers, ordered by year.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored month is invalid.
pub fn load_partial_years(conn: &Connection) -> Result<Vec<PartialYear>, DbError> {
    let mut stmt = conn.prepare("SELECT year, cutoff_month FROM partial_years ORDER BY year")?;
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(partial_year(row.get(0)?, row.get(1)?)?);
    }
    Ok(out)
}

/// Rebuilds a [`PartialYear`] from stored columns.
pub(crate) fn partial_year(year: i32, cutoff_month: i16) -> Result<PartialYear, DbError> {
    u8::try_from(cutoff_month)
        .ok()
        .and_then(|m| PartialYear::new(year, m).ok())
        .ok_or_else(|| DbError::conversion(format!("invalid cutoff month {cutoff_month} for {year}")))
}

/// Distinct years with any crime record, ascending.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn record_years(conn: &Connection) -> Result<Vec<i32>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT year FROM area_crimes
         UNION
         SELECT year FROM municipality_crimes
         ORDER BY year",
    )?;
    let mut rows = stmt.query([])?;
    let mut years = Vec::new();
    while let Some(row) = rows.next()? {
        years.push(row.get(0)?);
    }
    Ok(years)
}

#[cfg(test)]
mod tests {
    use safety_map_geography_models::Municipality;

    use super::*;
    use crate::open_in_memory;

    fn counts(theft: u64) -> CategoryCounts {
        CategoryCounts {
            theft,
            violent: 1,
            ..CategoryCounts::default()
        }
    }

    #[test]
    fn records_round_trip_by_subject() {
        let conn = open_in_memory().unwrap();
        let records = vec![
            CrimeRecord::from_counts(RecordSubject::Area(2), 2024, counts(10)),
            CrimeRecord::from_counts(RecordSubject::Area(1), 2023, counts(7)),
            CrimeRecord::from_counts(
                RecordSubject::Municipality(Municipality::Hachijo),
                2024,
                counts(3),
            ),
        ];
        assert_eq!(upsert_crime_records(&conn, &records).unwrap(), 3);

        let loaded = load_crime_records(&conn).unwrap();
        assert_eq!(loaded, vec![records[1], records[0], records[2]]);
        assert_eq!(record_years(&conn).unwrap(), vec![2023, 2024]);
    }

    #[test]
    fn reingest_overwrites_same_year() {
        let conn = open_in_memory().unwrap();
        let first = CrimeRecord::from_counts(RecordSubject::Area(1), 2024, counts(10));
        let second = CrimeRecord::from_counts(RecordSubject::Area(1), 2024, counts(12));
        upsert_crime_records(&conn, &[first]).unwrap();
        upsert_crime_records(&conn, &[second]).unwrap();
        assert_eq!(load_crime_records(&conn).unwrap(), vec![second]);
    }

    #[test]
    fn partial_year_markers() {
        let conn = open_in_memory().unwrap();
        set_partial_year(&conn, PartialYear::new(2025, 6).unwrap()).unwrap();
        set_partial_year(&conn, PartialYear::new(2025, 9).unwrap()).unwrap();
        assert_eq!(
            load_partial_years(&conn).unwrap(),
            vec![PartialYear::new(2025, 9).unwrap()]
        );
        clear_partial_year(&conn, 2025).unwrap();
        assert!(load_partial_years(&conn).unwrap().is_empty());
    }
}

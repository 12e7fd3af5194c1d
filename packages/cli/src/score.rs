//! Batch recompute against the store.
//!
//! Loads units and records once, builds the geo index, computes every
//! requested population concurrently, then publishes each population in its
//! own transaction. A failed run leaves every population it did not reach
//! exactly as it was, so rerunning from scratch is always safe.

use chrono::Utc;
use duckdb::Connection;
use safety_map_database::DbError;
use safety_map_database::crimes::{load_crime_records, load_partial_years};
use safety_map_database::scores::publish_population;
use safety_map_database::units::{load_areas, load_stations};
use safety_map_scoring::progress::ProgressCallback;
use safety_map_scoring::{ScoringConfig, ScoringInputs, recompute};
use safety_map_scoring_models::{PopulationKind, ScoreTarget, ScoredPopulation};
use safety_map_spatial::GeoIndex;

/// Reads everything a recompute needs from the store.
///
/// # Errors
///
/// Returns [`DbError`] if any table cannot be read.
pub fn load_inputs(conn: &Connection) -> Result<ScoringInputs, DbError> {
    Ok(ScoringInputs {
        stations: load_stations(conn)?,
        areas: load_areas(conn)?,
        records: load_crime_records(conn)?,
        partial_years: load_partial_years(conn)?,
    })
}

/// Expands the requested years and populations into targets. An empty
/// list means "all": every year with records, or both populations.
#[must_use]
pub fn targets(
    inputs: &ScoringInputs,
    years: &[i32],
    populations: &[PopulationKind],
) -> Vec<ScoreTarget> {
    let years = if years.is_empty() {
        inputs.years()
    } else {
        years.to_vec()
    };
    let populations = if populations.is_empty() {
        PopulationKind::all()
    } else {
        populations
    };

    years
        .iter()
        .flat_map(|&year| {
            populations
                .iter()
                .map(move |&population| ScoreTarget::new(year, population))
        })
        .collect()
}

/// Recomputes and publishes the requested populations.
///
/// # Errors
///
/// Returns an error if loading, scoring, or publishing fails. Populations
/// published before the failure stay published.
pub async fn run(
    conn: &mut Connection,
    config: &ScoringConfig,
    years: &[i32],
    populations: &[PopulationKind],
    progress: &dyn ProgressCallback,
) -> Result<Vec<ScoredPopulation>, Box<dyn std::error::Error>> {
    let inputs = load_inputs(conn)?;
    let targets = targets(&inputs, years, populations);
    if targets.is_empty() {
        log::warn!("No crime records found, nothing to score");
        return Ok(Vec::new());
    }

    log::info!(
        "Scoring {} populations from {} records ({} stations, {} areas)",
        targets.len(),
        inputs.records.len(),
        inputs.stations.len(),
        inputs.areas.len()
    );

    let index = GeoIndex::build(&inputs.stations, &inputs.areas);
    let populations = recompute(&inputs, &index, config, &targets, progress).await?;

    let computed_at = Utc::now();
    for population in &populations {
        let written = publish_population(conn, population, computed_at)?;
        log::info!(
            "Published {}: {} ({} rows, {} ranked)",
            population.target,
            population.status.label(),
            written,
            population.status.ranked_size()
        );
    }

    Ok(populations)
}

#[cfg(test)]
mod tests {
    use safety_map_crime_models::{CategoryCounts, CrimeRecord, PartialYear, RecordSubject};
    use safety_map_database::crimes::{set_partial_year, upsert_crime_records};
    use safety_map_database::open_in_memory;
    use safety_map_database::scores::{latest_year, load_population, load_score_runs};
    use safety_map_database::units::{upsert_areas, upsert_stations};
    use safety_map_geography_models::{Area, LatLng, Municipality, Station};
    use safety_map_scoring::progress::null_progress;
    use safety_map_scoring_models::Granularity;

    use super::*;

    const MARUNOUCHI: LatLng = LatLng::new(35.6812, 139.7671);

    fn area(id: i64, lat_offset: f64) -> Area {
        Area {
            id,
            name: format!("千代田区丸の内{id}丁目"),
            slug: format!("marunouchi-{id}"),
            location: Some(LatLng::new(MARUNOUCHI.lat + lat_offset, MARUNOUCHI.lng)),
            municipality: Municipality::Chiyoda,
            boundary_geojson: None,
        }
    }

    fn record(area_id: i64, year: i32, total: u64) -> CrimeRecord {
        CrimeRecord::from_counts(
            RecordSubject::Area(area_id),
            year,
            CategoryCounts {
                theft: total,
                ..CategoryCounts::default()
            },
        )
    }

    fn seeded() -> Connection {
        let conn = open_in_memory().unwrap();
        upsert_areas(&conn, &[area(1, 0.0), area(2, 0.002), area(3, 0.2)]).unwrap();
        upsert_stations(
            &conn,
            &[
                Station {
                    id: 100,
                    name: "東京".to_string(),
                    slug: "tokyo".to_string(),
                    location: Some(MARUNOUCHI),
                    municipality: Municipality::Chiyoda,
                    lines: vec!["JR山手線".to_string()],
                },
                Station {
                    id: 101,
                    name: "遠方".to_string(),
                    slug: "far".to_string(),
                    location: Some(LatLng::new(MARUNOUCHI.lat + 0.2, MARUNOUCHI.lng)),
                    municipality: Municipality::Chiyoda,
                    lines: Vec::new(),
                },
            ],
        )
        .unwrap();
        upsert_crime_records(
            &conn,
            &[
                record(1, 2023, 4),
                record(2, 2023, 8),
                record(3, 2023, 12),
                record(1, 2024, 0),
                record(2, 2024, 10),
                record(3, 2024, 20),
            ],
        )
        .unwrap();
        conn
    }

    #[tokio::test]
    async fn scores_and_publishes_every_population() {
        let mut conn = seeded();
        let published = run(
            &mut conn,
            &ScoringConfig::default(),
            &[],
            &[],
            null_progress().as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(published.len(), 4);
        assert_eq!(load_score_runs(&conn).unwrap().len(), 4);
        assert_eq!(latest_year(&conn, PopulationKind::Area).unwrap(), Some(2024));

        let areas = load_population(&conn, ScoreTarget::new(2024, PopulationKind::Area)).unwrap();
        let ranks: Vec<Option<u32>> = areas.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(areas[0].unit.id, 1);
        assert_eq!(areas[0].previous_year_total, Some(4));
        let scores: Vec<f64> = areas.iter().filter_map(|s| s.score).collect();
        assert!((scores[0] - 62.247_448_713_915_89).abs() < 1e-9);
        assert!((scores[1] - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stations_aggregate_their_catchment() {
        let mut conn = seeded();
        run(
            &mut conn,
            &ScoringConfig::default(),
            &[2024],
            &[PopulationKind::Station],
            null_progress().as_ref(),
        )
        .await
        .unwrap();

        let stations =
            load_population(&conn, ScoreTarget::new(2024, PopulationKind::Station)).unwrap();
        let tokyo = stations.iter().find(|s| s.unit.id == 100).unwrap();
        assert_eq!(tokyo.total_crimes, Some(10));
        assert_eq!(tokyo.data_granularity, Granularity::Area);
        assert!(
            load_population(&conn, ScoreTarget::new(2024, PopulationKind::Area))
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn rerun_is_identical() {
        let mut conn = seeded();
        let config = ScoringConfig::default();
        let first = run(&mut conn, &config, &[], &[], null_progress().as_ref())
            .await
            .unwrap();
        let second = run(&mut conn, &config, &[], &[], null_progress().as_ref())
            .await
            .unwrap();
        assert_eq!(first, second);

        let stored = load_population(&conn, ScoreTarget::new(2023, PopulationKind::Area)).unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn partial_year_is_carried_to_scores() {
        let mut conn = seeded();
        set_partial_year(&conn, PartialYear::new(2024, 9).unwrap()).unwrap();
        let published = run(
            &mut conn,
            &ScoringConfig::default(),
            &[2024],
            &[PopulationKind::Area],
            null_progress().as_ref(),
        )
        .await
        .unwrap();
        assert!(published[0]
            .scores
            .iter()
            .all(|s| s.partial_year.map(|p| p.cutoff_month()) == Some(9)));
    }

    #[tokio::test]
    async fn empty_store_scores_nothing() {
        let mut conn = open_in_memory().unwrap();
        let published = run(
            &mut conn,
            &ScoringConfig::default(),
            &[],
            &[],
            null_progress().as_ref(),
        )
        .await
        .unwrap();
        assert!(published.is_empty());
    }

    #[test]
    fn explicit_targets_cross_years_and_populations() {
        let inputs = ScoringInputs::default();
        let targets = targets(&inputs, &[2022, 2023], &[PopulationKind::Area]);
        assert_eq!(
            targets,
            vec![
                ScoreTarget::new(2022, PopulationKind::Area),
                ScoreTarget::new(2023, PopulationKind::Area),
            ]
        );
    }
}

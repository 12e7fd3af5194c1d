//! Batch recompute: aggregate, score, rank, and link trends for a set of
//! targets.
//!
//! Each [`ScoredPopulation`] is built completely in memory so it can be
//! published as a whole. Targets are computed concurrently and returned in
//! the order requested.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;
use safety_map_crime_models::{CrimeRecord, PartialYear};
use safety_map_geography_models::{Area, Station, UnitRef};
use safety_map_scoring_models::{
    PopulationKind, PopulationStatus, SafetyScore, ScoreTarget, ScoredPopulation, UnitFigure,
};
use safety_map_spatial::ProximitySource;

use crate::aggregate::{Aggregator, YearRecords};
use crate::config::ScoringConfig;
use crate::deviation::deviation_scores;
use crate::progress::ProgressCallback;
use crate::rank::dense_ranks;
use crate::trend::{YearTotal, resolve};
use crate::ScoringError;

/// Everything a recompute reads.
#[derive(Debug, Clone, Default)]
pub struct ScoringInputs {
    /// All stations.
    pub stations: Vec<Station>,
    /// All areas.
    pub areas: Vec<Area>,
    /// Validated crime records for every year.
    pub records: Vec<CrimeRecord>,
    /// Years whose figures are incomplete.
    pub partial_years: Vec<PartialYear>,
}

impl ScoringInputs {
    /// Distinct years with at least one record, ascending.
    #[must_use]
    pub fn years(&self) -> Vec<i32> {
        self.records
            .iter()
            .map(CrimeRecord::year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Partial-year marker for `year`, if any.
    #[must_use]
    pub fn partial_year(&self, year: i32) -> Option<PartialYear> {
        self.partial_years.iter().copied().find(|p| p.year() == year)
    }

    /// Every population for every year with data.
    #[must_use]
    pub fn all_targets(&self) -> Vec<ScoreTarget> {
        self.years()
            .into_iter()
            .flat_map(|year| {
                PopulationKind::all()
                    .iter()
                    .map(move |&population| ScoreTarget::new(year, population))
            })
            .collect()
    }
}

/// Scores and ranks a population from its unit figures.
///
/// `previous_year_total` is left empty; [`compute_population`] fills it.
#[must_use]
pub fn score_population(
    target: ScoreTarget,
    figures: &[UnitFigure],
    partial_year: Option<PartialYear>,
) -> ScoredPopulation {
    let totals: Vec<Option<u64>> = figures.iter().map(UnitFigure::total).collect();

    let (status, scores) = match deviation_scores(&totals) {
        Ok(result) if result.degenerate => (
            PopulationStatus::Degenerate { size: result.size },
            result.scores,
        ),
        Ok(result) => (PopulationStatus::Scored { size: result.size }, result.scores),
        Err(insufficient) => (
            PopulationStatus::Insufficient {
                reporting: insufficient.reporting,
            },
            vec![None; figures.len()],
        ),
    };
    let ranks = dense_ranks(&scores);

    let mut out: Vec<SafetyScore> = figures
        .iter()
        .zip(scores.into_iter().zip(ranks))
        .map(|(figure, (score, rank))| SafetyScore {
            unit: figure.unit,
            year: target.year,
            score,
            rank,
            total_crimes: figure.total(),
            counts: figure.counts,
            previous_year_total: None,
            data_granularity: figure.granularity,
            partial_year,
        })
        .collect();

    out.sort_by(|a, b| {
        (a.rank.is_none(), a.rank, a.total_crimes.is_none(), a.total_crimes, a.unit).cmp(&(
            b.rank.is_none(),
            b.rank,
            b.total_crimes.is_none(),
            b.total_crimes,
            b.unit,
        ))
    });

    ScoredPopulation {
        target,
        status,
        scores: out,
    }
}

/// Computes one population, including each unit's previous-year total.
///
/// # Errors
///
/// Returns [`ScoringError::Spatial`] if a catchment query fails.
pub async fn compute_population(
    inputs: &ScoringInputs,
    proximity: &dyn ProximitySource,
    config: &ScoringConfig,
    target: ScoreTarget,
) -> Result<ScoredPopulation, ScoringError> {
    let aggregator = Aggregator::new(&inputs.stations, &inputs.areas, proximity, config);

    let current = YearRecords::for_year(target.year, &inputs.records);
    let figures = aggregator.figures(target.population, &current).await?;
    let partial_year = inputs.partial_year(target.year);
    let mut population = score_population(target, &figures, partial_year);

    let previous = YearRecords::for_year(target.year - 1, &inputs.records);
    if !previous.is_empty() {
        let previous_totals: BTreeMap<UnitRef, Option<u64>> = aggregator
            .figures(target.population, &previous)
            .await?
            .iter()
            .map(|f| (f.unit, f.total()))
            .collect();

        for score in &mut population.scores {
            let series = [
                YearTotal::from(&*score),
                YearTotal {
                    year: previous.year(),
                    total: previous_totals.get(&score.unit).copied().flatten(),
                    partial_year: inputs.partial_year(previous.year()),
                },
            ];
            score.previous_year_total = resolve(&series)
                .first()
                .and_then(|p| p.previous_year_total);
        }
    }

    match population.status {
        PopulationStatus::Insufficient { reporting } => log::warn!(
            "Population {target} has {reporting} reporting unit(s), publishing without scores"
        ),
        status => log::info!(
            "Scored {target}: {} ({} of {} units ranked)",
            status.label(),
            status.ranked_size(),
            population.scores.len()
        ),
    }

    Ok(population)
}

/// Computes every target concurrently, returning them in request order.
/// Progress advances by one per finished target.
///
/// # Errors
///
/// Returns the first [`ScoringError`] from any target. Nothing is
/// returned for the others, so a failed batch never publishes partially.
pub async fn recompute(
    inputs: &ScoringInputs,
    proximity: &dyn ProximitySource,
    config: &ScoringConfig,
    targets: &[ScoreTarget],
    progress: &dyn ProgressCallback,
) -> Result<Vec<ScoredPopulation>, ScoringError> {
    progress.set_total(targets.len() as u64);
    progress.set_message(format!("Scoring {} populations", targets.len()));

    let populations = try_join_all(targets.iter().map(|&target| async move {
        let population = compute_population(inputs, proximity, config, target).await?;
        progress.inc(1);
        Ok::<_, ScoringError>(population)
    }))
    .await?;

    progress.finish(format!("Scored {} populations", populations.len()));
    Ok(populations)
}

#[cfg(test)]
mod tests {
    use safety_map_crime_models::{CategoryCounts, RecordSubject};
    use safety_map_geography_models::{LatLng, Municipality};
    use safety_map_scoring_models::Granularity;
    use safety_map_spatial::GeoIndex;

    use super::*;
    use crate::progress::null_progress;

    fn theft(n: u64) -> CategoryCounts {
        CategoryCounts {
            theft: n,
            ..CategoryCounts::default()
        }
    }

    fn area(id: i64, municipality: Municipality) -> Area {
        Area {
            id,
            name: format!("area-{id}"),
            slug: format!("area-{id}"),
            location: Some(LatLng::new(35.69, 139.70)),
            municipality,
            boundary_geojson: None,
        }
    }

    fn area_record(id: i64, year: i32, total: u64) -> CrimeRecord {
        CrimeRecord::from_counts(RecordSubject::Area(id), year, theft(total))
    }

    fn inputs() -> ScoringInputs {
        ScoringInputs {
            stations: Vec::new(),
            areas: vec![
                area(1, Municipality::Shinjuku),
                area(2, Municipality::Shinjuku),
                area(3, Municipality::Shinjuku),
                area(4, Municipality::Shinjuku),
            ],
            records: vec![
                area_record(1, 2024, 0),
                area_record(2, 2024, 10),
                area_record(3, 2024, 20),
                area_record(1, 2023, 4),
                area_record(2, 2023, 10),
            ],
            partial_years: vec![PartialYear::new(2024, 9).unwrap()],
        }
    }

    #[test]
    fn targets_cover_every_year_and_population() {
        let targets = inputs().all_targets();
        assert_eq!(targets.len(), 4);
        assert_eq!(targets[0], ScoreTarget::new(2023, PopulationKind::Station));
        assert_eq!(targets[3], ScoreTarget::new(2024, PopulationKind::Area));
    }

    #[test]
    fn population_is_ordered_by_rank_then_total_then_id() {
        let figure = |id: i64, total: Option<u64>| UnitFigure {
            unit: UnitRef::area(id),
            counts: total.map(theft),
            granularity: Granularity::Area,
        };
        let figures = [
            figure(5, Some(10)),
            figure(2, None),
            figure(3, Some(10)),
            figure(1, Some(30)),
            figure(4, Some(0)),
        ];
        let population =
            score_population(ScoreTarget::new(2024, PopulationKind::Area), &figures, None);

        let order: Vec<(i64, Option<u32>)> =
            population.scores.iter().map(|s| (s.unit.id, s.rank)).collect();
        assert_eq!(
            order,
            vec![(4, Some(1)), (3, Some(2)), (5, Some(2)), (1, Some(3)), (2, None)]
        );
        assert_eq!(population.status, PopulationStatus::Scored { size: 4 });
    }

    #[test]
    fn single_reporter_is_insufficient() {
        let figures = [
            UnitFigure {
                unit: UnitRef::area(1),
                counts: Some(theft(3)),
                granularity: Granularity::Area,
            },
            UnitFigure {
                unit: UnitRef::area(2),
                counts: None,
                granularity: Granularity::Area,
            },
        ];
        let population =
            score_population(ScoreTarget::new(2024, PopulationKind::Area), &figures, None);
        assert_eq!(population.status, PopulationStatus::Insufficient { reporting: 1 });
        assert!(population.scores.iter().all(|s| s.score.is_none() && s.rank.is_none()));
        assert_eq!(population.scores[0].total_crimes, Some(3));
    }

    #[tokio::test]
    async fn compute_links_previous_year_and_partial_flag() {
        let inputs = inputs();
        let index = GeoIndex::build(&inputs.stations, &inputs.areas);
        let config = ScoringConfig::default();
        let population = compute_population(
            &inputs,
            &index,
            &config,
            ScoreTarget::new(2024, PopulationKind::Area),
        )
        .await
        .unwrap();

        let by_id = |id: i64| {
            population
                .scores
                .iter()
                .find(|s| s.unit.id == id)
                .unwrap()
        };
        assert_eq!(by_id(1).previous_year_total, Some(4));
        assert_eq!(by_id(2).previous_year_total, Some(10));
        assert_eq!(by_id(3).previous_year_total, None);
        assert_eq!(by_id(4).score, None);
        assert_eq!(by_id(1).rank, Some(1));
        assert!(population.scores.iter().all(|s| s.partial_year.is_some()));
    }

    #[tokio::test]
    async fn recompute_is_deterministic_and_ordered() {
        let inputs = inputs();
        let index = GeoIndex::build(&inputs.stations, &inputs.areas);
        let config = ScoringConfig::default();
        let targets = inputs.all_targets();

        let first = recompute(&inputs, &index, &config, &targets, null_progress().as_ref())
            .await
            .unwrap();
        let second = recompute(&inputs, &index, &config, &targets, null_progress().as_ref())
            .await
            .unwrap();

        assert_eq!(first, second);
        let got: Vec<ScoreTarget> = first.iter().map(|p| p.target).collect();
        assert_eq!(got, targets);
        assert!(matches!(
            first[0].status,
            PopulationStatus::Insufficient { reporting: 0 }
        ));
    }
}

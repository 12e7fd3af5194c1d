//! Turns a year's crime records into one figure per unit.
//!
//! Areas take their own record when their municipality publishes area-level
//! data, and the municipality's shared record otherwise. Stations sum the
//! records of every area whose representative point lies inside the
//! catchment radius, or take their municipality's record in regions that
//! only publish municipality totals.

use std::collections::BTreeMap;

use safety_map_crime_models::{CategoryCounts, CrimeRecord, RecordSubject};
use safety_map_geography_models::{Area, Municipality, Station};
use safety_map_scoring_models::{Granularity, PopulationKind, UnitFigure};
use safety_map_spatial::ProximitySource;

use crate::ScoringError;
use crate::config::{EmptyCatchment, ScoringConfig};

/// One year's records, keyed by subject.
#[derive(Debug, Clone, Default)]
pub struct YearRecords {
    year: i32,
    areas: BTreeMap<i64, CategoryCounts>,
    municipalities: BTreeMap<Municipality, CategoryCounts>,
}

impl YearRecords {
    /// Collects the records for `year`. Duplicate subjects keep the last
    /// record seen.
    #[must_use]
    pub fn for_year(year: i32, records: &[CrimeRecord]) -> Self {
        let mut out = Self {
            year,
            ..Self::default()
        };
        for record in records.iter().filter(|r| r.year() == year) {
            match record.subject() {
                RecordSubject::Area(id) => {
                    out.areas.insert(id, record.counts());
                }
                RecordSubject::Municipality(m) => {
                    out.municipalities.insert(m, record.counts());
                }
            }
        }
        out
    }

    /// The year these records describe.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Whether no record exists for the year.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty() && self.municipalities.is_empty()
    }

    /// An area's own record.
    #[must_use]
    pub fn area(&self, id: i64) -> Option<CategoryCounts> {
        self.areas.get(&id).copied()
    }

    /// A municipality-level record.
    #[must_use]
    pub fn municipality(&self, municipality: Municipality) -> Option<CategoryCounts> {
        self.municipalities.get(&municipality).copied()
    }
}

/// Whole-municipality totals for a year.
///
/// Municipalities that publish area data sum their areas' records; the
/// rest use their municipality-level record. Municipalities with neither
/// are absent.
#[must_use]
pub fn municipality_totals(
    areas: &[Area],
    records: &YearRecords,
) -> BTreeMap<Municipality, CategoryCounts> {
    let mut totals: BTreeMap<Municipality, CategoryCounts> = BTreeMap::new();
    for area in areas.iter().filter(|a| a.municipality.publishes_area_data()) {
        if let Some(counts) = records.area(area.id) {
            *totals.entry(area.municipality).or_default() += counts;
        }
    }
    for (&m, &counts) in &records.municipalities {
        if !m.publishes_area_data() {
            totals.insert(m, counts);
        }
    }
    totals
}

/// Figure for each area, in input order.
#[must_use]
pub fn area_figures(areas: &[Area], records: &YearRecords) -> Vec<UnitFigure> {
    areas
        .iter()
        .map(|area| {
            if area.municipality.publishes_area_data() {
                UnitFigure {
                    unit: area.unit_ref(),
                    counts: records.area(area.id),
                    granularity: Granularity::Area,
                }
            } else {
                UnitFigure {
                    unit: area.unit_ref(),
                    counts: records.municipality(area.municipality),
                    granularity: Granularity::Municipality,
                }
            }
        })
        .collect()
}

/// Builds unit figures for a population using a proximity backend for
/// station catchments.
pub struct Aggregator<'a> {
    stations: &'a [Station],
    areas: &'a [Area],
    proximity: &'a dyn ProximitySource,
    config: &'a ScoringConfig,
}

impl<'a> Aggregator<'a> {
    /// Creates an aggregator over a fixed set of units.
    #[must_use]
    pub fn new(
        stations: &'a [Station],
        areas: &'a [Area],
        proximity: &'a dyn ProximitySource,
        config: &'a ScoringConfig,
    ) -> Self {
        Self {
            stations,
            areas,
            proximity,
            config,
        }
    }

    /// Figures for every unit of `population`.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Spatial`] if the proximity backend fails.
    /// Timeouts are not errors; see [`Self::station_figures`].
    pub async fn figures(
        &self,
        population: PopulationKind,
        records: &YearRecords,
    ) -> Result<Vec<UnitFigure>, ScoringError> {
        match population {
            PopulationKind::Area => Ok(area_figures(self.areas, records)),
            PopulationKind::Station => self.station_figures(records).await,
        }
    }

    /// Figure for each station, in input order.
    ///
    /// A catchment query that exceeds the configured timeout is logged and
    /// treated as an empty catchment.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Spatial`] if the proximity backend fails.
    pub async fn station_figures(
        &self,
        records: &YearRecords,
    ) -> Result<Vec<UnitFigure>, ScoringError> {
        let rollup = municipality_totals(self.areas, records);
        let mut figures = Vec::with_capacity(self.stations.len());
        let mut empty = 0_usize;

        for station in self.stations {
            let figure = if station.municipality.publishes_area_data() {
                match self.catchment(station, records).await? {
                    Some(counts) => UnitFigure {
                        unit: station.unit_ref(),
                        counts: Some(counts),
                        granularity: Granularity::Area,
                    },
                    None => {
                        empty += 1;
                        self.empty_catchment(station, &rollup)
                    }
                }
            } else {
                UnitFigure {
                    unit: station.unit_ref(),
                    counts: records.municipality(station.municipality),
                    granularity: Granularity::Municipality,
                }
            };
            figures.push(figure);
        }

        if empty > 0 {
            log::debug!(
                "{empty} of {} stations had no area records within {} m in {} ({:?})",
                self.stations.len(),
                self.config.catchment_radius_m,
                records.year(),
                self.config.empty_catchment,
            );
        }
        Ok(figures)
    }

    /// Sum of area records inside the station's catchment, or `None` if no
    /// area with a record is in range.
    async fn catchment(
        &self,
        station: &Station,
        records: &YearRecords,
    ) -> Result<Option<CategoryCounts>, ScoringError> {
        let Some(origin) = station.location else {
            return Ok(None);
        };

        let query = self
            .proximity
            .nearest_areas(origin, self.config.catchment_radius_m);
        let neighbors = match tokio::time::timeout(self.config.spatial_timeout(), query).await {
            Ok(result) => result?,
            Err(_) => {
                log::warn!(
                    "Catchment query for station {} ({}) timed out after {:?}, treating as empty",
                    station.id,
                    station.name,
                    self.config.spatial_timeout(),
                );
                return Ok(None);
            }
        };

        let mut found = false;
        let mut sum = CategoryCounts::default();
        for counts in neighbors.iter().filter_map(|n| records.area(n.id)) {
            found = true;
            sum += counts;
        }
        Ok(found.then_some(sum))
    }

    fn empty_catchment(
        &self,
        station: &Station,
        rollup: &BTreeMap<Municipality, CategoryCounts>,
    ) -> UnitFigure {
        match self.config.empty_catchment {
            EmptyCatchment::Unscored => UnitFigure {
                unit: station.unit_ref(),
                counts: None,
                granularity: Granularity::Area,
            },
            EmptyCatchment::MunicipalityFallback => UnitFigure {
                unit: station.unit_ref(),
                counts: rollup.get(&station.municipality).copied(),
                granularity: Granularity::Municipality,
            },
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety score, ranking, and trend result types.
//!
//! These are derived data: every [`SafetyScore`] can be regenerated from the
//! crime records at any time and holds no independent truth.

use safety_map_crime_models::{CategoryCounts, PartialYear};
use safety_map_geography_models::{UnitKind, UnitRef};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Resolution of the crime data behind a unit's figure.
///
/// Carried on every score so that a municipality-wide figure is never
/// presented as if it were specific to the unit.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Granularity {
    /// Built from area-level (町丁目) records.
    Area,
    /// Shared municipality-wide record.
    Municipality,
}

/// One of the two independent scoring populations.
///
/// Stations and areas are never scored together.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PopulationKind {
    /// All stations, each with its catchment figure.
    Station,
    /// All areas, each with its own (or its municipality's) record.
    Area,
}

impl PopulationKind {
    /// The unit kind scored in this population.
    #[must_use]
    pub const fn unit_kind(self) -> UnitKind {
        match self {
            Self::Station => UnitKind::Station,
            Self::Area => UnitKind::Area,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Station, Self::Area]
    }
}

/// Identifies one population to compute: a year and a spatial population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreTarget {
    /// Reporting year.
    pub year: i32,
    /// Which population.
    pub population: PopulationKind,
}

impl ScoreTarget {
    /// Creates a new target.
    #[must_use]
    pub const fn new(year: i32, population: PopulationKind) -> Self {
        Self { year, population }
    }
}

impl std::fmt::Display for ScoreTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.year, self.population)
    }
}

/// A unit's crime figure for one year, before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitFigure {
    /// The unit.
    pub unit: UnitRef,
    /// Per-category counts, or `None` when no figure exists for the unit.
    pub counts: Option<CategoryCounts>,
    /// Resolution of the data behind `counts`.
    pub granularity: Granularity,
}

impl UnitFigure {
    /// Total crimes, if a figure exists.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.counts.as_ref().map(CategoryCounts::total)
    }
}

/// How a population's statistics resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PopulationStatus {
    /// Normal deviation scoring.
    Scored {
        /// Number of units with a score.
        size: usize,
    },
    /// Every unit had the same total; every score is exactly 50.
    Degenerate {
        /// Number of units with a score.
        size: usize,
    },
    /// Fewer than two units reported; nobody was scored.
    Insufficient {
        /// Number of units with a non-null total.
        reporting: usize,
    },
}

impl PopulationStatus {
    /// Number of units that received a score and rank.
    #[must_use]
    pub const fn ranked_size(&self) -> usize {
        match self {
            Self::Scored { size } | Self::Degenerate { size } => *size,
            Self::Insufficient { .. } => 0,
        }
    }

    /// Short machine-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Scored { .. } => "scored",
            Self::Degenerate { .. } => "degenerate",
            Self::Insufficient { .. } => "insufficient",
        }
    }
}

/// The published safety figure for one unit and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyScore {
    /// The scored unit.
    pub unit: UnitRef,
    /// Reporting year.
    pub year: i32,
    /// Deviation score in `[0, 100]`, or `None` when the unit was excluded.
    pub score: Option<f64>,
    /// Dense rank within the year's population (1 = safest), `None` exactly
    /// when `score` is `None`.
    pub rank: Option<u32>,
    /// Total crimes, `None` when no figure exists.
    pub total_crimes: Option<u64>,
    /// Category breakdown, denormalised for reads.
    pub counts: Option<CategoryCounts>,
    /// Previous calendar year's total, `None` if absent.
    pub previous_year_total: Option<u64>,
    /// Resolution of the underlying data.
    pub data_granularity: Granularity,
    /// Set when the year's figures are incomplete.
    pub partial_year: Option<PartialYear>,
}

/// A fully computed population, ready to publish as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredPopulation {
    /// Which population this is.
    pub target: ScoreTarget,
    /// How the statistics resolved.
    pub status: PopulationStatus,
    /// One entry per unit in the population, ordered by rank, then total,
    /// then unit ID. Unranked units come last.
    pub scores: Vec<SafetyScore>,
}

/// A year-over-year comparison point for one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// Reporting year.
    pub year: i32,
    /// Total crimes that year.
    pub total_crimes: Option<u64>,
    /// Total crimes the calendar year before.
    pub previous_year_total: Option<u64>,
    /// `total_crimes - previous_year_total`.
    pub delta: Option<i64>,
    /// `delta / previous_year_total * 100`, `None` if the previous total is
    /// zero or absent.
    pub percent_change: Option<f64>,
    /// Passed through from ingestion.
    pub partial_year: Option<PartialYear>,
}

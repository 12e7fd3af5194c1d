#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Database row types for the read model.
//!
//! These types represent the shapes of data as retrieved from the `DuckDB`
//! store. They are distinct from the API response types in
//! `safety_map_server_models` and the scoring types in
//! `safety_map_scoring_models`.

use chrono::{DateTime, Utc};
use safety_map_crime_models::{CategoryCounts, PartialYear};
use safety_map_geography_models::{Area, Municipality};
use safety_map_scoring_models::{SafetyScore, ScoreTarget};
use serde::{Deserialize, Serialize};

/// A published score joined with the unit's display identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedScore {
    /// Unit ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// URL slug.
    pub slug: String,
    /// Containing municipality.
    pub municipality: Municipality,
    /// The published score row.
    pub score: SafetyScore,
}

/// Which end of a ranking to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingEnd {
    /// Highest scores first.
    Safest,
    /// Lowest scores first.
    LeastSafe,
}

/// Whole-municipality crime totals for one year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MunicipalityYearStats {
    /// Reporting year.
    pub year: i32,
    /// Per-category counts summed over the municipality.
    pub counts: CategoryCounts,
    /// Number of area records summed, zero for municipality-level records.
    pub area_count: u64,
    /// Set when the year's figures stop before December.
    pub partial_year: Option<PartialYear>,
}

impl MunicipalityYearStats {
    /// Sum of all categories.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.counts.total()
    }
}

/// Station count and mean score for one rail line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSummary {
    /// Line name.
    pub line: String,
    /// Stations served by the line.
    pub station_count: u64,
    /// Mean station score, rounded to one decimal place. `None` when no
    /// station on the line has a score.
    pub average_score: Option<f64>,
}

/// An area with its published score for one year, for choropleth export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaScoreRow {
    /// The area, including its boundary.
    pub area: Area,
    /// The published score, if the area was part of the population.
    pub score: Option<SafetyScore>,
}

/// Audit row written with each published population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRun {
    /// The population that was published.
    pub target: ScoreTarget,
    /// Status label (`scored`, `degenerate`, or `insufficient`).
    pub status: String,
    /// Units that received a rank.
    pub ranked: u64,
    /// Units in the population.
    pub units: u64,
    /// When the population was computed.
    pub computed_at: DateTime<Utc>,
}

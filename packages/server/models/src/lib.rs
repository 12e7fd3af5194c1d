#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the safety map server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the database row types to allow independent evolution of the API
//! contract.

use safety_map_crime_models::CategoryCounts;
use safety_map_database_models::{LineSummary, MunicipalityYearStats, NamedScore};
use safety_map_geography_models::{Area, LatLng, Municipality, MunicipalityKind, Station};
use safety_map_scoring_models::{Granularity, PopulationKind, SafetyScore, TrendPoint};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
}

impl ApiError {
    /// Creates an error body.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// A municipality as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMunicipality {
    /// JIS code.
    pub code: u32,
    /// URL slug.
    pub slug: String,
    /// Japanese name.
    pub name: String,
    /// Administrative kind.
    pub kind: MunicipalityKind,
    /// Whether crime data is published per area.
    pub publishes_area_data: bool,
}

impl From<Municipality> for ApiMunicipality {
    fn from(m: Municipality) -> Self {
        Self {
            code: m.code(),
            slug: m.slug().to_string(),
            name: m.name().to_string(),
            kind: m.kind(),
            publishes_area_data: m.publishes_area_data(),
        }
    }
}

/// One year of a unit's published score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiScore {
    /// Reporting year.
    pub year: i32,
    /// Deviation score, `null` when the unit was excluded.
    pub score: Option<f64>,
    /// Dense rank, 1 = safest.
    pub rank: Option<u32>,
    /// Total crimes.
    pub total_crimes: Option<u64>,
    /// Category breakdown.
    pub categories: Option<CategoryCounts>,
    /// Total crimes the calendar year before.
    pub previous_year_total: Option<u64>,
    /// Resolution of the underlying data.
    pub data_granularity: Granularity,
    /// Last month covered when the year is incomplete.
    pub partial_cutoff_month: Option<u8>,
}

impl From<&SafetyScore> for ApiScore {
    fn from(s: &SafetyScore) -> Self {
        Self {
            year: s.year,
            score: s.score,
            rank: s.rank,
            total_crimes: s.total_crimes,
            categories: s.counts,
            previous_year_total: s.previous_year_total,
            data_granularity: s.data_granularity,
            partial_cutoff_month: s.partial_year.map(|p| p.cutoff_month()),
        }
    }
}

/// A year-over-year comparison point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTrendPoint {
    /// Reporting year.
    pub year: i32,
    /// Total crimes that year.
    pub total_crimes: Option<u64>,
    /// Total crimes the year before.
    pub previous_year_total: Option<u64>,
    /// Difference from the previous year.
    pub delta: Option<i64>,
    /// Percent change from the previous year.
    pub percent_change: Option<f64>,
    /// Last month covered when the year is incomplete.
    pub partial_cutoff_month: Option<u8>,
}

impl From<TrendPoint> for ApiTrendPoint {
    fn from(p: TrendPoint) -> Self {
        Self {
            year: p.year,
            total_crimes: p.total_crimes,
            previous_year_total: p.previous_year_total,
            delta: p.delta,
            percent_change: p.percent_change,
            partial_cutoff_month: p.partial_year.map(|p| p.cutoff_month()),
        }
    }
}

/// A unit with its score for one year, as listed in rankings and
/// municipality pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUnitSummary {
    /// Unit ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// URL slug.
    pub slug: String,
    /// Municipality slug.
    pub municipality: Municipality,
    /// Published score.
    pub score: ApiScore,
}

impl From<NamedScore> for ApiUnitSummary {
    fn from(n: NamedScore) -> Self {
        Self {
            score: ApiScore::from(&n.score),
            id: n.id,
            name: n.name,
            slug: n.slug,
            municipality: n.municipality,
        }
    }
}

/// Full detail for a station or area page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUnitDetail {
    /// Unit ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// URL slug.
    pub slug: String,
    /// Point coordinate, if known.
    pub location: Option<LatLng>,
    /// Containing municipality.
    pub municipality: ApiMunicipality,
    /// Rail lines, stations only.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub lines: Vec<String>,
    /// Published scores, newest first.
    pub scores: Vec<ApiScore>,
    /// Year-over-year trend, newest first.
    pub trend: Vec<ApiTrendPoint>,
}

impl ApiUnitDetail {
    /// Detail for a station.
    #[must_use]
    pub fn station(station: Station, scores: Vec<ApiScore>, trend: Vec<ApiTrendPoint>) -> Self {
        Self {
            id: station.id,
            name: station.name,
            slug: station.slug,
            location: station.location,
            municipality: station.municipality.into(),
            lines: station.lines,
            scores,
            trend,
        }
    }

    /// Detail for an area.
    #[must_use]
    pub fn area(area: Area, scores: Vec<ApiScore>, trend: Vec<ApiTrendPoint>) -> Self {
        Self {
            id: area.id,
            name: area.name,
            slug: area.slug,
            location: area.location,
            municipality: area.municipality.into(),
            lines: Vec::new(),
            scores,
            trend,
        }
    }
}

/// A unit found near another unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNearbyUnit {
    /// Unit ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// URL slug.
    pub slug: String,
    /// Distance from the origin unit in meters, rounded to the meter.
    pub distance_m: f64,
    /// Score for the requested year.
    pub score: Option<f64>,
    /// Rank for the requested year.
    pub rank: Option<u32>,
}

/// Municipality totals for one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMunicipalityYear {
    /// Reporting year.
    pub year: i32,
    /// Sum of all categories.
    pub total_crimes: u64,
    /// Category breakdown.
    pub categories: CategoryCounts,
    /// Total the year before, `null` if that year has no record.
    pub previous_year_total: Option<u64>,
    /// Number of area records summed, zero for municipality-level data.
    pub area_count: u64,
    /// Last reported month when the year is partial.
    pub partial_cutoff_month: Option<u8>,
}

impl ApiMunicipalityYear {
    /// Converts a stats row, linking in the previous year's total.
    #[must_use]
    pub fn new(stats: &MunicipalityYearStats, previous_year_total: Option<u64>) -> Self {
        Self {
            year: stats.year,
            total_crimes: stats.total(),
            categories: stats.counts,
            previous_year_total,
            area_count: stats.area_count,
            partial_cutoff_month: stats.partial_year.map(|p| p.cutoff_month()),
        }
    }
}

/// Crime statistics for a municipality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMunicipalityStats {
    /// The municipality.
    pub municipality: ApiMunicipality,
    /// Yearly totals, newest first.
    pub years: Vec<ApiMunicipalityYear>,
}

/// Units of one municipality with their scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMunicipalityUnits {
    /// The municipality.
    pub municipality: ApiMunicipality,
    /// Year the scores are for.
    pub year: i32,
    /// Which population was listed.
    pub population: PopulationKind,
    /// Units ordered by rank, unranked last.
    pub units: Vec<ApiUnitSummary>,
}

/// One end of a ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRanking {
    /// Year the ranking is for.
    pub year: i32,
    /// Which population was ranked.
    pub population: PopulationKind,
    /// Ranked units.
    pub entries: Vec<ApiUnitSummary>,
}

/// Rail line summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLineSummary {
    /// Line name.
    pub line: String,
    /// Stations served.
    pub station_count: u64,
    /// Mean station score to one decimal place.
    pub average_score: Option<f64>,
}

impl From<LineSummary> for ApiLineSummary {
    fn from(l: LineSummary) -> Self {
        Self {
            line: l.line,
            station_count: l.station_count,
            average_score: l.average_score,
        }
    }
}

/// Query parameters carrying an optional year. The latest published year
/// is used when absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearParams {
    /// Score year.
    pub year: Option<i32>,
}

/// Query parameters for ranking endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingParams {
    /// Score year.
    pub year: Option<i32>,
    /// Population to rank, areas by default.
    pub population: Option<PopulationKind>,
    /// Maximum entries, 5 by default.
    pub limit: Option<u64>,
}

/// Query parameters for the municipality unit list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MunicipalityUnitsParams {
    /// Score year.
    pub year: Option<i32>,
    /// Population to list, areas by default.
    pub population: Option<PopulationKind>,
}

/// Query parameters for proximity endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyParams {
    /// Score year.
    pub year: Option<i32>,
    /// Maximum entries, 20 by default.
    pub limit: Option<usize>,
}

/// Query parameters for the paginated choropleth endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonPageParams {
    /// Score year.
    pub year: Option<i32>,
    /// First area index.
    pub offset: Option<u64>,
    /// Page size, capped at the configured export page size.
    pub limit: Option<u64>,
}

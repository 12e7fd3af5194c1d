//! HTTP handler functions for the safety map API.
//!
//! Every score endpoint takes an optional `year`; when it is absent the
//! latest published year of the relevant population is used.

use std::collections::BTreeMap;

use actix_web::{HttpResponse, web};
use duckdb::Connection;
use safety_map_database::DbError;
use safety_map_database::queries;
use safety_map_database::scores::{latest_year, unit_series};
use safety_map_database::units::{area_by_slug, station_by_slug};
use safety_map_database_models::RankingEnd;
use safety_map_generate::{ChoroplethPage, ExportError, fetch_page};
use safety_map_geography_models::{Area, LatLng, Municipality, Station, UnitKind};
use safety_map_scoring::trend::{self, YearTotal};
use safety_map_scoring_models::{PopulationKind, SafetyScore};
use safety_map_spatial::boundary::representative_point;
use safety_map_server_models::{
    ApiError, ApiHealth, ApiLineSummary, ApiMunicipality, ApiMunicipalityStats,
    ApiMunicipalityUnits, ApiMunicipalityYear, ApiNearbyUnit, ApiRanking, ApiScore,
    ApiTrendPoint, ApiUnitDetail, ApiUnitSummary, GeoJsonPageParams, MunicipalityUnitsParams,
    NearbyParams, RankingParams, YearParams,
};
use serde::Serialize;

use crate::AppState;

const DEFAULT_RANKING_LIMIT: u64 = 5;
const MAX_RANKING_LIMIT: u64 = 100;
const DEFAULT_NEARBY_LIMIT: usize = 20;

/// Why a request could not be answered.
enum Failure {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<DbError> for Failure {
    fn from(e: DbError) -> Self {
        Self::Internal(format!("Database error: {e}"))
    }
}

impl From<ExportError> for Failure {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::InvalidPageSize => Self::BadRequest(e.to_string()),
            ExportError::NoScores => Self::NotFound(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

fn respond<T: Serialize>(result: Result<T, Failure>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(Failure::NotFound(message)) => HttpResponse::NotFound().json(ApiError::new(message)),
        Err(Failure::BadRequest(message)) => {
            HttpResponse::BadRequest().json(ApiError::new(message))
        }
        Err(Failure::Internal(message)) => {
            log::error!("Request failed: {message}");
            HttpResponse::InternalServerError().json(ApiError::new("Internal server error"))
        }
    }
}

fn year_or_latest(
    conn: &Connection,
    population: PopulationKind,
    year: Option<i32>,
) -> Result<i32, Failure> {
    match year {
        Some(year) => Ok(year),
        None => latest_year(conn, population)?
            .ok_or_else(|| Failure::NotFound(format!("No published {population} scores"))),
    }
}

fn find_station(conn: &Connection, slug: &str) -> Result<Station, Failure> {
    station_by_slug(conn, slug)?
        .ok_or_else(|| Failure::NotFound(format!("Unknown station: {slug}")))
}

fn find_area(conn: &Connection, slug: &str) -> Result<Area, Failure> {
    area_by_slug(conn, slug)?.ok_or_else(|| Failure::NotFound(format!("Unknown area: {slug}")))
}

fn municipality(slug: &str) -> Result<Municipality, Failure> {
    Municipality::from_slug(slug)
        .ok_or_else(|| Failure::NotFound(format!("Unknown municipality: {slug}")))
}

/// Scores newest first with previous-year totals linked, plus the trend.
fn series_and_trend(mut series: Vec<SafetyScore>) -> (Vec<ApiScore>, Vec<ApiTrendPoint>) {
    trend::link_previous_year(&mut series);
    let totals: Vec<YearTotal> = series.iter().map(YearTotal::from).collect();
    let points = trend::resolve(&totals)
        .into_iter()
        .map(ApiTrendPoint::from)
        .collect();
    (series.iter().map(ApiScore::from).collect(), points)
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/municipalities`
pub async fn municipalities() -> HttpResponse {
    let all: Vec<ApiMunicipality> = Municipality::all()
        .iter()
        .copied()
        .map(ApiMunicipality::from)
        .collect();
    HttpResponse::Ok().json(all)
}

/// `GET /api/municipalities/{slug}/stats`
///
/// Yearly crime totals, newest first, each with the previous calendar
/// year's total and its partial-year cutoff.
pub async fn municipality_stats(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    respond(municipality_stats_body(&state, &path))
}

fn municipality_stats_body(state: &AppState, slug: &str) -> Result<ApiMunicipalityStats, Failure> {
    let m = municipality(slug)?;
    let stats = queries::municipality_stats(&state.pool.acquire(), m)?;

    let totals: Vec<YearTotal> = stats
        .iter()
        .map(|s| YearTotal {
            year: s.year,
            total: Some(s.total()),
            partial_year: s.partial_year,
        })
        .collect();
    let years = stats
        .iter()
        .zip(trend::resolve(&totals))
        .map(|(s, point)| ApiMunicipalityYear::new(s, point.previous_year_total))
        .collect();

    Ok(ApiMunicipalityStats {
        municipality: m.into(),
        years,
    })
}

/// `GET /api/municipalities/{slug}/units`
pub async fn municipality_units(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<MunicipalityUnitsParams>,
) -> HttpResponse {
    respond(municipality_units_body(&state, &path, &params))
}

fn municipality_units_body(
    state: &AppState,
    slug: &str,
    params: &MunicipalityUnitsParams,
) -> Result<ApiMunicipalityUnits, Failure> {
    let m = municipality(slug)?;
    let population = params.population.unwrap_or(PopulationKind::Area);
    let conn = state.pool.acquire();
    let year = year_or_latest(&conn, population, params.year)?;
    let units = queries::units_in_municipality(&conn, population, m, year)?;

    Ok(ApiMunicipalityUnits {
        municipality: m.into(),
        year,
        population,
        units: units.into_iter().map(ApiUnitSummary::from).collect(),
    })
}

/// `GET /api/stations/{slug}`
pub async fn station(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    respond(station_detail(&state.pool.acquire(), &path))
}

fn station_detail(conn: &Connection, slug: &str) -> Result<ApiUnitDetail, Failure> {
    let station = find_station(conn, slug)?;
    let (scores, trend) = series_and_trend(unit_series(conn, station.unit_ref())?);
    Ok(ApiUnitDetail::station(station, scores, trend))
}

/// `GET /api/areas/{slug}`
pub async fn area(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    respond(area_detail(&state.pool.acquire(), &path))
}

fn area_detail(conn: &Connection, slug: &str) -> Result<ApiUnitDetail, Failure> {
    let area = find_area(conn, slug)?;
    let (scores, trend) = series_and_trend(unit_series(conn, area.unit_ref())?);
    Ok(ApiUnitDetail::area(area, scores, trend))
}

/// Units of `kind` near `origin` with their scores for the resolved year.
/// Scores are omitted when nothing of that kind has been published.
fn nearby(
    state: &AppState,
    conn: &Connection,
    kind: UnitKind,
    origin: Option<LatLng>,
    radius_m: f64,
    params: &NearbyParams,
) -> Result<Vec<ApiNearbyUnit>, Failure> {
    let Some(origin) = origin else {
        return Ok(Vec::new());
    };
    let population = match kind {
        UnitKind::Station => PopulationKind::Station,
        UnitKind::Area => PopulationKind::Area,
    };

    let limit = params.limit.unwrap_or(DEFAULT_NEARBY_LIMIT);
    let hits = state.geo.nearest_within(kind, origin, radius_m, limit);
    let ids: Vec<i64> = hits.iter().map(|n| n.id).collect();

    let year = match params.year {
        Some(year) => Some(year),
        None => latest_year(conn, population)?,
    };
    let scores = match year {
        Some(year) => queries::scores_for_units(conn, kind, year, &ids)?,
        None => BTreeMap::new(),
    };

    Ok(hits
        .iter()
        .filter_map(|hit| {
            let (name, slug) = match kind {
                UnitKind::Station => state
                    .stations
                    .get(&hit.id)
                    .map(|s| (s.name.clone(), s.slug.clone())),
                UnitKind::Area => state
                    .areas
                    .get(&hit.id)
                    .map(|a| (a.name.clone(), a.slug.clone())),
            }?;
            let score = scores.get(&hit.id);
            Some(ApiNearbyUnit {
                id: hit.id,
                name,
                slug,
                distance_m: hit.distance_m.round(),
                score: score.and_then(|s| s.score),
                rank: score.and_then(|s| s.rank),
            })
        })
        .collect())
}

/// `GET /api/stations/{slug}/nearby-areas`
pub async fn nearby_areas(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<NearbyParams>,
) -> HttpResponse {
    let conn = state.pool.acquire();
    respond(find_station(&conn, &path).and_then(|station| {
        nearby(
            &state,
            &conn,
            UnitKind::Area,
            station.location,
            state.config.nearby_areas_radius_m,
            &params,
        )
    }))
}

/// `GET /api/areas/{slug}/nearby-stations`
pub async fn nearby_stations(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<NearbyParams>,
) -> HttpResponse {
    let conn = state.pool.acquire();
    respond(find_area(&conn, &path).and_then(|area| {
        nearby(
            &state,
            &conn,
            UnitKind::Station,
            representative_point(&area),
            state.config.nearby_stations_radius_m,
            &params,
        )
    }))
}

/// `GET /api/areas/geojson`
///
/// One page of the choropleth collection. Follow `nextOffset` until it is
/// `null` to receive every area.
pub async fn areas_geojson(
    state: web::Data<AppState>,
    params: web::Query<GeoJsonPageParams>,
) -> HttpResponse {
    respond(geojson_page(&state, &params))
}

fn geojson_page(state: &AppState, params: &GeoJsonPageParams) -> Result<ChoroplethPage, Failure> {
    let conn = state.pool.acquire();
    let year = safety_map_generate::resolve_year(&conn, params.year)?;
    let max = state.config.export_page_size as u64;
    let limit = params.limit.unwrap_or(max).min(max);
    Ok(fetch_page(&conn, year, params.offset.unwrap_or(0), limit)?)
}

fn ranking(state: &AppState, params: &RankingParams, end: RankingEnd) -> Result<ApiRanking, Failure> {
    let population = params.population.unwrap_or(PopulationKind::Area);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RANKING_LIMIT)
        .min(MAX_RANKING_LIMIT);
    let conn = state.pool.acquire();
    let year = year_or_latest(&conn, population, params.year)?;
    let entries = queries::ranked_units(&conn, population, year, end, limit)?;

    Ok(ApiRanking {
        year,
        population,
        entries: entries.into_iter().map(ApiUnitSummary::from).collect(),
    })
}

/// `GET /api/rankings/safest`
pub async fn safest(
    state: web::Data<AppState>,
    params: web::Query<RankingParams>,
) -> HttpResponse {
    respond(ranking(&state, &params, RankingEnd::Safest))
}

/// `GET /api/rankings/least-safe`
pub async fn least_safe(
    state: web::Data<AppState>,
    params: web::Query<RankingParams>,
) -> HttpResponse {
    respond(ranking(&state, &params, RankingEnd::LeastSafe))
}

/// `GET /api/lines`
pub async fn lines(state: web::Data<AppState>, params: web::Query<YearParams>) -> HttpResponse {
    respond(line_list(&state.pool.acquire(), params.year))
}

fn line_list(conn: &Connection, year: Option<i32>) -> Result<Vec<ApiLineSummary>, Failure> {
    let year = year_or_latest(conn, PopulationKind::Station, year)?;
    Ok(queries::line_summaries(conn, year)?
        .into_iter()
        .map(ApiLineSummary::from)
        .collect())
}

//! Area choropleth features and their pagination.
//!
//! Pages are cut by area ID, so a client that requests offsets
//! `0, limit, 2 * limit, ...` until `next_offset` is `None` receives every
//! area exactly once. [`reassemble`] checks that the pages it is given line
//! up before joining them.

use duckdb::Connection;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, feature::Id};
use safety_map_database::queries::{area_count, area_score_page};
use safety_map_database_models::AreaScoreRow;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ExportError;

/// One slice of the choropleth collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoroplethPage {
    /// Score year the page was read for.
    pub year: i32,
    /// Index of the first area in this page.
    pub offset: u64,
    /// Requested page size.
    pub limit: u64,
    /// Number of areas across all pages.
    pub total: u64,
    /// Offset of the following page, `None` on the last page.
    pub next_offset: Option<u64>,
    /// The features of this page, ordered by area ID.
    pub collection: FeatureCollection,
}

/// Reads one page of area features for `year`.
///
/// # Errors
///
/// * [`ExportError::InvalidPageSize`] if `limit` is zero
/// * [`ExportError::Database`] if a query fails
/// * [`ExportError::Geometry`] if a stored boundary is not valid `GeoJSON`
pub fn fetch_page(
    conn: &Connection,
    year: i32,
    offset: u64,
    limit: u64,
) -> Result<ChoroplethPage, ExportError> {
    if limit == 0 {
        return Err(ExportError::InvalidPageSize);
    }

    let total = area_count(conn)?;
    let rows = area_score_page(conn, year, offset, limit)?;
    let end = offset + rows.len() as u64;

    let features = rows
        .iter()
        .map(area_feature)
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!(
        "Read choropleth page {offset}..{end} of {total} for {year}"
    );

    Ok(ChoroplethPage {
        year,
        offset,
        limit,
        total,
        next_offset: (end < total && !rows.is_empty()).then_some(end),
        collection: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
    })
}

/// Joins pages back into the full collection.
///
/// Pages must be given in order, start at offset zero, follow each other
/// without gaps, and end with the last page.
///
/// # Errors
///
/// Returns [`ExportError::Pagination`] if the pages do not line up.
pub fn reassemble(
    pages: impl IntoIterator<Item = ChoroplethPage>,
) -> Result<FeatureCollection, ExportError> {
    let mut features = Vec::new();
    let mut expected_offset = Some(0);
    let mut year = None;

    for page in pages {
        let Some(expected) = expected_offset else {
            return Err(ExportError::pagination(format!(
                "page at offset {} follows the last page",
                page.offset
            )));
        };
        if page.offset != expected {
            return Err(ExportError::pagination(format!(
                "expected offset {expected}, got {}",
                page.offset
            )));
        }
        let first_year = *year.get_or_insert(page.year);
        if page.year != first_year {
            return Err(ExportError::pagination(format!(
                "page at offset {} is for {}, not {first_year}",
                page.offset, page.year
            )));
        }

        expected_offset = page.next_offset;
        features.extend(page.collection.features);
    }

    if let Some(missing) = expected_offset {
        return Err(ExportError::pagination(format!(
            "pages end before offset {missing}"
        )));
    }

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Builds the map feature for one area. Areas without a stored boundary get
/// a null geometry so that every area still appears exactly once.
///
/// # Errors
///
/// Returns [`ExportError::Geometry`] if the stored boundary does not parse
/// to a geometry.
pub fn area_feature(row: &AreaScoreRow) -> Result<Feature, ExportError> {
    let area = &row.area;
    let geometry = area
        .boundary_geojson
        .as_deref()
        .map(|text| parse_geometry(area.id, text))
        .transpose()?;

    let score = row.score.as_ref();
    let properties = json!({
        "areaName": area.name,
        "slug": area.slug,
        "municipality": area.municipality.name(),
        "score": score.and_then(|s| s.score),
        "rank": score.and_then(|s| s.rank),
        "totalCrimes": score.and_then(|s| s.total_crimes),
        "dataGranularity": score.map(|s| s.data_granularity.to_string()),
        "partialCutoffMonth": score.and_then(|s| s.partial_year).map(|p| p.cutoff_month()),
    });

    Ok(Feature {
        bbox: None,
        geometry,
        id: Some(Id::Number(area.id.into())),
        properties: into_object(properties),
        foreign_members: None,
    })
}

fn parse_geometry(area_id: i64, text: &str) -> Result<Geometry, ExportError> {
    match text.parse::<GeoJson>() {
        Ok(GeoJson::Geometry(geometry)) => Ok(geometry),
        Ok(GeoJson::Feature(Feature {
            geometry: Some(geometry),
            ..
        })) => Ok(geometry),
        Ok(_) => Err(ExportError::Geometry {
            area_id,
            message: "boundary is not a geometry".to_string(),
        }),
        Err(e) => Err(ExportError::Geometry {
            area_id,
            message: e.to_string(),
        }),
    }
}

fn into_object(value: Value) -> Option<JsonObject> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use safety_map_database::open_in_memory;
    use safety_map_database::scores::publish_population;
    use safety_map_database::units::upsert_areas;
    use safety_map_geography_models::{Area, LatLng, Municipality, UnitRef};
    use safety_map_scoring_models::{
        Granularity, PopulationKind, PopulationStatus, SafetyScore, ScoreTarget, ScoredPopulation,
    };

    use super::*;

    const SQUARE: &str = r#"{"type":"Polygon","coordinates":[[[139.70,35.69],[139.71,35.69],[139.71,35.70],[139.70,35.70],[139.70,35.69]]]}"#;

    fn area(id: i64, boundary: Option<&str>) -> Area {
        Area {
            id,
            name: format!("新宿区西新宿{id}丁目"),
            slug: format!("nishi-shinjuku-{id}"),
            location: Some(LatLng::new(35.69, 139.70)),
            municipality: Municipality::Shinjuku,
            boundary_geojson: boundary.map(str::to_string),
        }
    }

    fn seeded(count: i64) -> Connection {
        let mut conn = open_in_memory().unwrap();
        let areas: Vec<Area> = (1..=count).map(|id| area(id, Some(SQUARE))).collect();
        upsert_areas(&conn, &areas).unwrap();

        let scores = vec![
            SafetyScore {
                unit: UnitRef::area(1),
                year: 2024,
                score: Some(61.5),
                rank: Some(1),
                total_crimes: Some(3),
                counts: None,
                previous_year_total: None,
                data_granularity: Granularity::Area,
                partial_year: None,
            },
            SafetyScore {
                unit: UnitRef::area(2),
                year: 2024,
                score: Some(38.5),
                rank: Some(2),
                total_crimes: Some(9),
                counts: None,
                previous_year_total: None,
                data_granularity: Granularity::Area,
                partial_year: None,
            },
        ];
        let population = ScoredPopulation {
            target: ScoreTarget::new(2024, PopulationKind::Area),
            status: PopulationStatus::Scored { size: 2 },
            scores,
        };
        publish_population(&mut conn, &population, Utc::now()).unwrap();
        conn
    }

    #[test]
    fn feature_carries_score_properties() {
        let conn = seeded(3);
        let page = fetch_page(&conn, 2024, 0, 10).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.next_offset, None);

        let first = &page.collection.features[0];
        assert_eq!(first.id, Some(Id::Number(1.into())));
        assert!(first.geometry.is_some());
        let props = first.properties.as_ref().unwrap();
        assert_eq!(props["score"], json!(61.5));
        assert_eq!(props["rank"], json!(1));
        assert_eq!(props["dataGranularity"], json!("area"));
        assert_eq!(props["municipality"], json!("新宿区"));

        let unscored = page.collection.features[2].properties.as_ref().unwrap();
        assert_eq!(unscored["score"], Value::Null);
        assert_eq!(unscored["rank"], Value::Null);
    }

    #[test]
    fn pages_reassemble_to_single_read() {
        let conn = seeded(5);
        let whole = fetch_page(&conn, 2024, 0, 100).unwrap().collection;

        let mut pages = Vec::new();
        let mut offset = Some(0);
        while let Some(current) = offset {
            let page = fetch_page(&conn, 2024, current, 2).unwrap();
            offset = page.next_offset;
            pages.push(page);
        }
        assert_eq!(pages.len(), 3);
        assert_eq!(reassemble(pages).unwrap(), whole);
    }

    #[test]
    fn reassemble_rejects_gaps_and_truncation() {
        let conn = seeded(5);
        let first = fetch_page(&conn, 2024, 0, 2).unwrap();
        let third = fetch_page(&conn, 2024, 4, 2).unwrap();

        assert!(matches!(
            reassemble(vec![first.clone(), third]),
            Err(ExportError::Pagination { .. })
        ));
        assert!(matches!(
            reassemble(vec![first]),
            Err(ExportError::Pagination { .. })
        ));
    }

    #[test]
    fn reassemble_rejects_mixed_years() {
        let conn = seeded(4);
        let first = fetch_page(&conn, 2024, 0, 2).unwrap();
        let second = fetch_page(&conn, 2023, 2, 2).unwrap();
        assert!(matches!(
            reassemble(vec![first, second]),
            Err(ExportError::Pagination { .. })
        ));
    }

    #[test]
    fn missing_boundary_gives_null_geometry() {
        let row = AreaScoreRow {
            area: area(9, None),
            score: None,
        };
        let feature = area_feature(&row).unwrap();
        assert!(feature.geometry.is_none());
    }

    #[test]
    fn corrupt_boundary_is_an_error() {
        let row = AreaScoreRow {
            area: area(9, Some("{\"type\":\"Polygon\"")),
            score: None,
        };
        assert!(matches!(
            area_feature(&row),
            Err(ExportError::Geometry { area_id: 9, .. })
        ));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let conn = seeded(1);
        assert!(matches!(
            fetch_page(&conn, 2024, 0, 0),
            Err(ExportError::InvalidPageSize)
        ));
    }
}

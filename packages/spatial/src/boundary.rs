//! Area boundary geometry helpers.
//!
//! Boundaries are stored as `GeoJSON` geometry strings. The index only
//! needs a representative point per area, which is the polygon centroid
//! when the source did not supply one.

use geo::{Centroid, MultiPolygon};
use geojson::GeoJson;
use safety_map_geography_models::{Area, LatLng};

/// Parse a `GeoJSON` string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
#[must_use]
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        let geo_geom: geo::Geometry<f64> = geom.try_into().ok()?;
        match geo_geom {
            geo::Geometry::MultiPolygon(mp) => Some(mp),
            geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
            _ => None,
        }
    } else {
        None
    }
}

/// Centroid of a boundary polygon.
#[must_use]
pub fn boundary_centroid(geojson_str: &str) -> Option<LatLng> {
    let polygon = parse_geojson_to_multipolygon(geojson_str)?;
    let centroid = polygon.centroid()?;
    let point = LatLng::new(centroid.y(), centroid.x());
    point.is_valid().then_some(point)
}

/// The point an area is located at for proximity queries: its stored
/// coordinate, falling back to the centroid of its boundary.
#[must_use]
pub fn representative_point(area: &Area) -> Option<LatLng> {
    area.location.filter(LatLng::is_valid).or_else(|| {
        area.boundary_geojson
            .as_deref()
            .and_then(boundary_centroid)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use safety_map_geography_models::Municipality;

    const SQUARE: &str = r#"{"type":"Polygon","coordinates":[[[139.70,35.68],[139.72,35.68],[139.72,35.70],[139.70,35.70],[139.70,35.68]]]}"#;

    fn area(location: Option<LatLng>, boundary: Option<&str>) -> Area {
        Area {
            id: 1,
            name: "新宿区西新宿1丁目".to_string(),
            slug: "nishi-shinjuku-1".to_string(),
            location,
            municipality: Municipality::Shinjuku,
            boundary_geojson: boundary.map(str::to_string),
        }
    }

    #[test]
    fn centroid_of_square() {
        let c = boundary_centroid(SQUARE).unwrap();
        assert!((c.lat - 35.69).abs() < 1e-9);
        assert!((c.lng - 139.71).abs() < 1e-9);
    }

    #[test]
    fn non_polygon_geometry_is_ignored() {
        assert!(parse_geojson_to_multipolygon(r#"{"type":"Point","coordinates":[139.7,35.6]}"#).is_none());
        assert!(parse_geojson_to_multipolygon("not json").is_none());
    }

    #[test]
    fn stored_location_wins_over_centroid() {
        let stored = LatLng::new(35.0, 139.0);
        assert_eq!(representative_point(&area(Some(stored), Some(SQUARE))), Some(stored));
    }

    #[test]
    fn falls_back_to_centroid() {
        let p = representative_point(&area(None, Some(SQUARE))).unwrap();
        assert!((p.lng - 139.71).abs() < 1e-9);
        assert_eq!(representative_point(&area(None, None)), None);
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory geo index for proximity queries.
//!
//! Station coordinates and area representative points are loaded once per
//! data release and bulk-loaded into R-trees. The index is read-only and can
//! be shared freely across threads. Results are ordered by great-circle
//! distance with ties broken by unit ID, so repeated queries return
//! identical lists.

pub mod boundary;

use async_trait::async_trait;
use rstar::{AABB, RTree, RTreeObject};
use safety_map_geography_models::{Area, LatLng, Station, UnitKind};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Errors from a proximity backend.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// The backend could not answer the query.
    #[error("Proximity backend error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },
}

/// A unit found by a proximity query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    /// Unit ID in the queried namespace.
    pub id: i64,
    /// Great-circle distance from the query origin in meters.
    pub distance_m: f64,
}

/// The proximity queries the rest of the system depends on.
///
/// [`GeoIndex`] answers these in memory. The trait exists so that a
/// database-backed implementation with real I/O can be swapped in; callers
/// bound every call with a timeout.
#[async_trait]
pub trait ProximitySource: Send + Sync {
    /// Areas whose representative point lies within `radius_m` of `origin`,
    /// nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the backend fails.
    async fn nearest_areas(
        &self,
        origin: LatLng,
        radius_m: f64,
    ) -> Result<Vec<Neighbor>, SpatialError>;

    /// Stations within `radius_m` of `origin`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the backend fails.
    async fn nearest_stations(
        &self,
        origin: LatLng,
        radius_m: f64,
    ) -> Result<Vec<Neighbor>, SpatialError>;
}

/// A unit point stored in the R-tree.
struct IndexedPoint {
    id: i64,
    location: LatLng,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.lng, self.location.lat])
    }
}

/// Pre-built point indexes for stations and areas.
pub struct GeoIndex {
    stations: RTree<IndexedPoint>,
    areas: RTree<IndexedPoint>,
}

impl GeoIndex {
    /// Builds the index. Units without a usable coordinate are left out and
    /// never appear in query results.
    #[must_use]
    pub fn build(stations: &[Station], areas: &[Area]) -> Self {
        let station_points: Vec<IndexedPoint> = stations
            .iter()
            .filter_map(|s| {
                s.location
                    .filter(LatLng::is_valid)
                    .map(|location| IndexedPoint { id: s.id, location })
            })
            .collect();

        let area_points: Vec<IndexedPoint> = areas
            .iter()
            .filter_map(|a| {
                boundary::representative_point(a).map(|location| IndexedPoint { id: a.id, location })
            })
            .collect();

        let skipped_stations = stations.len() - station_points.len();
        let skipped_areas = areas.len() - area_points.len();
        log::info!(
            "Loaded {} stations and {} areas into geo index",
            station_points.len(),
            area_points.len()
        );
        if skipped_stations + skipped_areas > 0 {
            log::warn!(
                "Geo index skipped {skipped_stations} stations and {skipped_areas} areas without coordinates"
            );
        }

        Self {
            stations: RTree::bulk_load(station_points),
            areas: RTree::bulk_load(area_points),
        }
    }

    /// Number of indexed units of a kind.
    #[must_use]
    pub fn len(&self, kind: UnitKind) -> usize {
        self.tree(kind).size()
    }

    /// Whether no units of a kind are indexed.
    #[must_use]
    pub fn is_empty(&self, kind: UnitKind) -> bool {
        self.len(kind) == 0
    }

    const fn tree(&self, kind: UnitKind) -> &RTree<IndexedPoint> {
        match kind {
            UnitKind::Station => &self.stations,
            UnitKind::Area => &self.areas,
        }
    }

    /// Units of `kind` within `radius_m` meters of `origin`, ordered by
    /// ascending distance then ID, capped at `limit` entries.
    #[must_use]
    pub fn nearest_within(
        &self,
        kind: UnitKind,
        origin: LatLng,
        radius_m: f64,
        limit: usize,
    ) -> Vec<Neighbor> {
        if !origin.is_valid() || !radius_m.is_finite() || radius_m < 0.0 || limit == 0 {
            return Vec::new();
        }

        let envelope = search_envelope(origin, radius_m);
        let mut hits: Vec<Neighbor> = self
            .tree(kind)
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|p| {
                let distance_m = haversine_m(origin, p.location);
                (distance_m <= radius_m).then_some(Neighbor { id: p.id, distance_m })
            })
            .collect();

        hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m).then(a.id.cmp(&b.id)));
        hits.truncate(limit);
        hits
    }
}

#[async_trait]
impl ProximitySource for GeoIndex {
    async fn nearest_areas(
        &self,
        origin: LatLng,
        radius_m: f64,
    ) -> Result<Vec<Neighbor>, SpatialError> {
        Ok(self.nearest_within(UnitKind::Area, origin, radius_m, usize::MAX))
    }

    async fn nearest_stations(
        &self,
        origin: LatLng,
        radius_m: f64,
    ) -> Result<Vec<Neighbor>, SpatialError> {
        Ok(self.nearest_within(UnitKind::Station, origin, radius_m, usize::MAX))
    }
}

/// Great-circle distance in meters.
#[must_use]
pub fn haversine_m(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

/// Degree-space bounding box that contains every point within `radius_m`
/// of `origin`. Padded by 1% to cover the curvature the linear longitude
/// estimate misses.
fn search_envelope(origin: LatLng, radius_m: f64) -> AABB<[f64; 2]> {
    let d_lat = (radius_m / EARTH_RADIUS_M).to_degrees() * 1.01;
    let cos_lat = origin.lat.to_radians().cos().max(1e-6);
    let d_lng = (d_lat / cos_lat).min(180.0);

    AABB::from_corners(
        [origin.lng - d_lng, origin.lat - d_lat],
        [origin.lng + d_lng, origin.lat + d_lat],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use safety_map_geography_models::Municipality;

    const TOKYO: LatLng = LatLng::new(35.6812, 139.7671);
    const SHINJUKU: LatLng = LatLng::new(35.6896, 139.7006);

    fn station(id: i64, location: Option<LatLng>) -> Station {
        Station {
            id,
            name: format!("station-{id}"),
            slug: format!("station-{id}"),
            location,
            municipality: Municipality::Chiyoda,
            lines: Vec::new(),
        }
    }

    fn area(id: i64, location: LatLng) -> Area {
        Area {
            id,
            name: format!("area-{id}"),
            slug: format!("area-{id}"),
            location: Some(location),
            municipality: Municipality::Chiyoda,
            boundary_geojson: None,
        }
    }

    /// Point `meters` north of `origin`.
    fn north_of(origin: LatLng, meters: f64) -> LatLng {
        LatLng::new(origin.lat + (meters / EARTH_RADIUS_M).to_degrees(), origin.lng)
    }

    #[test]
    fn haversine_tokyo_to_shinjuku() {
        let d = haversine_m(TOKYO, SHINJUKU);
        assert!((5_900.0..6_300.0).contains(&d), "got {d}");
        assert!(haversine_m(TOKYO, TOKYO).abs() < f64::EPSILON);
    }

    #[test]
    fn nearest_orders_by_distance_and_respects_radius() {
        let stations = vec![
            station(1, Some(north_of(TOKYO, 800.0))),
            station(2, Some(north_of(TOKYO, 200.0))),
            station(3, Some(north_of(TOKYO, 1_500.0))),
            station(4, Some(SHINJUKU)),
        ];
        let index = GeoIndex::build(&stations, &[]);

        let hits = index.nearest_within(UnitKind::Station, TOKYO, 1_000.0, 10);
        let ids: Vec<i64> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!((hits[0].distance_m - 200.0).abs() < 1.0);
    }

    #[test]
    fn limit_caps_results() {
        let stations: Vec<Station> = (1..=5_i32)
            .map(|i| station(i64::from(i), Some(north_of(TOKYO, f64::from(i) * 100.0))))
            .collect();
        let index = GeoIndex::build(&stations, &[]);
        let hits = index.nearest_within(UnitKind::Station, TOKYO, 10_000.0, 2);
        assert_eq!(hits.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn distance_ties_break_by_id() {
        let p = north_of(TOKYO, 300.0);
        let stations = vec![station(9, Some(p)), station(3, Some(p)), station(5, Some(p))];
        let index = GeoIndex::build(&stations, &[]);
        let ids: Vec<i64> = index
            .nearest_within(UnitKind::Station, TOKYO, 1_000.0, 10)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![3, 5, 9]);
    }

    #[test]
    fn units_without_coordinates_are_excluded() {
        let stations = vec![station(1, None), station(2, Some(TOKYO))];
        let index = GeoIndex::build(&stations, &[]);
        assert_eq!(index.len(UnitKind::Station), 1);
        let hits = index.nearest_within(UnitKind::Station, TOKYO, 100.0, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn kinds_are_separate_namespaces() {
        let index = GeoIndex::build(&[station(1, Some(TOKYO))], &[area(1, SHINJUKU)]);
        assert!(index.nearest_within(UnitKind::Area, TOKYO, 1_000.0, 10).is_empty());
        assert_eq!(index.nearest_within(UnitKind::Area, SHINJUKU, 10.0, 10).len(), 1);
    }

    #[test]
    fn invalid_queries_return_nothing() {
        let index = GeoIndex::build(&[station(1, Some(TOKYO))], &[]);
        assert!(index.nearest_within(UnitKind::Station, TOKYO, -1.0, 10).is_empty());
        assert!(index.nearest_within(UnitKind::Station, TOKYO, f64::NAN, 10).is_empty());
        assert!(index
            .nearest_within(UnitKind::Station, LatLng::new(100.0, 0.0), 1_000.0, 10)
            .is_empty());
    }

    #[tokio::test]
    async fn proximity_source_uses_index() {
        let index = GeoIndex::build(&[], &[area(7, north_of(TOKYO, 400.0))]);
        let hits = index.nearest_areas(TOKYO, 500.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 7);
        assert!(index.nearest_stations(TOKYO, 500.0).await.unwrap().is_empty());
    }
}

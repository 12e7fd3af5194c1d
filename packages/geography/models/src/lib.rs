#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geographic unit types for the safety map.
//!
//! A geographic unit is either a [`Station`] or an [`Area`] (町丁目). Both
//! carry a stable numeric ID, a display name, a URL slug, an optional point
//! coordinate, and membership in exactly one [`Municipality`].

pub mod municipality;

pub use municipality::{Municipality, MunicipalityKind};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl LatLng {
    /// Creates a new coordinate.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite and within WGS84 bounds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// The two concrete geographic unit variants.
///
/// Station and area slugs live in separate namespaces.
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
pub enum UnitKind {
    /// A rail station.
    Station,
    /// An administrative sub-area (町丁目).
    Area,
}

/// A typed reference to a geographic unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct UnitRef {
    /// Which namespace the ID belongs to.
    pub kind: UnitKind,
    /// Stable identifier within that namespace.
    pub id: i64,
}

impl UnitRef {
    /// Reference to a station.
    #[must_use]
    pub const fn station(id: i64) -> Self {
        Self {
            kind: UnitKind::Station,
            id,
        }
    }

    /// Reference to an area.
    #[must_use]
    pub const fn area(id: i64) -> Self {
        Self {
            kind: UnitKind::Area,
            id,
        }
    }
}

/// A rail station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Stable station ID.
    pub id: i64,
    /// Display name (e.g. "新宿").
    pub name: String,
    /// URL slug. Immutable once published.
    pub slug: String,
    /// Station coordinate, if known.
    pub location: Option<LatLng>,
    /// Municipality the station belongs to.
    pub municipality: Municipality,
    /// Names of the rail lines serving the station.
    pub lines: Vec<String>,
}

impl Station {
    /// Typed reference to this station.
    #[must_use]
    pub const fn unit_ref(&self) -> UnitRef {
        UnitRef::station(self.id)
    }
}

/// An administrative sub-area (町丁目).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// Stable area ID.
    pub id: i64,
    /// Normalised display name including the municipality prefix
    /// (e.g. "新宿区西新宿2丁目").
    pub name: String,
    /// URL slug. Immutable once published.
    pub slug: String,
    /// Representative point, if known. Usually the polygon centroid.
    pub location: Option<LatLng>,
    /// Municipality the area belongs to.
    pub municipality: Municipality,
    /// Boundary polygon as a `GeoJSON` geometry string, used for map
    /// rendering.
    pub boundary_geojson: Option<String>,
}

impl Area {
    /// Typed reference to this area.
    #[must_use]
    pub const fn unit_ref(&self) -> UnitRef {
        UnitRef::area(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lat_lng_validity() {
        assert!(LatLng::new(35.6896, 139.7006).is_valid());
        assert!(!LatLng::new(91.0, 139.0).is_valid());
        assert!(!LatLng::new(f64::NAN, 139.0).is_valid());
    }

    #[test]
    fn unit_refs_order_by_kind_then_id() {
        let mut refs = vec![UnitRef::area(1), UnitRef::station(5), UnitRef::station(2)];
        refs.sort();
        assert_eq!(
            refs,
            vec![UnitRef::station(2), UnitRef::station(5), UnitRef::area(1)]
        );
    }

    #[test]
    fn unit_kind_string_form() {
        assert_eq!(UnitKind::Station.to_string(), "station");
        assert_eq!("area".parse::<UnitKind>().ok(), Some(UnitKind::Area));
    }
}

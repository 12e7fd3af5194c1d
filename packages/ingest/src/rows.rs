//! CSV row shapes and their validation into domain types.

use safety_map_crime_models::{CrimeRecord, RawCrimeCounts, RecordSubject};
use safety_map_geography_models::{Area, LatLng, Municipality, Station};
use safety_map_spatial::boundary::parse_geojson_to_multipolygon;
use serde::Deserialize;

/// Separator between line names in the `lines` column.
pub const LINE_SEPARATOR: char = '|';

/// `id,name,slug,lat,lng,municipality_code,lines`
#[derive(Debug, Clone, Deserialize)]
pub struct StationRow {
    /// Station ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// URL slug.
    pub slug: String,
    /// Latitude, empty if unknown.
    pub lat: Option<f64>,
    /// Longitude, empty if unknown.
    pub lng: Option<f64>,
    /// JIS municipality code.
    pub municipality_code: u32,
    /// `|`-separated line names.
    pub lines: Option<String>,
}

/// `id,name,slug,lat,lng,municipality_code,boundary_geojson`
///
/// `municipality_code` may be empty when the name carries the
/// municipality prefix (e.g. `新宿区西新宿一丁目`).
#[derive(Debug, Clone, Deserialize)]
pub struct AreaRow {
    /// Area ID.
    pub id: i64,
    /// Normalised name, usually with the municipality prefix.
    pub name: String,
    /// URL slug.
    pub slug: String,
    /// Latitude of the representative point.
    pub lat: Option<f64>,
    /// Longitude of the representative point.
    pub lng: Option<f64>,
    /// JIS municipality code.
    pub municipality_code: Option<u32>,
    /// Polygon or MultiPolygon geometry.
    pub boundary_geojson: Option<String>,
}

/// `area_id,year,total,violent,assault,theft,intellectual,other`
#[derive(Debug, Clone, Deserialize)]
pub struct AreaCrimeRow {
    /// Area the counts belong to.
    pub area_id: i64,
    /// Reporting year.
    pub year: i32,
    /// Reported total.
    pub total: i64,
    /// 凶悪犯
    pub violent: i64,
    /// 粗暴犯
    pub assault: i64,
    /// 窃盗犯
    pub theft: i64,
    /// 知能犯
    pub intellectual: i64,
    /// その他
    pub other: i64,
}

/// `municipality_code,year,total,violent,assault,theft,intellectual,other`
#[derive(Debug, Clone, Deserialize)]
pub struct MunicipalityCrimeRow {
    /// JIS municipality code.
    pub municipality_code: u32,
    /// Reporting year.
    pub year: i32,
    /// Reported total.
    pub total: i64,
    /// 凶悪犯
    pub violent: i64,
    /// 粗暴犯
    pub assault: i64,
    /// 窃盗犯
    pub theft: i64,
    /// 知能犯
    pub intellectual: i64,
    /// その他
    pub other: i64,
}

macro_rules! raw_counts {
    ($row:expr) => {
        RawCrimeCounts {
            total: $row.total,
            violent: $row.violent,
            assault: $row.assault,
            theft: $row.theft,
            intellectual: $row.intellectual,
            other: $row.other,
        }
    };
}

impl StationRow {
    /// Validates the row into a [`Station`].
    ///
    /// # Errors
    ///
    /// Returns the rejection reason.
    pub fn into_station(self) -> Result<Station, String> {
        let name = required("name", self.name)?;
        let slug = slug(self.slug)?;
        let municipality = Municipality::from_code(self.municipality_code)
            .ok_or_else(|| format!("unknown municipality code {}", self.municipality_code))?;
        let location = location(self.lat, self.lng)?;

        let mut lines: Vec<String> = Vec::new();
        for line in self
            .lines
            .as_deref()
            .unwrap_or_default()
            .split(LINE_SEPARATOR)
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            if !lines.iter().any(|l| l == line) {
                lines.push(line.to_string());
            }
        }

        Ok(Station {
            id: self.id,
            name,
            slug,
            location,
            municipality,
            lines,
        })
    }
}

impl AreaRow {
    /// Validates the row into an [`Area`].
    ///
    /// # Errors
    ///
    /// Returns the rejection reason.
    pub fn into_area(self) -> Result<Area, String> {
        let name = required("name", self.name)?;
        let slug = slug(self.slug)?;
        let municipality = match self.municipality_code {
            Some(code) => Municipality::from_code(code)
                .ok_or_else(|| format!("unknown municipality code {code}"))?,
            None => Municipality::from_area_name(&name).ok_or_else(|| {
                format!("municipality_code is empty and {name:?} has no municipality prefix")
            })?,
        };
        let location = location(self.lat, self.lng)?;

        let boundary_geojson = match self.boundary_geojson.map(|b| b.trim().to_string()) {
            Some(b) if b.is_empty() => None,
            Some(b) => {
                if parse_geojson_to_multipolygon(&b).is_none() {
                    return Err("boundary_geojson is not a Polygon or MultiPolygon".to_string());
                }
                Some(b)
            }
            None => None,
        };

        Ok(Area {
            id: self.id,
            name,
            slug,
            location,
            municipality,
            boundary_geojson,
        })
    }
}

impl AreaCrimeRow {
    /// Validates the row into an area-level [`CrimeRecord`]. `municipality`
    /// is the area's municipality, or `None` if the area is unknown.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason.
    pub fn into_record(self, municipality: Option<Municipality>) -> Result<CrimeRecord, String> {
        let municipality = municipality.ok_or_else(|| format!("unknown area {}", self.area_id))?;
        if !municipality.publishes_area_data() {
            return Err(format!(
                "area {} is in {}, which only publishes municipality totals",
                self.area_id,
                municipality.name()
            ));
        }
        CrimeRecord::new(RecordSubject::Area(self.area_id), self.year, &raw_counts!(self))
            .map_err(|e| e.to_string())
    }
}

impl MunicipalityCrimeRow {
    /// Validates the row into a municipality-level [`CrimeRecord`].
    ///
    /// # Errors
    ///
    /// Returns the rejection reason.
    pub fn into_record(self) -> Result<CrimeRecord, String> {
        let municipality = Municipality::from_code(self.municipality_code)
            .ok_or_else(|| format!("unknown municipality code {}", self.municipality_code))?;
        if municipality.publishes_area_data() {
            return Err(format!(
                "{} publishes area-level data; municipality totals are derived from its areas",
                municipality.name()
            ));
        }
        CrimeRecord::new(
            RecordSubject::Municipality(municipality),
            self.year,
            &raw_counts!(self),
        )
        .map_err(|e| e.to_string())
    }
}

fn required(field: &str, value: String) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{field} is empty"));
    }
    Ok(trimmed.to_string())
}

fn slug(value: String) -> Result<String, String> {
    let slug = required("slug", value)?;
    if slug.contains(|c: char| c.is_whitespace() || c == '/') {
        return Err(format!("slug {slug:?} contains whitespace or '/'"));
    }
    Ok(slug)
}

fn location(lat: Option<f64>, lng: Option<f64>) -> Result<Option<LatLng>, String> {
    match (lat, lng) {
        (None, None) => Ok(None),
        (Some(lat), Some(lng)) => {
            let point = LatLng::new(lat, lng);
            if point.is_valid() {
                Ok(Some(point))
            } else {
                Err(format!("coordinate ({lat}, {lng}) is out of range"))
            }
        }
        _ => Err("lat and lng must both be present or both be empty".to_string()),
    }
}

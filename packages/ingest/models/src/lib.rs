#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion dataset and result types.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A CSV dataset the ingester understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Dataset {
    /// `id,name,slug,lat,lng,municipality_code,lines`
    Stations,
    /// `id,name,slug,lat,lng,municipality_code,boundary_geojson`
    Areas,
    /// `area_id,year,total,violent,assault,theft,intellectual,other`
    AreaCrimes,
    /// `municipality_code,year,total,violent,assault,theft,intellectual,other`
    MunicipalityCrimes,
}

impl Dataset {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Stations,
            Self::Areas,
            Self::AreaCrimes,
            Self::MunicipalityCrimes,
        ]
    }
}

/// A row that failed validation and was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// 1-based line number in the input file.
    pub line: u64,
    /// Why the row was rejected.
    pub reason: String,
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Which dataset was ingested.
    pub dataset: Dataset,
    /// Rows stored.
    pub accepted: u64,
    /// Rows rejected, in file order.
    pub rejected: Vec<Rejection>,
}

impl IngestReport {
    /// Whether every row was accepted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

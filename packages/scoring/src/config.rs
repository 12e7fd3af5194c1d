//! Scoring and query configuration.
//!
//! Every field has a default matching the deployed behaviour, so an empty
//! TOML file (or no file at all) is a valid configuration. The target year
//! and population are deliberately not part of this struct: they are passed
//! to each computation as a [`safety_map_scoring_models::ScoreTarget`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ScoringError;

/// What a station's figure becomes when no area with a crime record lies
/// inside its catchment radius.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyCatchment {
    /// No figure: the station gets a null score and rank.
    #[default]
    Unscored,
    /// Use the containing municipality's figure, flagged with
    /// municipality granularity.
    MunicipalityFallback,
}

/// Tunables for aggregation, proximity queries, and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Radius around a station whose areas form its catchment.
    pub catchment_radius_m: f64,
    /// Upper bound on a single proximity query during aggregation.
    pub spatial_timeout_ms: u64,
    /// Behaviour for stations with an empty catchment.
    pub empty_catchment: EmptyCatchment,
    /// Default radius for "areas near this station".
    pub nearby_areas_radius_m: f64,
    /// Default radius for "stations near this area".
    pub nearby_stations_radius_m: f64,
    /// Features per page of the choropleth export.
    pub export_page_size: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            catchment_radius_m: 1_000.0,
            spatial_timeout_ms: 2_000,
            empty_catchment: EmptyCatchment::Unscored,
            nearby_areas_radius_m: 500.0,
            nearby_stations_radius_m: 1_000.0,
            export_page_size: 1_000,
        }
    }
}

impl ScoringConfig {
    /// The proximity query timeout as a [`Duration`].
    #[must_use]
    pub const fn spatial_timeout(&self) -> Duration {
        Duration::from_millis(self.spatial_timeout_ms)
    }

    /// Parses a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Config`] if the TOML is malformed or a value
    /// has the wrong type, and [`ScoringError::InvalidConfig`] if a value is
    /// out of range.
    pub fn from_toml_str(s: &str) -> Result<Self, ScoringError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ScoringError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded scoring config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<(), ScoringError> {
        let radii = [
            ("catchment_radius_m", self.catchment_radius_m),
            ("nearby_areas_radius_m", self.nearby_areas_radius_m),
            ("nearby_stations_radius_m", self.nearby_stations_radius_m),
        ];
        for (key, value) in radii {
            if !value.is_finite() || value <= 0.0 {
                return Err(ScoringError::InvalidConfig {
                    message: format!("{key} must be a positive number of meters, got {value}"),
                });
            }
        }
        if self.spatial_timeout_ms == 0 {
            return Err(ScoringError::InvalidConfig {
                message: "spatial_timeout_ms must be at least 1".to_string(),
            });
        }
        if self.export_page_size == 0 {
            return Err(ScoringError::InvalidConfig {
                message: "export_page_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(ScoringConfig::from_toml_str("").unwrap(), ScoringConfig::default());
    }

    #[test]
    fn partial_override() {
        let config = ScoringConfig::from_toml_str(
            "catchment_radius_m = 800.0\nempty_catchment = \"municipality_fallback\"\n",
        )
        .unwrap();
        assert!((config.catchment_radius_m - 800.0).abs() < f64::EPSILON);
        assert_eq!(config.empty_catchment, EmptyCatchment::MunicipalityFallback);
        assert_eq!(config.spatial_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn wrong_type_is_rejected() {
        assert!(matches!(
            ScoringConfig::from_toml_str("catchment_radius_m = \"far\""),
            Err(ScoringError::Config(_))
        ));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(
            ScoringConfig::from_toml_str("catchment_radius_m = -5.0"),
            Err(ScoringError::InvalidConfig { .. })
        ));
        assert!(matches!(
            ScoringConfig::from_toml_str("export_page_size = 0"),
            Err(ScoringError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn zero_spatial_timeout_is_rejected() {
        let err = ScoringConfig::from_toml_str("spatial_timeout_ms = 0").unwrap_err();
        assert!(err.to_string().contains("spatial_timeout_ms"));
        assert_eq!(
            ScoringConfig::from_toml_str("spatial_timeout_ms = 1")
                .unwrap()
                .spatial_timeout(),
            Duration::from_millis(1)
        );
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety score engine.
//!
//! Turns validated crime records into deviation scores and dense ranks for
//! two independent populations (stations and areas) per year, resolving
//! each unit's figure from the finest granularity available.

pub mod aggregate;
pub mod config;
pub mod deviation;
pub mod progress;
pub mod rank;
pub mod recompute;
pub mod trend;

pub use config::{EmptyCatchment, ScoringConfig};
pub use recompute::{ScoringInputs, compute_population, recompute, score_population};

use safety_map_spatial::SpatialError;

/// Errors that can occur while scoring.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    /// A proximity query failed.
    #[error("Spatial query error: {0}")]
    Spatial(#[from] SpatialError),

    /// Config TOML could not be parsed.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Config values are out of range.
    #[error("Invalid config: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

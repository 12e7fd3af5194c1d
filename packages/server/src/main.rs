#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety map API server binary.
//!
//! Reads the store path from `SAFETY_MAP_DB` and an optional scoring config
//! from `SAFETY_MAP_CONFIG`.

use std::path::PathBuf;

use safety_map_scoring::ScoringConfig;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = match std::env::var_os("SAFETY_MAP_CONFIG") {
        Some(path) => ScoringConfig::load(&PathBuf::from(path))?,
        None => ScoringConfig::default(),
    };

    safety_map_server::run_server(&safety_map_database::paths::db_path(), config).await?;
    Ok(())
}

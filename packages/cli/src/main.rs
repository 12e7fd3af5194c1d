#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Operator CLI for the safety map toolchain.
//!
//! One binary covers the whole batch lifecycle: ingest CSV inputs, mark
//! partial reporting years, recompute scores, export the choropleth, probe
//! proximity, and serve the read model.
//!
//! Uses `indicatif-log-bridge` (via [`safety_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod score;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use safety_map_cli_utils::{IndicatifProgress, MultiProgress};
use safety_map_crime_models::PartialYear;
use safety_map_database::crimes::{clear_partial_year, set_partial_year};
use safety_map_database::paths;
use safety_map_database::queries::scores_for_units;
use safety_map_database::scores::latest_year;
use safety_map_database::units::{load_areas, load_stations};
use safety_map_geography_models::{LatLng, UnitKind};
use safety_map_ingest_models::Dataset;
use safety_map_scoring::ScoringConfig;
use safety_map_scoring_models::{PopulationKind, ScoreTarget};
use safety_map_spatial::GeoIndex;

/// Safety score toolchain.
#[derive(Parser)]
#[command(name = "safety_map")]
#[command(about = "Ingest crime data, compute safety scores, and serve them")]
struct Cli {
    /// Path to the `DuckDB` store (default: `$SAFETY_MAP_DB` or
    /// `data/safety_map.duckdb`).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Scoring config TOML. Every field is optional.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV file into the store, reporting rejected rows.
    Ingest {
        /// stations, areas, area-crimes, or municipality-crimes.
        dataset: Dataset,
        /// CSV file to read.
        path: PathBuf,
    },

    /// Mark a reporting year as partial, or clear the mark.
    PartialYear {
        /// Year to mark.
        #[arg(long)]
        year: i32,
        /// Last month included in the year's figures (1-11).
        #[arg(long, required_unless_present = "clear", conflicts_with = "clear")]
        cutoff_month: Option<u8>,
        /// Remove the partial mark.
        #[arg(long)]
        clear: bool,
    },

    /// Recompute and publish safety scores.
    Score {
        /// Year to score. Repeatable. Defaults to every year with records.
        #[arg(long = "year")]
        years: Vec<i32>,
        /// station or area. Repeatable. Defaults to both.
        #[arg(long = "population")]
        populations: Vec<PopulationKind>,
    },

    /// Write every area's score as a `GeoJSON` `FeatureCollection`.
    ExportGeojson {
        /// Score year. Defaults to the latest published area year.
        #[arg(long)]
        year: Option<i32>,
        /// Output file (default: `data/generated/area_scores.geojson`).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Areas per page. Defaults to the config's `export_page_size`.
        #[arg(long)]
        page_size: Option<u64>,
    },

    /// List the units nearest a coordinate with their latest score.
    Nearby {
        /// Latitude in degrees.
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in degrees.
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// station or area.
        #[arg(long, default_value = "area")]
        kind: UnitKind,
        /// Search radius in meters. Defaults to the config's nearby radius
        /// for `kind`.
        #[arg(long)]
        radius_m: Option<f64>,
        /// Maximum number of results.
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Start the HTTP read-model server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = safety_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let db_path = cli.db.unwrap_or_else(paths::db_path);
    let config = match &cli.config {
        Some(path) => ScoringConfig::load(path)?,
        None => ScoringConfig::default(),
    };

    match cli.command {
        Commands::Ingest { dataset, path } => ingest(&db_path, dataset, &path)?,
        Commands::PartialYear {
            year,
            cutoff_month,
            clear,
        } => partial_year(&db_path, year, cutoff_month, clear)?,
        Commands::Score { years, populations } => {
            score(&multi, &db_path, &config, &years, &populations).await?;
        }
        Commands::ExportGeojson {
            year,
            output,
            page_size,
        } => {
            let output = output.unwrap_or_else(safety_map_generate::default_output_path);
            let page_size = page_size.unwrap_or(config.export_page_size as u64);
            export(&multi, &db_path, year, page_size, &output)?;
        }
        Commands::Nearby {
            lat,
            lng,
            kind,
            radius_m,
            limit,
        } => {
            let radius_m = radius_m.unwrap_or(match kind {
                UnitKind::Area => config.nearby_areas_radius_m,
                UnitKind::Station => config.nearby_stations_radius_m,
            });
            nearby(&db_path, LatLng::new(lat, lng), kind, radius_m, limit)?;
        }
        Commands::Serve => {
            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new()
                    .block_on(safety_map_server::run_server(&db_path, config))
            })
            .await??;
        }
    }

    Ok(())
}

fn ingest(db_path: &Path, dataset: Dataset, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let conn = safety_map_database::open(db_path)?;
    let report = safety_map_ingest::ingest_file(&conn, dataset, path)?;

    if report.is_clean() {
        println!("{}: {} rows stored", report.dataset, report.accepted);
        return Ok(());
    }

    println!(
        "{}: {} rows stored, {} rejected (not stored):",
        report.dataset,
        report.accepted,
        report.rejected.len()
    );
    for rejection in &report.rejected {
        println!("  line {}: {}", rejection.line, rejection.reason);
    }
    Ok(())
}

fn partial_year(
    db_path: &Path,
    year: i32,
    cutoff_month: Option<u8>,
    clear: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let conn = safety_map_database::open(db_path)?;
    match cutoff_month {
        Some(month) if !clear => {
            set_partial_year(&conn, PartialYear::new(year, month)?)?;
            println!("{year} marked partial through month {month}");
        }
        _ => {
            clear_partial_year(&conn, year)?;
            println!("{year} marked complete");
        }
    }
    println!("Run `safety_map score --year {year}` to republish its scores");
    Ok(())
}

async fn score(
    multi: &MultiProgress,
    db_path: &Path,
    config: &ScoringConfig,
    years: &[i32],
    populations: &[PopulationKind],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = safety_map_database::open(db_path)?;
    let progress = IndicatifProgress::populations_bar(multi, "Scoring", 0);

    let published = score::run(&mut conn, config, years, populations, progress.as_ref()).await?;

    for population in &published {
        println!(
            "{:<14} {:<12} {} scored of {}",
            population.target.to_string(),
            population.status.label(),
            population.status.ranked_size(),
            population.scores.len()
        );
    }
    Ok(())
}

fn export(
    multi: &MultiProgress,
    db_path: &Path,
    year: Option<i32>,
    page_size: u64,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let conn = safety_map_database::open_read_only(db_path)?;
    let progress = IndicatifProgress::rows_bar(multi, "Exporting areas");

    let summary =
        safety_map_generate::export_geojson(&conn, year, page_size, output, progress.as_ref())?;

    progress.finish(format!("{} areas exported", summary.features));
    println!(
        "Wrote {} features for {} to {}",
        summary.features,
        summary.year,
        summary.path.display()
    );
    Ok(())
}

fn nearby(
    db_path: &Path,
    origin: LatLng,
    kind: UnitKind,
    radius_m: f64,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if !origin.is_valid() {
        return Err(format!("invalid coordinate {}, {}", origin.lat, origin.lng).into());
    }

    let conn = safety_map_database::open_read_only(db_path)?;
    let stations = load_stations(&conn)?;
    let areas = load_areas(&conn)?;
    let index = GeoIndex::build(&stations, &areas);

    let hits = index.nearest_within(kind, origin, radius_m, limit);
    if hits.is_empty() {
        println!("No {kind} within {radius_m} m");
        return Ok(());
    }

    let population = match kind {
        UnitKind::Station => PopulationKind::Station,
        UnitKind::Area => PopulationKind::Area,
    };
    let year = latest_year(&conn, population)?;
    let ids: Vec<i64> = hits.iter().map(|hit| hit.id).collect();
    let scores = match year {
        Some(year) => scores_for_units(&conn, kind, year, &ids)?,
        None => BTreeMap::new(),
    };

    let names: BTreeMap<i64, &str> = match kind {
        UnitKind::Station => stations.iter().map(|s| (s.id, s.name.as_str())).collect(),
        UnitKind::Area => areas.iter().map(|a| (a.id, a.name.as_str())).collect(),
    };

    if let Some(year) = year {
        println!("{} nearest {kind} ({})", hits.len(), ScoreTarget::new(year, population));
    }
    for hit in &hits {
        let score = scores.get(&hit.id);
        println!(
            "{:>7.0} m  {:<24} score {:>6}  rank {:>5}",
            hit.distance_m,
            names.get(&hit.id).copied().unwrap_or("?"),
            score
                .and_then(|s| s.score)
                .map_or_else(|| "-".to_string(), |s| format!("{s:.1}")),
            score
                .and_then(|s| s.rank)
                .map_or_else(|| "-".to_string(), |r| r.to_string()),
        );
    }
    Ok(())
}

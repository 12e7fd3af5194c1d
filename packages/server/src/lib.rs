#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the safety map.
//!
//! Serves the published read model: unit score series with year-over-year
//! trends, rankings, municipality statistics, rail line summaries,
//! proximity lookups, and the paginated choropleth collection. The store is
//! opened read-only; scores are published by the CLI.

mod handlers;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use safety_map_database::DbError;
use safety_map_database::units::{load_areas, load_stations};
use safety_map_geography_models::{Area, Station};
use safety_map_scoring::ScoringConfig;
use safety_map_spatial::GeoIndex;

/// Number of pooled read-only connections.
pub const POOL_SIZE: usize = 4;

/// Errors that can stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The store could not be opened or read.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// The HTTP server failed to bind or run.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Simple round-robin pool of `DuckDB` connections.
///
/// `duckdb::Connection` is `Send` but not `Sync`, so each connection is
/// wrapped in a `Mutex`. All connections are clones of one database
/// handle and hand out round-robin via an atomic counter.
pub struct DuckDbPool {
    connections: Vec<Mutex<duckdb::Connection>>,
    next: AtomicUsize,
}

impl DuckDbPool {
    /// Opens `size` read-only connections to the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be opened.
    pub fn open(path: &Path, size: usize) -> Result<Self, DbError> {
        let conn = safety_map_database::open_read_only(path)?;
        Self::from_connection(conn, size)
    }

    /// Builds a pool of `size` clones of `conn`, at least one.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a connection cannot be cloned.
    pub fn from_connection(conn: duckdb::Connection, size: usize) -> Result<Self, DbError> {
        let mut connections = Vec::with_capacity(size.max(1));
        for _ in 1..size {
            connections.push(Mutex::new(conn.try_clone()?));
        }
        connections.push(Mutex::new(conn));
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Acquires the next connection from the pool (round-robin).
    ///
    /// Poisoned locks are recovered since pooled connections only read.
    pub fn acquire(&self) -> MutexGuard<'_, duckdb::Connection> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared application state.
pub struct AppState {
    /// Read-only store connections.
    pub pool: DuckDbPool,
    /// Proximity index over every station and area.
    pub geo: GeoIndex,
    /// Stations by ID, for naming proximity results.
    pub stations: BTreeMap<i64, Station>,
    /// Areas by ID, for naming proximity results.
    pub areas: BTreeMap<i64, Area>,
    /// Radii and page sizes.
    pub config: ScoringConfig,
}

impl AppState {
    /// Loads the unit reference data from the pool and builds the geo
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the units cannot be read.
    pub fn load(pool: DuckDbPool, config: ScoringConfig) -> Result<Self, DbError> {
        let (stations, areas) = {
            let conn = pool.acquire();
            (load_stations(&conn)?, load_areas(&conn)?)
        };
        let geo = GeoIndex::build(&stations, &areas);

        Ok(Self {
            pool,
            geo,
            stations: stations.into_iter().map(|s| (s.id, s)).collect(),
            areas: areas.into_iter().map(|a| (a.id, a)).collect(),
            config,
        })
    }
}

/// Registers every API route under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/municipalities", web::get().to(handlers::municipalities))
            .route(
                "/municipalities/{slug}/stats",
                web::get().to(handlers::municipality_stats),
            )
            .route(
                "/municipalities/{slug}/units",
                web::get().to(handlers::municipality_units),
            )
            .route("/stations/{slug}", web::get().to(handlers::station))
            .route(
                "/stations/{slug}/nearby-areas",
                web::get().to(handlers::nearby_areas),
            )
            .route("/areas/geojson", web::get().to(handlers::areas_geojson))
            .route("/areas/{slug}", web::get().to(handlers::area))
            .route(
                "/areas/{slug}/nearby-stations",
                web::get().to(handlers::nearby_stations),
            )
            .route("/rankings/safest", web::get().to(handlers::safest))
            .route("/rankings/least-safe", web::get().to(handlers::least_safe))
            .route("/lines", web::get().to(handlers::lines)),
    );
}

/// Starts the safety map API server.
///
/// Opens the store read-only at `db_path`, loads the geo index, and runs
/// the HTTP server on `BIND_ADDR`:`PORT` (default `127.0.0.1:8080`). The
/// caller provides the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns [`ServerError`] if the store cannot be opened or the server
/// fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server(db_path: &Path, config: ScoringConfig) -> Result<(), ServerError> {
    log::info!("Opening store at {}...", db_path.display());
    let pool = DuckDbPool::open(db_path, POOL_SIZE)?;

    log::info!("Loading units...");
    let state = web::Data::new(AppState::load(pool, config)?);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await?;

    Ok(())
}

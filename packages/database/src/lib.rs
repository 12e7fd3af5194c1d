#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` storage for the safety map.
//!
//! Holds the unit reference data, validated crime records, and the
//! published score read model. A population's scores are replaced inside a
//! single transaction so readers never see a half-published year.

pub mod crimes;
pub mod paths;
pub mod queries;
pub mod scores;
pub mod store;
pub mod units;

pub use store::{open, open_default, open_in_memory, open_read_only};

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

impl DbError {
    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }
}

/// Converts an unsigned count to the signed `BIGINT` `DuckDB` stores.
pub(crate) fn to_i64(value: u64, what: &str) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::conversion(format!("{what} out of range: {value}")))
}

/// Reads a stored `BIGINT` back as an unsigned count.
pub(crate) fn to_u64(value: i64, what: &str) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::conversion(format!("negative {what}: {value}")))
}

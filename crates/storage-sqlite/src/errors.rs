//! Storage-specific error types for SQLite operations.
//!
//! This module provides error types that wrap Diesel-specific errors and convert
//! them to the cache error of `finfetch_market_data`.

use diesel::result::Error as DieselError;
use finfetch_market_data::MarketDataError;
use thiserror::Error;

/// Storage-specific errors that wrap Diesel and r2d2 types.
///
/// These errors stay inside the storage layer and are converted to
/// [`MarketDataError::Cache`] before being returned through `FreshnessStore`.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Writer actor unavailable: {0}")]
    WriterUnavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for MarketDataError {
    fn from(err: StorageError) -> Self {
        MarketDataError::Cache(err.to_string())
    }
}

/// Extension trait for converting storage results at the `FreshnessStore` boundary.
pub trait IntoMarketData<T> {
    fn into_market_data(self) -> std::result::Result<T, MarketDataError>;
}

impl<T, E> IntoMarketData<T> for std::result::Result<T, E>
where
    E: Into<StorageError>,
{
    fn into_market_data(self) -> std::result::Result<T, MarketDataError> {
        self.map_err(|e| e.into().into())
    }
}

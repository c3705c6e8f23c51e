//! SQLite storage implementation for the freshness cache.

mod model;
mod repository;

#[cfg(test)]
mod repository_tests;

use std::sync::Arc;

use finfetch_market_data::{CacheConfig, MarketDataError, MemoryFreshnessStore};

pub use model::{IndicatorSnapshotDB, PriceHistoryDB};
pub use repository::SqliteFreshnessStore;

// Re-export trait from market-data for convenience
pub use finfetch_market_data::FreshnessStore;

/// Store for `config`: SQLite when a path is configured, in-memory otherwise.
pub fn open_store(config: &CacheConfig) -> Result<Arc<dyn FreshnessStore>, MarketDataError> {
    match &config.path {
        Some(path) => Ok(Arc::new(SqliteFreshnessStore::open(path)?)),
        None => Ok(Arc::new(MemoryFreshnessStore::new())),
    }
}

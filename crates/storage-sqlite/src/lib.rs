//! SQLite storage implementation for finfetch.
//!
//! This crate provides the persisted freshness cache using Diesel ORM with SQLite.
//! It implements the `FreshnessStore` trait defined in `finfetch-market-data` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - The snapshot and history repository
//! - Database-specific model types (with Diesel derives)
//!
//! # Architecture
//!
//! This crate is the only place in the workspace where Diesel dependencies exist.
//! The market-data crate is database-agnostic and works with the trait.
//!
//! ```text
//!        market-data (pipeline)
//!                  │
//!                  ▼
//!          storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod cache;
pub mod db;
pub mod errors;
pub mod schema;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoMarketData, StorageError};

pub use cache::{open_store, SqliteFreshnessStore};

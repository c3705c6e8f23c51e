//! Finfetch Market Data Crate
//!
//! Cache-aware, admission-controlled fetching of financial instrument
//! attributes from several external sources.
//!
//! # Overview
//!
//! The crate supports:
//! - Normalized requests: identifiers, attribute aliases, periods and intervals
//! - Routing of identifiers to a general provider or to domestic exchange sources
//! - A tiered-TTL freshness cache with history rows for date ranges
//! - Scheduling under per-source concurrency, a global memory budget, an optional
//!   CPU guard and per-source rate limits, with timeouts and jittered retries
//! - Deterministic aggregation into a table in the caller's original order
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |   FetchRequest   | --> |    Classifier    |  (format rules + remap table)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | FreshnessStore   |  (tiered TTL, history rows)
//!                          +------------------+
//!                                  | misses
//!                                  v
//!                          +------------------+
//!                          |   TaskBuilder    |  (batched / one per instrument)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    Scheduler     |  (slots, memory, load, rate)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |   Aggregator     |  (caller order, failures)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |   ResultTable    |
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`FetchRequest`] - Normalized request built with [`FetchRequest::builder`]
//! - [`SourceVariant`] - Which external source serves an instrument
//! - [`IndicatorRecord`] - Fetched payload, serialized through [`FIELD_TABLE`]
//! - [`FetchTask`] - Unit of scheduling work
//! - [`FetchManager`] - Runs the whole pipeline and returns a [`FetchReport`]
//! - [`SourceFetcher`] - Blocking adapter implemented for each external source
//! - [`FreshnessStore`] - Persistence interface of the cache

pub mod aggregator;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod manager;
pub mod models;
pub mod provider;
pub mod scheduler;
pub mod tasks;

#[cfg(test)]
mod manager_tests;

// Re-export all public types from models
pub use models::{
    Attribute, CellValue, DateRange, FetchBatch, FetchRequest, FetchRequestBuilder, FetchTask,
    FieldValue, HistoryPoint, IndicatorRecord, InstrumentRequest, Interval, ListingKind,
    ResultTable, RowKey, SourceVariant, TableColumn, TaskFailure, TaskOutcome, TaskOverrides,
    TaskSuccess, TtlTier, FIELD_TABLE, SNAPSHOT_VERSION,
};

// Re-export error types
pub use errors::{MarketDataError, RetryClass};

// Re-export classifier types
pub use classifier::{
    ClassificationContext, Classifier, JsonRemapSource, RemapSource, RemapTable,
    StaticRemapSource,
};

// Re-export cache types
pub use cache::{
    CacheEntry, CacheLookup, FreshnessStore, MemoryFreshnessStore, TierTimestamps, TtlPolicy,
};

// Re-export configuration
pub use config::{CacheConfig, FetcherConfig, LoadGuardConfig, VariantSettings};

// Re-export pipeline types
pub use aggregator::{Aggregator, InstrumentFailure};
pub use manager::{FetchManager, FetchReport, FetchService};
pub use provider::{FetcherSet, SourceFetcher};
pub use scheduler::{LoadProbe, MemoryBudget, OutcomeObserver, RunReport, Scheduler};
pub use tasks::TaskBuilder;

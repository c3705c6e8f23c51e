//! Fetch pipeline models
//!
//! This module contains the core data types shared by every pipeline stage:
//! - `attribute` - Canonical attributes, alias table and TTL tiers
//! - `request` - Normalized fetch request, date ranges and intervals
//! - `instrument` - Source variants and the per-instrument work item
//! - `record` - Fetched payload and its versioned field table
//! - `task` - Scheduled tasks, fetch containers and terminal outcomes
//! - `table` - Tabular result returned to the caller

mod attribute;
mod instrument;
mod record;
mod request;
mod table;
mod task;

pub use attribute::{Attribute, TtlTier};
pub use instrument::{InstrumentRequest, ListingKind, SourceVariant};
pub use record::{
    descriptor, FieldDescriptor, FieldValue, HistoryPoint, IndicatorRecord, FIELD_TABLE,
    SNAPSHOT_VERSION,
};
pub use request::{
    normalize_identifiers, parse_period, DateRange, FetchRequest, FetchRequestBuilder, Interval,
};
pub use table::{CellValue, ResultTable, RowKey, TableColumn};
pub use task::{FetchBatch, FetchTask, TaskFailure, TaskOutcome, TaskOverrides, TaskSuccess};

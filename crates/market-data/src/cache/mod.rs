//! Freshness cache.
//!
//! - `freshness` - the tiered TTL rule and weekday coverage of history rows
//! - `traits` - the [`FreshnessStore`] interface with shared lookup/write-back semantics
//! - `memory` - an in-process [`FreshnessStore`]

mod freshness;
mod memory;
mod traits;

pub use freshness::{missing_ranges, TierTimestamps, TtlPolicy};
pub use memory::MemoryFreshnessStore;
pub use traits::{CacheEntry, CacheLookup, FreshnessStore};

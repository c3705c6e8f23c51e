//! Freshness store trait.
//!
//! The trait abstracts persistence of instrument snapshots and history rows so
//! the pipeline can run against an in-memory store or a database-backed one.
//! Reads are synchronous, writes are async, matching how stores are usually
//! backed by a connection pool for reads and a single writer for mutations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::warn;

use super::freshness::{missing_ranges, TierTimestamps, TtlPolicy};
use crate::errors::MarketDataError;
use crate::models::{Attribute, DateRange, HistoryPoint, IndicatorRecord};

/// Persisted state for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub snapshot_json: String,
    pub tiers: TierTimestamps,
    pub last_fetched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of a cache lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheLookup {
    pub record: Option<IndicatorRecord>,
    pub fresh: bool,
}

impl CacheLookup {
    pub fn miss() -> Self {
        Self::default()
    }

    /// A fresh record that can be served without fetching.
    pub fn hit(&self) -> Option<&IndicatorRecord> {
        if self.fresh {
            self.record.as_ref()
        } else {
            None
        }
    }
}

/// Storage interface for the freshness cache.
///
/// Implementors provide raw entry and history persistence; lookup and
/// write-back semantics are shared through the provided methods.
#[async_trait]
pub trait FreshnessStore: Send + Sync {
    /// Stored entry for an instrument, if any.
    fn entry(&self, symbol: &str) -> Result<Option<CacheEntry>, MarketDataError>;

    /// Insert or replace the entry for an instrument.
    async fn put_entry(&self, symbol: &str, entry: CacheEntry) -> Result<(), MarketDataError>;

    /// History rows within `[start, end]`, ascending by date.
    fn history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HistoryPoint>, MarketDataError>;

    /// Upsert history rows keyed by `(symbol, date)`. Returns rows written.
    async fn write_history(
        &self,
        symbol: &str,
        points: &[HistoryPoint],
    ) -> Result<usize, MarketDataError>;

    /// Drop entries last fetched before `cutoff` and history dated before it.
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, MarketDataError>;

    /// Point-in-time lookup. Any store or decode error degrades to a miss.
    fn lookup_at(
        &self,
        symbol: &str,
        attributes: &[Attribute],
        policy: &TtlPolicy,
        now: DateTime<Utc>,
    ) -> CacheLookup {
        let entry = match self.entry(symbol) {
            Ok(Some(entry)) => entry,
            Ok(None) => return CacheLookup::miss(),
            Err(e) => {
                warn!("Cache lookup failed for {}: {}", symbol, e);
                return CacheLookup::miss();
            }
        };

        match IndicatorRecord::from_snapshot(&entry.snapshot_json) {
            Ok(record) => CacheLookup {
                fresh: entry.tiers.is_fresh(attributes, now, policy),
                record: Some(record),
            },
            Err(e) => {
                warn!("Discarding unreadable snapshot for {}: {}", symbol, e);
                CacheLookup::miss()
            }
        }
    }

    fn lookup(&self, symbol: &str, attributes: &[Attribute], policy: &TtlPolicy) -> CacheLookup {
        self.lookup_at(symbol, attributes, policy, Utc::now())
    }

    /// Range lookup.
    ///
    /// Fresh when the non-series attributes pass the tier rule, the history
    /// covers every weekday of the range, and each requested series attribute
    /// is present on every stored row. Series attributes are never fresh
    /// without at least one stored row.
    fn lookup_range_at(
        &self,
        symbol: &str,
        attributes: &[Attribute],
        range: DateRange,
        policy: &TtlPolicy,
        now: DateTime<Utc>,
    ) -> CacheLookup {
        let scalars: Vec<Attribute> = attributes.iter().copied().filter(|a| !a.is_series()).collect();
        let series: Vec<Attribute> = attributes.iter().copied().filter(|a| a.is_series()).collect();

        let mut lookup = if scalars.is_empty() {
            // Only history is needed; an absent snapshot is fine.
            match self.entry(symbol) {
                Ok(entry) => CacheLookup {
                    record: entry.and_then(|e| IndicatorRecord::from_snapshot(&e.snapshot_json).ok()),
                    fresh: true,
                },
                Err(e) => {
                    warn!("Cache lookup failed for {}: {}", symbol, e);
                    return CacheLookup::miss();
                }
            }
        } else {
            self.lookup_at(symbol, &scalars, policy, now)
        };

        if !lookup.fresh {
            return lookup;
        }

        let points = match self.history(symbol, range.start, range.end) {
            Ok(points) => points,
            Err(e) => {
                warn!("History lookup failed for {}: {}", symbol, e);
                return CacheLookup::miss();
            }
        };

        let cached_dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
        if !missing_ranges(range, &cached_dates).is_empty() {
            lookup.fresh = false;
            return lookup;
        }

        let mut record = lookup
            .record
            .take()
            .unwrap_or_else(|| IndicatorRecord::new(symbol));
        record.apply_history(&points);

        // Series attributes need at least one stored row; a range without
        // weekdays has nothing to serve from history.
        let complete = series.is_empty()
            || (!points.is_empty() && series.iter().all(|a| !record.get(*a).is_missing()));
        CacheLookup {
            record: Some(record),
            fresh: complete,
        }
    }

    /// Merge `record` into the stored snapshot and advance the tiers of
    /// `fetched` attributes only.
    async fn write_at(
        &self,
        symbol: &str,
        record: &IndicatorRecord,
        fetched: &[Attribute],
        now: DateTime<Utc>,
    ) -> Result<(), MarketDataError> {
        let existing = match self.entry(symbol) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Replacing unreadable cache entry for {}: {}", symbol, e);
                None
            }
        };

        let (mut merged, mut tiers, created_at) = match existing {
            Some(entry) => match IndicatorRecord::from_snapshot(&entry.snapshot_json) {
                Ok(previous) => (previous, entry.tiers, entry.created_at),
                // Old snapshot is unusable, so its tier stamps are meaningless too.
                Err(_) => (IndicatorRecord::new(symbol), TierTimestamps::default(), entry.created_at),
            },
            None => (IndicatorRecord::new(symbol), TierTimestamps::default(), now),
        };

        merged.merge_from(record);
        tiers.advance(fetched, now);

        let entry = CacheEntry {
            snapshot_json: merged.to_snapshot()?,
            tiers,
            last_fetched_at: now,
            created_at,
        };
        self.put_entry(symbol, entry).await
    }

    async fn write(
        &self,
        symbol: &str,
        record: &IndicatorRecord,
        fetched: &[Attribute],
    ) -> Result<(), MarketDataError> {
        self.write_at(symbol, record, fetched, Utc::now()).await
    }
}

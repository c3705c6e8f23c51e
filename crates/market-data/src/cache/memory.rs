//! In-process freshness store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::warn;

use super::traits::{CacheEntry, FreshnessStore};
use crate::errors::MarketDataError;
use crate::models::HistoryPoint;

/// Freshness store kept entirely in memory.
///
/// Used for tests and for embedding without a database. Contents are lost
/// when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryFreshnessStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    history: RwLock<BTreeMap<(String, NaiveDate), HistoryPoint>>,
}

impl MemoryFreshnessStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("Memory store entries lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("Memory store entries lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_history(&self) -> RwLockReadGuard<'_, BTreeMap<(String, NaiveDate), HistoryPoint>> {
        self.history.read().unwrap_or_else(|poisoned| {
            warn!("Memory store history lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_history_rows(
        &self,
    ) -> RwLockWriteGuard<'_, BTreeMap<(String, NaiveDate), HistoryPoint>> {
        self.history.write().unwrap_or_else(|poisoned| {
            warn!("Memory store history lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.read_history().len()
    }
}

#[async_trait]
impl FreshnessStore for MemoryFreshnessStore {
    fn entry(&self, symbol: &str) -> Result<Option<CacheEntry>, MarketDataError> {
        Ok(self.read_entries().get(symbol).cloned())
    }

    async fn put_entry(&self, symbol: &str, entry: CacheEntry) -> Result<(), MarketDataError> {
        self.write_entries().insert(symbol.to_string(), entry);
        Ok(())
    }

    fn history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HistoryPoint>, MarketDataError> {
        let rows = self.read_history();
        Ok(rows
            .range((symbol.to_string(), start)..=(symbol.to_string(), end))
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn write_history(
        &self,
        symbol: &str,
        points: &[HistoryPoint],
    ) -> Result<usize, MarketDataError> {
        let mut rows = self.write_history_rows();
        for point in points {
            rows.insert((symbol.to_string(), point.date), point.clone());
        }
        Ok(points.len())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, MarketDataError> {
        let mut removed = 0;

        {
            let mut entries = self.write_entries();
            let before = entries.len();
            entries.retain(|_, e| e.last_fetched_at >= cutoff);
            removed += before - entries.len();
        }

        let cutoff_date = cutoff.date_naive();
        let mut rows = self.write_history_rows();
        let before = rows.len();
        rows.retain(|(_, date), _| *date >= cutoff_date);
        removed += before - rows.len();

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheLookup, TtlPolicy};
    use crate::models::{Attribute, DateRange, IndicatorRecord};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn point(date: NaiveDate, close: rust_decimal::Decimal) -> HistoryPoint {
        HistoryPoint {
            date,
            open: Some(close),
            high: Some(close),
            low: Some(close),
            close: Some(close),
            volume: Some(1_000),
            change_pct: None,
            market_cap: None,
        }
    }

    #[tokio::test]
    async fn test_write_then_lookup_is_fresh_for_fetched_tiers() {
        let store = MemoryFreshnessStore::new();
        let record = IndicatorRecord {
            symbol: "AAPL".to_string(),
            name: Some("Apple Inc.".to_string()),
            beta: Some(1.2),
            ..Default::default()
        };
        store
            .write_at("AAPL", &record, &record.populated_fields(), now())
            .await
            .unwrap();

        let policy = TtlPolicy::default();
        let lookup = store.lookup_at("AAPL", &[Attribute::Name, Attribute::Beta], &policy, now());
        assert!(lookup.fresh);
        assert_eq!(lookup.hit().and_then(|r| r.beta), Some(1.2));

        // Summary's tier was never advanced.
        let lookup = store.lookup_at("AAPL", &[Attribute::Name, Attribute::Summary], &policy, now());
        assert!(!lookup.fresh);
        assert!(lookup.record.is_some());

        // Beta expires after the medium-term TTL.
        let later = now() + Duration::days(91);
        assert!(!store.lookup_at("AAPL", &[Attribute::Beta], &policy, later).fresh);
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_a_miss() {
        let store = MemoryFreshnessStore::new();
        store
            .put_entry(
                "AAPL",
                CacheEntry {
                    snapshot_json: "{not json".to_string(),
                    tiers: Default::default(),
                    last_fetched_at: now(),
                    created_at: now(),
                },
            )
            .await
            .unwrap();

        let lookup = store.lookup_at("AAPL", &[Attribute::Name], &TtlPolicy::default(), now());
        assert_eq!(lookup, CacheLookup::miss());
    }

    #[tokio::test]
    async fn test_range_lookup_requires_weekday_coverage() {
        let store = MemoryFreshnessStore::new();
        let policy = TtlPolicy::default();
        // Mon 3 June .. Wed 5 June
        let range = DateRange::new(date(6, 3), date(6, 5)).unwrap();

        store
            .write_history("AAPL", &[point(date(6, 3), dec!(1)), point(date(6, 4), dec!(2))])
            .await
            .unwrap();
        let lookup = store.lookup_range_at("AAPL", &[Attribute::Last], range, &policy, now());
        assert!(!lookup.fresh);

        store
            .write_history("AAPL", &[point(date(6, 5), dec!(3))])
            .await
            .unwrap();
        let lookup = store.lookup_range_at("AAPL", &[Attribute::Last], range, &policy, now());
        assert!(lookup.fresh);
        let record = lookup.record.unwrap();
        assert_eq!(record.last, vec![dec!(1), dec!(2), dec!(3)]);

        // change_pct was never stored, so a request for it misses.
        let lookup = store.lookup_range_at("AAPL", &[Attribute::ChangePct], range, &policy, now());
        assert!(!lookup.fresh);
    }

    #[test]
    fn test_weekend_only_range_on_empty_store_is_a_miss() {
        let store = MemoryFreshnessStore::new();
        // Sat 1 June .. Sun 2 June
        let range = DateRange::new(date(6, 1), date(6, 2)).unwrap();

        let lookup =
            store.lookup_range_at("AAPL", &[Attribute::Last], range, &TtlPolicy::default(), now());
        assert!(!lookup.fresh);
    }

    #[tokio::test]
    async fn test_prune_drops_old_entries_and_rows() {
        let store = MemoryFreshnessStore::new();
        let old = now() - Duration::days(40);
        store
            .write_at("OLD", &IndicatorRecord::new("OLD"), &[], old)
            .await
            .unwrap();
        store
            .write_at("NEW", &IndicatorRecord::new("NEW"), &[], now())
            .await
            .unwrap();
        store
            .write_history("NEW", &[point(date(4, 1), dec!(1)), point(date(6, 3), dec!(2))])
            .await
            .unwrap();

        let removed = store.prune(now() - Duration::days(30)).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.history_len(), 1);
    }
}

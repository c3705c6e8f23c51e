//! Tests for SqliteFreshnessStore against an on-disk database.

#[cfg(test)]
mod tests {
    use crate::cache::SqliteFreshnessStore;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use finfetch_market_data::{
        Attribute, CacheEntry, DateRange, FreshnessStore, HistoryPoint, IndicatorRecord,
        TierTimestamps, TtlPolicy,
    };
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn open() -> (TempDir, SqliteFreshnessStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteFreshnessStore::open(dir.path().join("cache").join("finfetch.db")).unwrap();
        (dir, store)
    }

    fn point(date: NaiveDate, close: rust_decimal::Decimal) -> HistoryPoint {
        HistoryPoint {
            date,
            open: Some(close - dec!(1)),
            high: Some(close + dec!(1)),
            low: Some(close - dec!(2)),
            close: Some(close),
            volume: Some(10_000),
            change_pct: Some(0.25),
            market_cap: None,
        }
    }

    #[tokio::test]
    async fn test_missing_symbol_is_a_miss() {
        let (_dir, store) = open();
        assert!(store.entry("AAPL").unwrap().is_none());
        let lookup = store.lookup_at("AAPL", &[Attribute::Name], &TtlPolicy::default(), now());
        assert!(!lookup.fresh);
        assert!(lookup.record.is_none());
    }

    #[tokio::test]
    async fn test_write_then_lookup_is_fresh() {
        let (_dir, store) = open();
        let mut record = IndicatorRecord::new("AAPL");
        record.name = Some("Apple Inc.".to_string());
        record.trailing_pe = Some(29.4);

        store
            .write_at("AAPL", &record, &[Attribute::Name, Attribute::TrailingPe], now())
            .await
            .unwrap();

        let policy = TtlPolicy::default();
        let lookup = store.lookup_at(
            "AAPL",
            &[Attribute::Name, Attribute::TrailingPe],
            &policy,
            now() + Duration::days(30),
        );
        assert!(lookup.fresh);
        let cached = lookup.record.unwrap();
        assert_eq!(cached.name.as_deref(), Some("Apple Inc."));
        assert_eq!(cached.trailing_pe, Some(29.4));

        let expired = store.lookup_at("AAPL", &[Attribute::TrailingPe], &policy, now() + Duration::days(91));
        assert!(!expired.fresh);
    }

    #[tokio::test]
    async fn test_rewrite_merges_and_keeps_created_at() {
        let (_dir, store) = open();
        let mut first = IndicatorRecord::new("VTI");
        first.summary = Some("Total market".to_string());
        store
            .write_at("VTI", &first, &[Attribute::Summary], now())
            .await
            .unwrap();

        let mut second = IndicatorRecord::new("VTI");
        second.beta = Some(1.02);
        let later = now() + Duration::days(3);
        store
            .write_at("VTI", &second, &[Attribute::Beta], later)
            .await
            .unwrap();

        let entry = store.entry("VTI").unwrap().unwrap();
        assert_eq!(entry.created_at, now());
        assert_eq!(entry.last_fetched_at, later);
        assert_eq!(entry.tiers.long_term, Some(now()));
        assert_eq!(entry.tiers.medium_term, Some(later));

        let record = IndicatorRecord::from_snapshot(&entry.snapshot_json).unwrap();
        assert_eq!(record.summary.as_deref(), Some("Total market"));
        assert_eq!(record.beta, Some(1.02));
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_degrades_to_miss() {
        let (_dir, store) = open();
        store
            .put_entry(
                "BAD",
                CacheEntry {
                    snapshot_json: "{not json".to_string(),
                    tiers: TierTimestamps {
                        immutable: Some(now()),
                        ..Default::default()
                    },
                    last_fetched_at: now(),
                    created_at: now(),
                },
            )
            .await
            .unwrap();

        let lookup = store.lookup_at("BAD", &[Attribute::Name], &TtlPolicy::default(), now());
        assert!(!lookup.fresh);
        assert!(lookup.record.is_none());
    }

    #[tokio::test]
    async fn test_history_upsert_and_range_query() {
        let (_dir, store) = open();
        let written = store
            .write_history(
                "1183441",
                &[point(date(3, 5), dec!(11)), point(date(3, 4), dec!(10))],
            )
            .await
            .unwrap();
        assert_eq!(written, 2);

        // Same key replaces the row.
        store
            .write_history("1183441", &[point(date(3, 5), dec!(12))])
            .await
            .unwrap();

        let rows = store.history("1183441", date(3, 1), date(3, 31)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, date(3, 4));
        assert_eq!(rows[1].close, Some(dec!(12)));
        assert_eq!(rows[1].volume, Some(10_000));

        assert!(store.history("1183441", date(4, 1), date(4, 30)).unwrap().is_empty());
        assert!(store.history("OTHER", date(3, 1), date(3, 31)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_range_lookup_requires_every_weekday() {
        let (_dir, store) = open();
        let range = DateRange::new(date(3, 4), date(3, 6)).unwrap();
        store
            .write_history("1183441", &[point(date(3, 4), dec!(10)), point(date(3, 6), dec!(12))])
            .await
            .unwrap();

        let policy = TtlPolicy::default();
        let partial = store.lookup_range_at("1183441", &[Attribute::Last], range, &policy, now());
        assert!(!partial.fresh);

        store
            .write_history("1183441", &[point(date(3, 5), dec!(11))])
            .await
            .unwrap();
        let complete = store.lookup_range_at("1183441", &[Attribute::Last], range, &policy, now());
        assert!(complete.fresh);
        assert_eq!(
            complete.record.unwrap().last,
            vec![dec!(10), dec!(11), dec!(12)]
        );
    }

    #[tokio::test]
    async fn test_prune_drops_old_entries_and_rows() {
        let (_dir, store) = open();
        let record = IndicatorRecord::new("X");
        store
            .write_at("OLD", &record, &[], now() - Duration::days(60))
            .await
            .unwrap();
        store.write_at("NEW", &record, &[], now()).await.unwrap();
        store
            .write_history("NEW", &[point(date(1, 2), dec!(1)), point(date(6, 3), dec!(2))])
            .await
            .unwrap();

        let removed = store.prune(now() - Duration::days(30)).await.unwrap();

        assert_eq!(removed, 2);
        assert!(store.entry("OLD").unwrap().is_none());
        assert!(store.entry("NEW").unwrap().is_some());
        assert_eq!(store.history("NEW", date(1, 1), date(12, 31)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_store_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = finfetch_market_data::CacheConfig::default();

        let memory = crate::cache::open_store(&config).unwrap();
        assert!(memory.entry("AAPL").unwrap().is_none());

        config.path = Some(dir.path().join("finfetch.db"));
        let sqlite = crate::cache::open_store(&config).unwrap();
        sqlite
            .write_at("AAPL", &IndicatorRecord::new("AAPL"), &[], now())
            .await
            .unwrap();
        assert!(dir.path().join("finfetch.db").exists());
        assert!(sqlite.entry("AAPL").unwrap().is_some());
    }
}

//! Pipeline tests for FetchManager using mock fetchers and the in-memory store.

#[cfg(test)]
mod tests {
    use crate::cache::{FreshnessStore, MemoryFreshnessStore};
    use crate::classifier::{RemapSource, RemapTable, StaticRemapSource};
    use crate::config::FetcherConfig;
    use crate::errors::MarketDataError;
    use crate::manager::{FetchManager, FetchService};
    use crate::models::{
        descriptor, Attribute, CellValue, FetchBatch, FetchRequest, FieldValue, IndicatorRecord,
        Interval, RowKey, SourceVariant,
    };
    use crate::provider::{FetcherSet, SourceFetcher};
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    // =========================================================================
    // Mocks
    // =========================================================================

    /// Fills every requested attribute with a deterministic value.
    struct MockFetcher {
        variant: SourceVariant,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        intervals: Mutex<Vec<Interval>>,
        reject: Option<&'static str>,
    }

    impl MockFetcher {
        fn new(variant: SourceVariant) -> Arc<Self> {
            Arc::new(Self {
                variant,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                intervals: Mutex::new(Vec::new()),
                reject: None,
            })
        }

        fn rejecting(variant: SourceVariant, symbol: &'static str) -> Arc<Self> {
            Arc::new(Self {
                variant,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                intervals: Mutex::new(Vec::new()),
                reject: Some(symbol),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SourceFetcher for MockFetcher {
        fn id(&self) -> &'static str {
            "MOCK"
        }

        fn variant(&self) -> SourceVariant {
            self.variant
        }

        fn fetch(&self, batch: &mut FetchBatch) -> Result<(), MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let today = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();

            for request in &mut batch.requests {
                self.seen.lock().unwrap().push(request.resolved_id.clone());
                self.intervals.lock().unwrap().push(request.interval);
                if self.reject == Some(request.resolved_id.as_str()) {
                    request.mark_failed("symbol not found");
                    continue;
                }

                let dates: Vec<NaiveDate> = match request.date_range {
                    Some(range) => range.weekdays().collect(),
                    None => vec![today],
                };
                let rows = dates.len();
                request.record.dates = dates;

                for attribute in request.attributes.clone() {
                    let value = match attribute {
                        Attribute::Volume => FieldValue::Counts(vec![1_000; rows]),
                        Attribute::ChangePct => FieldValue::Numbers(vec![0.5; rows]),
                        a if a.is_series() => FieldValue::Amounts(vec![dec!(101.5); rows]),
                        Attribute::AvgVolume3m => FieldValue::Count(5_000),
                        Attribute::ExpenseRatio
                        | Attribute::DividendYield
                        | Attribute::TrailingPe
                        | Attribute::ForwardPe
                        | Attribute::Beta => FieldValue::Number(1.5),
                        _ => FieldValue::Text(format!("{} of {}", attribute, request.resolved_id)),
                    };
                    (descriptor(attribute).set)(&mut request.record, value);
                }
                request.mark_success();
            }
            Ok(())
        }
    }

    struct BrokenRemap;

    impl RemapSource for BrokenRemap {
        fn load(&self) -> Result<RemapTable, MarketDataError> {
            Err(MarketDataError::RemapUnavailable("file missing".to_string()))
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn config() -> FetcherConfig {
        let mut config = FetcherConfig::default();
        for variant in SourceVariant::ALL {
            let settings = config.variant_mut(variant);
            settings.timeout = Duration::from_secs(2);
            settings.retries = 0;
            settings.backoff_base = Duration::from_millis(1);
            settings.requests_per_minute = None;
        }
        config
    }

    fn manager_with(
        config: FetcherConfig,
        fetchers: FetcherSet,
        remap: RemapTable,
        store: Arc<MemoryFreshnessStore>,
    ) -> FetchManager {
        FetchManager::new(config, fetchers, Arc::new(StaticRemapSource::new(remap)), store).unwrap()
    }

    fn request(ids: &str, attributes: &[&str]) -> FetchRequest {
        FetchRequest::builder()
            .identifier(ids)
            .attributes(attributes.iter().copied())
            .build()
            .unwrap()
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap()
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[tokio::test]
    async fn test_single_price_request_builds_one_task() {
        let general = MockFetcher::new(SourceVariant::General);
        let store = Arc::new(MemoryFreshnessStore::new());
        let manager = manager_with(
            config(),
            FetcherSet::new().with(general.clone()),
            RemapTable::new(),
            store,
        );

        let report = manager.fetch_at(&request("AAPL", &["price"]), now()).await.unwrap();

        assert_eq!(general.calls(), 1);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.table.index, vec![RowKey::Now]);
        let column = report.table.column("AAPL", Attribute::Price).unwrap();
        assert_eq!(column.values.len(), 1);
        assert!(column.values[0].as_amount().unwrap() > dec!(0));
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetcher() {
        let general = MockFetcher::new(SourceVariant::General);
        let store = Arc::new(MemoryFreshnessStore::new());
        let manager = manager_with(
            config(),
            FetcherSet::new().with(general.clone()),
            RemapTable::new(),
            store,
        );
        let req = request("MSFT", &["currency", "name"]);

        let first = manager.fetch_at(&req, now()).await.unwrap();
        assert_eq!(first.fetched, 1);

        let second = manager.fetch_at(&req, now() + ChronoDuration::hours(1)).await.unwrap();
        assert_eq!(second.cache_hits, 1);
        assert_eq!(second.fetched, 0);
        assert_eq!(general.calls(), 1);
        assert_eq!(
            second.table.column("MSFT", Attribute::Currency).unwrap().values,
            vec![CellValue::Text("currency of MSFT".to_string())]
        );
    }

    #[tokio::test]
    async fn test_long_term_attribute_expires_after_ttl() {
        let general = MockFetcher::new(SourceVariant::General);
        let store = Arc::new(MemoryFreshnessStore::new());
        let manager = manager_with(
            config(),
            FetcherSet::new().with(general.clone()),
            RemapTable::new(),
            store,
        );
        let req = request("VTI", &["summary"]);

        manager.fetch_at(&req, now()).await.unwrap();

        let at_200 = manager.fetch_at(&req, now() + ChronoDuration::days(200)).await.unwrap();
        assert_eq!(at_200.cache_hits, 1);
        assert_eq!(general.calls(), 1);

        let at_400 = manager.fetch_at(&req, now() + ChronoDuration::days(400)).await.unwrap();
        assert_eq!(at_400.cache_hits, 0);
        assert_eq!(general.calls(), 2);
    }

    #[tokio::test]
    async fn test_output_keeps_request_order_with_mixed_cache_hits() {
        let general = MockFetcher::new(SourceVariant::General);
        let store = Arc::new(MemoryFreshnessStore::new());
        for id in ["A", "C"] {
            let mut record = IndicatorRecord::new(id);
            record.currency = Some("EUR".to_string());
            store
                .write_at(id, &record, &[Attribute::Currency], now())
                .await
                .unwrap();
        }
        let manager = manager_with(
            config(),
            FetcherSet::new().with(general.clone()),
            RemapTable::new(),
            store,
        );

        let report = manager.fetch_at(&request("A, B, C", &["currency"]), now()).await.unwrap();

        assert_eq!(report.cache_hits, 2);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.table.instruments(), vec!["A", "B", "C"]);
        assert_eq!(*general.seen.lock().unwrap(), vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn test_routes_exchange_and_remapped_identifiers() {
        let general = MockFetcher::new(SourceVariant::General);
        let exchange = MockFetcher::new(SourceVariant::ExchangeLatest);
        let store = Arc::new(MemoryFreshnessStore::new());
        let remap = RemapTable::new().with_entry("1159250", "SPY", Some("SPDR S&P 500 ETF"));
        let manager = manager_with(
            config(),
            FetcherSet::new().with(general.clone()).with(exchange.clone()),
            remap,
            store,
        );

        let report = manager
            .fetch_at(&request("1183441 1159250", &["last"]), now())
            .await
            .unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(*exchange.seen.lock().unwrap(), vec!["1183441".to_string()]);
        assert_eq!(*general.seen.lock().unwrap(), vec!["SPY".to_string()]);
        assert_eq!(report.table.instruments(), vec!["1183441", "1159250"]);
    }

    #[tokio::test]
    async fn test_range_request_is_served_from_history() {
        let historical = MockFetcher::new(SourceVariant::ExchangeHistorical);
        let store = Arc::new(MemoryFreshnessStore::new());
        let manager = manager_with(
            config(),
            FetcherSet::new().with(historical.clone()),
            RemapTable::new(),
            store.clone(),
        );
        let req = FetchRequest::builder()
            .identifier("1183441")
            .attributes(["close"])
            .start(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .end(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap())
            .build()
            .unwrap();

        let first = manager.fetch_at(&req, now()).await.unwrap();
        // Fri 1st, then Mon 4th through Thu 7th.
        assert_eq!(first.table.index.len(), 5);
        assert_eq!(store.history_len(), 5);

        let second = manager.fetch_at(&req, now()).await.unwrap();
        assert_eq!(second.cache_hits, 1);
        assert_eq!(historical.calls(), 1);
        assert_eq!(second.table.index, first.table.index);
        let closes = &second.table.column("1183441", Attribute::Last).unwrap().values;
        assert!(closes.iter().all(|c| c.as_amount() == Some(dec!(101.5))));
    }

    #[tokio::test]
    async fn test_weekend_only_range_goes_to_fetcher() {
        let general = MockFetcher::new(SourceVariant::General);
        let store = Arc::new(MemoryFreshnessStore::new());
        let manager = manager_with(
            config(),
            FetcherSet::new().with(general.clone()),
            RemapTable::new(),
            store,
        );
        let req = FetchRequest::builder()
            .identifier("AAPL")
            .attributes(["close"])
            .start(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap())
            .end(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap())
            .build()
            .unwrap();

        let report = manager.fetch_at(&req, now()).await.unwrap();

        assert_eq!(general.calls(), 1);
        assert_eq!(report.cache_hits, 0);
        assert_eq!(report.fetched, 1);
    }

    #[tokio::test]
    async fn test_weekly_interval_reaches_fetcher_and_skips_history() {
        let general = MockFetcher::new(SourceVariant::General);
        let store = Arc::new(MemoryFreshnessStore::new());
        let manager = manager_with(
            config(),
            FetcherSet::new().with(general.clone()),
            RemapTable::new(),
            store.clone(),
        );
        let req = FetchRequest::builder()
            .identifier("AAPL")
            .attributes(["close"])
            .start(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .end(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap())
            .interval("1wk")
            .build()
            .unwrap();

        manager.fetch_at(&req, now()).await.unwrap();
        let second = manager.fetch_at(&req, now()).await.unwrap();

        assert_eq!(general.calls(), 2);
        assert_eq!(second.cache_hits, 0);
        assert_eq!(store.history_len(), 0);
        assert_eq!(
            *general.intervals.lock().unwrap(),
            vec![Interval::Weekly, Interval::Weekly]
        );
    }

    #[tokio::test]
    async fn test_failures_and_unclassified_are_reported() {
        let general = MockFetcher::rejecting(SourceVariant::General, "GONE");
        let store = Arc::new(MemoryFreshnessStore::new());
        let manager = manager_with(
            config(),
            FetcherSet::new().with(general),
            RemapTable::new(),
            store,
        );

        let report = manager
            .fetch_at(&request("AAPL, GONE, BAD$, 1183441", &["price"]), now())
            .await
            .unwrap();

        assert_eq!(report.table.instruments(), vec!["AAPL"]);
        assert_eq!(report.unclassified.len(), 1);
        assert_eq!(report.unclassified[0].0, "BAD$");

        let failed: Vec<&str> = report.failures.iter().map(|f| f.identifier.as_str()).collect();
        assert_eq!(failed, vec!["GONE", "1183441"]);
        assert_eq!(report.failures[0].message, "symbol not found");
        assert_eq!(report.failures[1].variant, SourceVariant::ExchangeLatest);
        assert_eq!(report.failures[1].attempts, 0);
    }

    #[tokio::test]
    async fn test_remap_failure_aborts_request() {
        let manager = FetchManager::new(
            config(),
            FetcherSet::new().with(MockFetcher::new(SourceVariant::General)),
            Arc::new(BrokenRemap),
            Arc::new(MemoryFreshnessStore::new()),
        )
        .unwrap();

        let result = manager.fetch(&request("AAPL", &["price"])).await;
        assert!(matches!(result, Err(MarketDataError::RemapUnavailable(_))));
    }

    #[tokio::test]
    async fn test_disabled_cache_always_fetches() {
        let general = MockFetcher::new(SourceVariant::General);
        let store = Arc::new(MemoryFreshnessStore::new());
        let mut config = config();
        config.cache.enabled = false;
        let manager = manager_with(
            config,
            FetcherSet::new().with(general.clone()),
            RemapTable::new(),
            store.clone(),
        );
        let req = request("MSFT", &["currency"]);

        manager.fetch_at(&req, now()).await.unwrap();
        let second = manager.fetch_at(&req, now()).await.unwrap();

        assert_eq!(second.cache_hits, 0);
        assert_eq!(general.calls(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_retention_prunes_old_entries() {
        let store = Arc::new(MemoryFreshnessStore::new());
        let mut stale = IndicatorRecord::new("OLD");
        stale.currency = Some("USD".to_string());
        store
            .write_at("OLD", &stale, &[Attribute::Currency], now() - ChronoDuration::days(100))
            .await
            .unwrap();

        let mut config = config();
        config.cache.retention_days = Some(30);
        let manager = manager_with(
            config,
            FetcherSet::new().with(MockFetcher::new(SourceVariant::General)),
            RemapTable::new(),
            store.clone(),
        );

        manager.fetch_at(&request("AAPL", &["currency"]), now()).await.unwrap();

        assert!(store.entry("OLD").unwrap().is_none());
        assert!(store.entry("AAPL").unwrap().is_some());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.batch_size = 0;
        let result = FetchManager::new(
            config,
            FetcherSet::new(),
            Arc::new(StaticRemapSource::empty()),
            Arc::new(MemoryFreshnessStore::new()),
        );
        assert!(matches!(result, Err(MarketDataError::Configuration(_))));
    }
}

//! End-to-end fetch pipeline.
//!
//! ```text
//! FetchRequest ─► ClassificationContext ─► Classifier ─► cache lookup ─┬─► hits ─────────────┐
//!                                                                     └─► TaskBuilder         │
//!                                                                           │                 ▼
//!                                                                       Scheduler ─► Aggregator ─► ResultTable
//!                                                                                        │
//!                                                                                   write-back / prune
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::aggregator::{write_back, Aggregator, InstrumentFailure};
use crate::cache::FreshnessStore;
use crate::classifier::{ClassificationContext, Classifier, RemapSource};
use crate::config::FetcherConfig;
use crate::errors::MarketDataError;
use crate::models::{
    FetchRequest, IndicatorRecord, InstrumentRequest, Interval, ResultTable, SourceVariant,
    TaskOverrides,
};
use crate::provider::FetcherSet;
use crate::scheduler::{LoadProbe, OutcomeObserver, ProcLoadProbe, RunReport, Scheduler};
use crate::tasks::TaskBuilder;

/// Everything one `fetch` produced.
#[derive(Debug)]
pub struct FetchReport {
    pub table: ResultTable,
    /// Instruments that were classified but have no result, in request order.
    pub failures: Vec<InstrumentFailure>,
    /// Identifiers that could not be routed to any source.
    pub unclassified: Vec<(String, MarketDataError)>,
    /// Instruments served from the freshness cache.
    pub cache_hits: usize,
    /// Instruments fetched from a source during this call.
    pub fetched: usize,
}

/// Fetch interface for embedding applications.
#[async_trait]
pub trait FetchService: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchReport, MarketDataError>;
}

/// Runs requests through classification, cache, scheduling and aggregation.
pub struct FetchManager {
    config: FetcherConfig,
    fetchers: FetcherSet,
    remap_source: Arc<dyn RemapSource>,
    store: Arc<dyn FreshnessStore>,
    load_probe: Arc<dyn LoadProbe>,
    observers: Vec<Arc<dyn OutcomeObserver>>,
}

impl FetchManager {
    pub fn new(
        config: FetcherConfig,
        fetchers: FetcherSet,
        remap_source: Arc<dyn RemapSource>,
        store: Arc<dyn FreshnessStore>,
    ) -> Result<Self, MarketDataError> {
        config.validate()?;
        Ok(Self {
            config,
            fetchers,
            remap_source,
            store,
            load_probe: Arc::new(ProcLoadProbe),
            observers: Vec::new(),
        })
    }

    pub fn with_load_probe(mut self, probe: Arc<dyn LoadProbe>) -> Self {
        self.load_probe = probe;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn OutcomeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Run `request` as if the current time were `now`.
    pub async fn fetch_at(
        &self,
        request: &FetchRequest,
        now: DateTime<Utc>,
    ) -> Result<FetchReport, MarketDataError> {
        let date_range = request.date_range();
        let attributes = request.attributes();

        let mut context = ClassificationContext::load(self.remap_source.as_ref(), date_range)?;
        let classification =
            Classifier::new().classify(&mut context, request.identifiers(), attributes, date_range);

        let order: Vec<String> = classification
            .classified
            .iter()
            .map(|c| c.identifier.clone())
            .collect();

        let mut hits: Vec<(String, IndicatorRecord)> = Vec::new();
        let mut pending: BTreeMap<SourceVariant, Vec<InstrumentRequest>> = BTreeMap::new();
        for instrument in classification.classified {
            if let Some(record) = self.cached(&instrument.identifier, request, now) {
                debug!("Serving {} from cache", instrument.identifier);
                hits.push((instrument.identifier, record));
                continue;
            }
            pending
                .entry(instrument.variant)
                .or_default()
                .push(instrument.request.with_interval(request.interval()));
        }
        let cache_hits = hits.len();

        let tasks = TaskBuilder::new(&self.config).build_all(pending);
        info!(
            "{} instrument(s): {} cached, {} task(s) to run, {} unclassified",
            order.len(),
            cache_hits,
            tasks.len(),
            classification.unclassified.len()
        );

        let report = if tasks.is_empty() {
            RunReport::default()
        } else {
            let mut scheduler = Scheduler::with_load_probe(
                &self.config,
                self.fetchers.clone(),
                Arc::clone(&self.load_probe),
            );
            for observer in &self.observers {
                scheduler.add_observer(Arc::clone(observer));
            }
            for task in tasks {
                scheduler.submit(task, &TaskOverrides::default());
            }
            scheduler.run().await
        };

        let aggregation = Aggregator::new(&order).aggregate(hits, report);
        let fetched = aggregation.fetched.len();

        if self.config.cache.enabled {
            let written = write_back(self.store.as_ref(), &aggregation.fetched, now).await;
            debug!("Wrote {} cache entr(ies)", written);
            self.prune(now).await;
        }

        let table = ResultTable::assemble(&aggregation.records, attributes, date_range.is_some());

        Ok(FetchReport {
            table,
            failures: aggregation.failures,
            unclassified: classification.unclassified,
            cache_hits,
            fetched,
        })
    }

    fn cached(
        &self,
        identifier: &str,
        request: &FetchRequest,
        now: DateTime<Utc>,
    ) -> Option<IndicatorRecord> {
        if !self.config.cache.enabled {
            return None;
        }

        let policy = &self.config.cache.ttl;
        let lookup = match request.date_range() {
            // History rows are daily; other intervals always go to the source.
            Some(_) if request.interval() != Interval::Daily => return None,
            Some(range) => {
                self.store
                    .lookup_range_at(identifier, request.attributes(), range, policy, now)
            }
            None => self
                .store
                .lookup_at(identifier, request.attributes(), policy, now),
        };

        if lookup.fresh {
            lookup.record
        } else {
            None
        }
    }

    async fn prune(&self, now: DateTime<Utc>) {
        let Some(days) = self.config.cache.retention_days else {
            return;
        };
        let cutoff = now - chrono::Duration::days(i64::from(days));
        match self.store.prune(cutoff).await {
            Ok(0) => {}
            Ok(removed) => info!("Pruned {} cache row(s) older than {}", removed, cutoff),
            Err(e) => warn!("Cache prune failed: {}", e),
        }
    }
}

#[async_trait]
impl FetchService for FetchManager {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchReport, MarketDataError> {
        self.fetch_at(request, Utc::now()).await
    }
}

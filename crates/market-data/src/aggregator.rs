//! Reconciles cache hits and scheduler outcomes into caller order.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::cache::FreshnessStore;
use crate::models::{IndicatorRecord, InstrumentRequest, Interval, SourceVariant};
use crate::scheduler::RunReport;

/// Why an instrument has no column in the result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentFailure {
    pub identifier: String,
    pub variant: SourceVariant,
    /// Attempts made by the task that carried this instrument.
    pub attempts: u32,
    pub message: String,
}

/// Output of [`Aggregator::aggregate`].
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Resolved records in the caller's original order.
    pub records: Vec<(String, IndicatorRecord)>,
    /// Successfully fetched requests, for write-back.
    pub fetched: Vec<InstrumentRequest>,
    /// Failures in the caller's original order; unmatched results last.
    pub failures: Vec<InstrumentFailure>,
}

/// Merges cache hits with fetched results.
pub struct Aggregator<'a> {
    order: &'a [String],
}

impl<'a> Aggregator<'a> {
    /// `order` is the caller's identifier order, captured before cache filtering.
    pub fn new(order: &'a [String]) -> Self {
        Self { order }
    }

    pub fn aggregate(&self, hits: Vec<(String, IndicatorRecord)>, report: RunReport) -> Aggregation {
        let requested: HashSet<&str> = self.order.iter().map(String::as_str).collect();
        let mut resolved: HashMap<String, IndicatorRecord> = hits.into_iter().collect();
        let mut fetched = Vec::new();
        let mut failures = Vec::new();
        let mut anomalies = Vec::new();

        for success in report.successes {
            let variant = success.batch.variant;
            for request in success.batch.requests {
                if !requested.contains(request.original_id.as_str()) {
                    warn!(
                        "Dropping {} result for unrequested instrument '{}'",
                        variant, request.original_id
                    );
                    anomalies.push(InstrumentFailure {
                        identifier: request.original_id,
                        variant,
                        attempts: success.attempts,
                        message: "Result could not be matched to a requested instrument".to_string(),
                    });
                    continue;
                }

                if request.success {
                    resolved.insert(request.original_id.clone(), request.record.clone());
                    fetched.push(request);
                } else {
                    debug!(
                        "{} returned no data for {}: {}",
                        variant, request.original_id, request.message
                    );
                    failures.push(InstrumentFailure {
                        message: if request.message.is_empty() {
                            "No data returned".to_string()
                        } else {
                            request.message
                        },
                        identifier: request.original_id,
                        variant,
                        attempts: success.attempts,
                    });
                }
            }
        }

        for failure in report.failures {
            let message = failure.error.to_string();
            for request in failure.task.requests() {
                failures.push(InstrumentFailure {
                    identifier: request.original_id.clone(),
                    variant: failure.variant,
                    attempts: failure.attempts,
                    message: message.clone(),
                });
            }
        }

        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        failures.sort_by_key(|f| position.get(f.identifier.as_str()).copied().unwrap_or(usize::MAX));
        failures.extend(anomalies);

        let records = self
            .order
            .iter()
            .filter_map(|id| resolved.remove(id).map(|record| (id.clone(), record)))
            .collect();

        Aggregation {
            records,
            fetched,
            failures,
        }
    }
}

/// Persist freshly fetched requests. Store errors are logged and skipped.
/// Only daily ranges are written to history.
///
/// Returns the number of instruments whose snapshot was written.
pub async fn write_back(
    store: &dyn FreshnessStore,
    fetched: &[InstrumentRequest],
    now: DateTime<Utc>,
) -> usize {
    let mut written = 0;
    for request in fetched {
        let key = request.original_id.as_str();
        let fields = request.record.populated_fields();

        if let Err(e) = store.write_at(key, &request.record, &fields, now).await {
            warn!("Skipping cache write for {}: {}", key, e);
            continue;
        }
        written += 1;

        if request.date_range.is_some()
            && request.interval == Interval::Daily
            && !request.record.dates.is_empty()
        {
            let points = request.record.history_points();
            match store.write_history(key, &points).await {
                Ok(rows) => debug!("Stored {} history row(s) for {}", rows, key),
                Err(e) => warn!("Skipping history write for {}: {}", key, e),
            }
        }
    }
    written
}

use log::debug;

use crate::config::FetcherConfig;
use crate::models::{FetchTask, InstrumentRequest, SourceVariant};

/// Splits instrument requests into tasks.
///
/// `General` requests are chunked into batches of `batch_size`; exchange
/// variants get one task per instrument. Task parameters come from the
/// variant's defaults in [`FetcherConfig`].
pub struct TaskBuilder<'a> {
    config: &'a FetcherConfig,
}

impl<'a> TaskBuilder<'a> {
    pub fn new(config: &'a FetcherConfig) -> Self {
        Self { config }
    }

    /// Build tasks for one variant, preserving request order.
    pub fn build(&self, variant: SourceVariant, requests: Vec<InstrumentRequest>) -> Vec<FetchTask> {
        if requests.is_empty() {
            return Vec::new();
        }

        let settings = self.config.variant(variant);
        let chunk = if variant.is_batched() {
            self.config.batch_size.max(1)
        } else {
            1
        };

        let mut tasks = Vec::with_capacity(requests.len().div_ceil(chunk));
        let mut remaining = requests.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<InstrumentRequest> = remaining.by_ref().take(chunk).collect();
            tasks.push(FetchTask::new(
                variant,
                batch,
                settings.memory_estimate,
                settings.timeout,
                settings.retries,
                settings.backoff_base,
            ));
        }

        debug!("Built {} {} task(s)", tasks.len(), variant);
        tasks
    }

    /// Build tasks for several variants, in the order given.
    pub fn build_all<I>(&self, grouped: I) -> Vec<FetchTask>
    where
        I: IntoIterator<Item = (SourceVariant, Vec<InstrumentRequest>)>,
    {
        grouped
            .into_iter()
            .flat_map(|(variant, requests)| self.build(variant, requests))
            .collect()
    }
}

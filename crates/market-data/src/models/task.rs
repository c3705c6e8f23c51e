use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::instrument::{InstrumentRequest, SourceVariant};
use crate::errors::MarketDataError;

/// Container handed to a source fetcher for one attempt.
///
/// The fetcher mutates the requests in place and may set a batch-level
/// `success`/`message` when the whole call failed softly.
#[derive(Debug, Clone)]
pub struct FetchBatch {
    pub variant: SourceVariant,
    pub requests: Vec<InstrumentRequest>,
    pub success: bool,
    pub message: String,
}

impl FetchBatch {
    pub fn new(variant: SourceVariant, requests: Vec<InstrumentRequest>) -> Self {
        Self {
            variant,
            requests,
            success: true,
            message: String::new(),
        }
    }
}

/// Per-submission overrides of the variant defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOverrides {
    pub memory_estimate: Option<u64>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub backoff_base: Option<Duration>,
}

/// A unit of scheduled work. Immutable once built.
#[derive(Debug, Clone)]
pub struct FetchTask {
    id: Uuid,
    variant: SourceVariant,
    requests: Vec<InstrumentRequest>,
    memory_estimate: u64,
    timeout: Duration,
    retries: u32,
    backoff_base: Duration,
}

impl FetchTask {
    pub fn new(
        variant: SourceVariant,
        requests: Vec<InstrumentRequest>,
        memory_estimate: u64,
        timeout: Duration,
        retries: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            variant,
            requests,
            memory_estimate,
            timeout,
            retries,
            backoff_base,
        }
    }

    /// Apply overrides, producing the task that will actually be scheduled.
    pub fn with_overrides(self, overrides: &TaskOverrides) -> Self {
        Self {
            memory_estimate: overrides.memory_estimate.unwrap_or(self.memory_estimate),
            timeout: overrides.timeout.unwrap_or(self.timeout),
            retries: overrides.retries.unwrap_or(self.retries),
            backoff_base: overrides.backoff_base.unwrap_or(self.backoff_base),
            ..self
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn variant(&self) -> SourceVariant {
        self.variant
    }

    pub fn requests(&self) -> &[InstrumentRequest] {
        &self.requests
    }

    pub fn memory_estimate(&self) -> u64 {
        self.memory_estimate
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Total attempts allowed (`retries + 1`).
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// Fresh container for one attempt. Each attempt starts from the original requests.
    pub fn new_batch(&self) -> FetchBatch {
        FetchBatch::new(self.variant, self.requests.clone())
    }
}

#[derive(Debug)]
pub struct TaskSuccess {
    pub task: FetchTask,
    pub batch: FetchBatch,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TaskFailure {
    pub task: FetchTask,
    pub variant: SourceVariant,
    pub attempts: u32,
    pub error: MarketDataError,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Terminal state of a task.
#[derive(Debug)]
pub enum TaskOutcome {
    Success(TaskSuccess),
    Failure(TaskFailure),
}

impl TaskOutcome {
    pub fn task(&self) -> &FetchTask {
        match self {
            Self::Success(s) => &s.task,
            Self::Failure(f) => &f.task,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> FetchTask {
        FetchTask::new(
            SourceVariant::General,
            vec![InstrumentRequest::new("AAPL", "AAPL", vec![], None)],
            1024,
            Duration::from_secs(20),
            3,
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let base = task();
        let id = base.id();
        let overridden = base.with_overrides(&TaskOverrides {
            retries: Some(0),
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        });

        assert_eq!(overridden.id(), id);
        assert_eq!(overridden.retries(), 0);
        assert_eq!(overridden.max_attempts(), 1);
        assert_eq!(overridden.timeout(), Duration::from_millis(50));
        assert_eq!(overridden.memory_estimate(), 1024);
        assert_eq!(overridden.backoff_base(), Duration::from_secs(2));
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(task().id(), task().id());
    }

    #[test]
    fn test_new_batch_copies_requests() {
        let task = task();
        let mut batch = task.new_batch();
        batch.requests[0].mark_success();
        assert!(batch.success);
        assert!(!task.requests()[0].success);
    }
}

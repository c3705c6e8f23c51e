//! Admission-controlled task scheduler.
//!
//! A fixed pool of workers drains a shared FIFO queue. Before running a task a
//! worker holds, in order:
//! 1. a concurrency slot of the task's variant
//! 2. the task's memory estimate from the global budget
//! 3. CPU headroom, when a load guard is configured
//! 4. a rate-limit token of the variant, before every attempt
//!
//! Slots and memory are RAII permits, released on every exit path including
//! cancellation of `run`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::Semaphore;

use super::backoff::backoff_delay;
use super::load_guard::{LoadGuard, LoadProbe, ProcLoadProbe};
use super::memory_budget::MemoryBudget;
use super::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::config::FetcherConfig;
use crate::errors::MarketDataError;
use crate::models::{
    FetchBatch, FetchTask, SourceVariant, TaskFailure, TaskOutcome, TaskOverrides, TaskSuccess,
};
use crate::provider::{FetcherSet, SourceFetcher};

/// Callbacks invoked synchronously as each task reaches a terminal state.
pub trait OutcomeObserver: Send + Sync {
    fn on_success(&self, _success: &TaskSuccess) {}
    fn on_failure(&self, _failure: &TaskFailure) {}
}

/// Everything a `run` produced.
#[derive(Debug, Default)]
pub struct RunReport {
    pub successes: Vec<TaskSuccess>,
    pub failures: Vec<TaskFailure>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }
}

/// Schedules fetch tasks under per-variant, memory and load limits.
pub struct Scheduler {
    fetchers: FetcherSet,
    worker_count: usize,
    slots: HashMap<SourceVariant, Arc<Semaphore>>,
    memory: Arc<MemoryBudget>,
    load_guard: Option<LoadGuard>,
    rate_limiter: RateLimiter,
    queue: Mutex<VecDeque<FetchTask>>,
    observers: Vec<Arc<dyn OutcomeObserver>>,
}

impl Scheduler {
    pub fn new(config: &FetcherConfig, fetchers: FetcherSet) -> Self {
        Self::with_load_probe(config, fetchers, Arc::new(ProcLoadProbe))
    }

    /// Create a scheduler whose load guard (if configured) reads `probe`.
    pub fn with_load_probe(
        config: &FetcherConfig,
        fetchers: FetcherSet,
        probe: Arc<dyn LoadProbe>,
    ) -> Self {
        let rate_limiter = RateLimiter::new();
        let mut slots = HashMap::new();
        for variant in SourceVariant::ALL {
            let settings = config.variant(variant);
            slots.insert(variant, Arc::new(Semaphore::new(settings.concurrency.max(1))));
            if let Some(rpm) = settings.requests_per_minute {
                rate_limiter.configure(variant, RateLimitConfig::per_minute(rpm));
            }
        }

        Self {
            fetchers,
            worker_count: config.worker_count.max(1),
            slots,
            memory: MemoryBudget::new(config.memory_budget),
            load_guard: config
                .load_guard
                .as_ref()
                .map(|guard| LoadGuard::new(guard, probe)),
            rate_limiter,
            queue: Mutex::new(VecDeque::new()),
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn OutcomeObserver>) {
        self.observers.push(observer);
    }

    /// Shared memory budget, for sampling `in_use()` / `peak()`.
    pub fn memory_budget(&self) -> Arc<MemoryBudget> {
        Arc::clone(&self.memory)
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<FetchTask>> {
        self.queue.lock().unwrap_or_else(|poisoned| {
            warn!("Scheduler queue mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Enqueue a task. Never blocks.
    pub fn submit(&self, task: FetchTask, overrides: &TaskOverrides) {
        let task = task.with_overrides(overrides);
        debug!(
            "Submitted task {} ({}, {} instrument(s))",
            task.id(),
            task.variant(),
            task.requests().len()
        );
        self.lock_queue().push_back(task);
    }

    pub fn pending(&self) -> usize {
        self.lock_queue().len()
    }

    /// Run until the queue is empty and every task is terminal.
    pub async fn run(&self) -> RunReport {
        let pending = self.pending();
        if pending == 0 {
            return RunReport::default();
        }

        let workers = self.worker_count.min(pending);
        info!("Running {} task(s) on {} worker(s)", pending, workers);

        let outcomes = join_all((0..workers).map(|id| self.worker(id))).await;

        let mut report = RunReport::default();
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                TaskOutcome::Success(s) => report.successes.push(s),
                TaskOutcome::Failure(f) => report.failures.push(f),
            }
        }

        info!(
            "Run finished: {} succeeded, {} failed",
            report.successes.len(),
            report.failures.len()
        );
        report
    }

    async fn worker(&self, id: usize) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        loop {
            // Pop in its own statement so the queue lock is not held across awaits.
            let next = self.lock_queue().pop_front();
            let Some(task) = next else {
                break;
            };
            debug!("Worker {} picked task {}", id, task.id());

            let outcome = self.execute(task).await;
            self.notify(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    fn notify(&self, outcome: &TaskOutcome) {
        for observer in &self.observers {
            match outcome {
                TaskOutcome::Success(s) => observer.on_success(s),
                TaskOutcome::Failure(f) => observer.on_failure(f),
            }
        }
    }

    async fn execute(&self, task: FetchTask) -> TaskOutcome {
        let started_at = Utc::now();
        let variant = task.variant();

        let Some(fetcher) = self.fetchers.get(variant) else {
            warn!("No fetcher registered for {}, failing task {}", variant, task.id());
            return failure(task, 0, MarketDataError::NoFetcher { variant }, started_at);
        };

        let slot = match self.slots.get(&variant) {
            Some(semaphore) => Arc::clone(semaphore).acquire_owned().await,
            None => {
                return failure(task, 0, MarketDataError::NoFetcher { variant }, started_at);
            }
        };
        let _slot = match slot {
            Ok(permit) => permit,
            Err(e) => {
                let error = MarketDataError::FetchAborted {
                    variant,
                    message: e.to_string(),
                };
                return failure(task, 0, error, started_at);
            }
        };

        let _memory = match self.memory.acquire(task.memory_estimate()).await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Task {} can never be admitted: {}", task.id(), e);
                return failure(task, 0, e, started_at);
            }
        };

        if let Some(guard) = &self.load_guard {
            guard.wait_for_headroom().await;
        }

        let max_attempts = task.max_attempts();
        let mut attempt: u32 = 0;
        loop {
            self.rate_limiter.acquire(variant).await;

            match run_attempt(&fetcher, &task).await {
                Ok(batch) => {
                    debug!("Task {} succeeded on attempt {}", task.id(), attempt + 1);
                    return TaskOutcome::Success(TaskSuccess {
                        task,
                        batch,
                        attempts: attempt + 1,
                        started_at,
                        finished_at: Utc::now(),
                    });
                }
                Err(e) if attempt + 1 < max_attempts && e.retry_class().is_retryable() => {
                    let delay = backoff_delay(task.backoff_base(), attempt);
                    warn!(
                        "Task {} attempt {}/{} failed: {}. Retrying in {:?}",
                        task.id(),
                        attempt + 1,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "Task {} failed after {} attempt(s): {}",
                        task.id(),
                        attempt + 1,
                        e
                    );
                    return failure(task, attempt + 1, e, started_at);
                }
            }
        }
    }
}

/// One bounded attempt on the blocking pool.
///
/// On timeout the blocking call is abandoned, not cancelled.
async fn run_attempt(
    fetcher: &Arc<dyn SourceFetcher>,
    task: &FetchTask,
) -> Result<FetchBatch, MarketDataError> {
    let variant = task.variant();
    let fetcher = Arc::clone(fetcher);
    let mut batch = task.new_batch();

    let handle = tokio::task::spawn_blocking(move || {
        fetcher.fetch(&mut batch)?;
        Ok::<_, MarketDataError>(batch)
    });

    match tokio::time::timeout(task.timeout(), handle).await {
        Err(_) => Err(MarketDataError::Timeout {
            variant,
            timeout: task.timeout(),
        }),
        Ok(Err(join_error)) => Err(MarketDataError::FetchAborted {
            variant,
            message: join_error.to_string(),
        }),
        Ok(Ok(Err(e))) if e.retry_class().is_retryable() => Err(e),
        // Any other error from the collaborator is still a failed attempt.
        Ok(Ok(Err(e))) => Err(MarketDataError::ProviderError {
            variant,
            message: e.to_string(),
        }),
        Ok(Ok(Ok(batch))) if !batch.success => Err(MarketDataError::ProviderError {
            variant,
            message: if batch.message.is_empty() {
                "fetcher reported an unsuccessful batch".to_string()
            } else {
                batch.message
            },
        }),
        Ok(Ok(Ok(batch))) => Ok(batch),
    }
}

fn failure(
    task: FetchTask,
    attempts: u32,
    error: MarketDataError,
    started_at: DateTime<Utc>,
) -> TaskOutcome {
    TaskOutcome::Failure(TaskFailure {
        variant: task.variant(),
        task,
        attempts,
        error,
        started_at,
        finished_at: Utc::now(),
    })
}

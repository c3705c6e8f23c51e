//! Task scheduling under concurrency, memory, load and rate limits.
//!
//! - `scheduler` - worker pool, admission order, retries and outcome collection
//! - `memory_budget` - global byte budget with RAII permits
//! - `load_guard` - optional CPU-headroom gate
//! - `rate_limiter` - token-bucket pacing per source variant
//! - `backoff` - exponential retry delays with jitter

mod backoff;
mod load_guard;
mod memory_budget;
mod rate_limiter;
mod scheduler;


pub use backoff::{backoff_delay, delay_with_jitter, nominal_delay, MAX_JITTER_FRACTION};
pub use load_guard::{LoadGuard, LoadProbe, ProcLoadProbe};
pub use memory_budget::{MemoryBudget, MemoryPermit};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use scheduler::{OutcomeObserver, RunReport, Scheduler};

//! Fetcher configuration.
//!
//! Defaults mirror the limits the pipeline was tuned with. `from_env` loads a
//! `.env` file (if present) and reads `FINFETCH_*` overrides.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::cache::TtlPolicy;
use crate::errors::MarketDataError;
use crate::models::SourceVariant;

const ONE_MIB: u64 = 1024 * 1024;
const ONE_GIB: u64 = 1024 * ONE_MIB;

pub const DEFAULT_BATCH_SIZE: usize = 30;
pub const DEFAULT_GENERAL_CONCURRENCY: usize = 3;
pub const DEFAULT_TASK_MEMORY: u64 = 256 * ONE_MIB;
pub const DEFAULT_MEMORY_BUDGET: u64 = 2 * ONE_GIB;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// Scheduling defaults for one source variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSettings {
    /// Maximum tasks of this variant executing at once.
    pub concurrency: usize,
    /// Declared memory per task, in bytes.
    pub memory_estimate: u64,
    pub timeout: Duration,
    pub retries: u32,
    pub backoff_base: Duration,
    /// Token-bucket pacing. `None` means unlimited.
    pub requests_per_minute: Option<u32>,
}

impl VariantSettings {
    fn general() -> Self {
        Self {
            concurrency: DEFAULT_GENERAL_CONCURRENCY,
            memory_estimate: DEFAULT_TASK_MEMORY,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            requests_per_minute: None,
        }
    }

    fn exchange_latest() -> Self {
        Self {
            concurrency: 4,
            memory_estimate: 64 * ONE_MIB,
            requests_per_minute: Some(60),
            ..Self::general()
        }
    }

    fn exchange_historical() -> Self {
        Self {
            concurrency: 2,
            memory_estimate: DEFAULT_TASK_MEMORY,
            requests_per_minute: Some(30),
            ..Self::general()
        }
    }
}

/// Optional CPU-headroom guard.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadGuardConfig {
    /// Proceed only while system load is below this percentage.
    pub max_cpu_percent: f64,
    pub poll_interval: Duration,
}

/// Freshness cache settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Database file for persisted stores.
    pub path: Option<PathBuf>,
    /// When set, entries and history older than this are pruned on each fetch.
    pub retention_days: Option<u32>,
    pub ttl: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            retention_days: None,
            ttl: TtlPolicy::default(),
        }
    }
}

/// Top-level configuration of the fetch pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    /// Instruments per `General` task.
    pub batch_size: usize,
    /// Scheduler worker pool size.
    pub worker_count: usize,
    /// Global memory budget in bytes.
    pub memory_budget: u64,
    pub general: VariantSettings,
    pub exchange_latest: VariantSettings,
    pub exchange_historical: VariantSettings,
    pub load_guard: Option<LoadGuardConfig>,
    pub cache: CacheConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            general: VariantSettings::general(),
            exchange_latest: VariantSettings::exchange_latest(),
            exchange_historical: VariantSettings::exchange_historical(),
            load_guard: None,
            cache: CacheConfig::default(),
        }
    }
}

impl FetcherConfig {
    pub fn variant(&self, variant: SourceVariant) -> &VariantSettings {
        match variant {
            SourceVariant::General => &self.general,
            SourceVariant::ExchangeLatest => &self.exchange_latest,
            SourceVariant::ExchangeHistorical => &self.exchange_historical,
        }
    }

    pub fn variant_mut(&mut self, variant: SourceVariant) -> &mut VariantSettings {
        match variant {
            SourceVariant::General => &mut self.general,
            SourceVariant::ExchangeLatest => &mut self.exchange_latest,
            SourceVariant::ExchangeHistorical => &mut self.exchange_historical,
        }
    }

    /// Load `.env` if present, then read `FINFETCH_*` variables over the defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Invalid values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        set_parsed(&lookup, "FINFETCH_BATCH_SIZE", &mut config.batch_size);
        set_parsed(&lookup, "FINFETCH_WORKERS", &mut config.worker_count);
        set_parsed(&lookup, "FINFETCH_MEMORY_BUDGET_BYTES", &mut config.memory_budget);

        for variant in SourceVariant::ALL {
            let prefix = format!("FINFETCH_{}", variant.as_str());
            let settings = config.variant_mut(variant);
            set_parsed(&lookup, &format!("{}_CONCURRENCY", prefix), &mut settings.concurrency);
            set_parsed(&lookup, &format!("{}_TASK_MEMORY_BYTES", prefix), &mut settings.memory_estimate);
            set_millis(&lookup, &format!("{}_TIMEOUT_MS", prefix), &mut settings.timeout);
            set_parsed(&lookup, &format!("{}_RETRIES", prefix), &mut settings.retries);
            set_millis(&lookup, &format!("{}_BACKOFF_MS", prefix), &mut settings.backoff_base);
            if let Some(rpm) = parse_var::<u32>(&lookup, &format!("{}_REQUESTS_PER_MINUTE", prefix)) {
                settings.requests_per_minute = (rpm > 0).then_some(rpm);
            }
        }

        if let Some(max_cpu_percent) = parse_var::<f64>(&lookup, "FINFETCH_CPU_MAX_PERCENT") {
            let mut guard = LoadGuardConfig {
                max_cpu_percent,
                poll_interval: Duration::from_millis(500),
            };
            set_millis(&lookup, "FINFETCH_CPU_POLL_MS", &mut guard.poll_interval);
            config.load_guard = Some(guard);
        }

        set_parsed(&lookup, "FINFETCH_CACHE_ENABLED", &mut config.cache.enabled);
        if let Some(path) = lookup("FINFETCH_CACHE_PATH").filter(|p| !p.trim().is_empty()) {
            config.cache.path = Some(PathBuf::from(path.trim()));
        }
        if let Some(days) = parse_var::<u32>(&lookup, "FINFETCH_CACHE_RETENTION_DAYS") {
            config.cache.retention_days = (days > 0).then_some(days);
        }
        set_days(&lookup, "FINFETCH_TTL_LONG_TERM_DAYS", &mut config.cache.ttl.long_term);
        set_days(&lookup, "FINFETCH_TTL_MEDIUM_TERM_DAYS", &mut config.cache.ttl.medium_term);
        set_days(&lookup, "FINFETCH_TTL_SHORT_TERM_DAYS", &mut config.cache.ttl.short_term);

        config
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.batch_size == 0 {
            return Err(MarketDataError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(MarketDataError::Configuration(
                "worker_count must be at least 1".to_string(),
            ));
        }
        for variant in SourceVariant::ALL {
            if self.variant(variant).concurrency == 0 {
                return Err(MarketDataError::Configuration(format!(
                    "{} concurrency must be at least 1",
                    variant
                )));
            }
        }
        let ttl = &self.cache.ttl;
        for (tier, value) in [
            ("long_term", ttl.long_term),
            ("medium_term", ttl.medium_term),
            ("short_term", ttl.short_term),
        ] {
            if value < chrono::Duration::zero() {
                return Err(MarketDataError::Configuration(format!(
                    "{} TTL must not be negative",
                    tier
                )));
            }
        }
        if let Some(guard) = &self.load_guard {
            if !(guard.max_cpu_percent > 0.0 && guard.max_cpu_percent <= 100.0) {
                return Err(MarketDataError::Configuration(format!(
                    "CPU threshold {} is outside (0, 100]",
                    guard.max_cpu_percent
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value '{}' for {}", raw, key);
            None
        }
    }
}

fn set_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(value) = parse_var(lookup, key) {
        *target = value;
    }
}

fn set_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Duration) {
    if let Some(ms) = parse_var::<u64>(lookup, key) {
        *target = Duration::from_millis(ms);
    }
}

fn set_days(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut chrono::Duration) {
    let Some(days) = parse_var::<i64>(lookup, key) else {
        return;
    };
    match chrono::Duration::try_days(days) {
        Some(ttl) => *target = ttl,
        None => warn!("Ignoring out-of-range value '{}' for {}", days, key),
    }
}

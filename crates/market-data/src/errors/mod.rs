//! Error types and retry classification for the fetch pipeline.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all fetch operations
//! - [`RetryClass`]: Classification for determining whether a task attempt is retried

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

use crate::models::SourceVariant;

/// Errors that can occur while building, scheduling, or executing a fetch.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which the scheduler consults
/// after a failed attempt.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The request itself is malformed (empty identifiers, bad period, start after end).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An attribute alias is not in the alias table.
    #[error("Unsupported attribute: {0}")]
    UnsupportedAttribute(String),

    /// The interval is not one of 1d, 1wk, 1mo, 1y.
    #[error("Unsupported interval: {0}")]
    UnsupportedInterval(String),

    /// A single identifier could not be routed to any source.
    #[error("Cannot classify '{identifier}': {reason}")]
    Classification {
        identifier: String,
        reason: String,
    },

    /// The remap table could not be loaded.
    #[error("Remap table unavailable: {0}")]
    RemapUnavailable(String),

    /// A task attempt exceeded its timeout.
    #[error("Timeout after {timeout:?}: {variant}")]
    Timeout {
        variant: SourceVariant,
        timeout: Duration,
    },

    /// The source fetcher reported an error for the whole batch.
    #[error("Provider error: {variant} - {message}")]
    ProviderError {
        variant: SourceVariant,
        message: String,
    },

    /// The source fetcher panicked or its worker was torn down.
    #[error("Fetch aborted: {variant} - {message}")]
    FetchAborted {
        variant: SourceVariant,
        message: String,
    },

    /// No fetcher is registered for the task's variant.
    #[error("No fetcher registered for {variant}")]
    NoFetcher { variant: SourceVariant },

    /// The task's memory estimate can never fit in the configured budget.
    #[error("Memory estimate {requested} bytes exceeds budget of {budget} bytes")]
    MemoryEstimateExceedsBudget { requested: u64, budget: u64 },

    /// The freshness store failed; callers treat this as a cache miss.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Bad configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// ```
    /// use finfetch_market_data::errors::{MarketDataError, RetryClass};
    /// use finfetch_market_data::SourceVariant;
    ///
    /// let error = MarketDataError::ProviderError {
    ///     variant: SourceVariant::General,
    ///     message: "HTTP 502".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::NoFetcher { variant: SourceVariant::General };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient: the next attempt may succeed
            Self::Timeout { .. } | Self::ProviderError { .. } | Self::FetchAborted { .. } => {
                RetryClass::WithBackoff
            }

            // Terminal: retrying cannot change the outcome
            Self::InvalidRequest(_)
            | Self::UnsupportedAttribute(_)
            | Self::UnsupportedInterval(_)
            | Self::Classification { .. }
            | Self::RemapUnavailable(_)
            | Self::NoFetcher { .. }
            | Self::MemoryEstimateExceedsBudget { .. }
            | Self::Cache(_)
            | Self::Configuration(_) => RetryClass::Never,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_retries_with_backoff() {
        let error = MarketDataError::Timeout {
            variant: SourceVariant::ExchangeHistorical,
            timeout: Duration::from_secs(20),
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_provider_error_retries_with_backoff() {
        let error = MarketDataError::ProviderError {
            variant: SourceVariant::General,
            message: "Internal server error".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_aborted_fetch_retries_with_backoff() {
        let error = MarketDataError::FetchAborted {
            variant: SourceVariant::ExchangeLatest,
            message: "worker panicked".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_missing_fetcher_never_retries() {
        let error = MarketDataError::NoFetcher {
            variant: SourceVariant::General,
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_oversized_estimate_never_retries() {
        let error = MarketDataError::MemoryEstimateExceedsBudget {
            requested: 4 << 30,
            budget: 2 << 30,
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::Classification {
            identifier: "A$B".to_string(),
            reason: "invalid character '$'".to_string(),
        };
        assert_eq!(format!("{}", error), "Cannot classify 'A$B': invalid character '$'");

        let error = MarketDataError::NoFetcher {
            variant: SourceVariant::ExchangeLatest,
        };
        assert_eq!(format!("{}", error), "No fetcher registered for EXCHANGE_LATEST");
    }
}

//! Source fetcher trait definitions.

use crate::errors::MarketDataError;
use crate::models::{FetchBatch, SourceVariant};

/// Collaborator that talks to one external source.
///
/// `fetch` is a blocking call; the scheduler runs it on the blocking thread
/// pool under a timeout. An attempt that times out is abandoned, so the call
/// may keep running in the background with its result discarded.
///
/// # Example
///
/// ```ignore
/// use finfetch_market_data::provider::SourceFetcher;
///
/// struct ExchangeScraper;
///
/// impl SourceFetcher for ExchangeScraper {
///     fn id(&self) -> &'static str {
///         "EXCHANGE_SCRAPER"
///     }
///
///     fn variant(&self) -> SourceVariant {
///         SourceVariant::ExchangeLatest
///     }
///
///     fn fetch(&self, batch: &mut FetchBatch) -> Result<(), MarketDataError> {
///         for request in &mut batch.requests {
///             // fill request.record, then
///             request.mark_success();
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait SourceFetcher: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &'static str;

    /// The variant this fetcher serves.
    fn variant(&self) -> SourceVariant;

    /// Fill every request in the batch.
    ///
    /// Per-instrument problems are reported through `success`/`message` on
    /// the request. Returning `Err` fails the whole attempt and triggers a retry.
    fn fetch(&self, batch: &mut FetchBatch) -> Result<(), MarketDataError>;
}

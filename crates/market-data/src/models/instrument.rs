use std::fmt;

use serde::{Deserialize, Serialize};

use super::attribute::Attribute;
use super::record::IndicatorRecord;
use super::request::{DateRange, Interval};

/// Which external source (and mode) serves an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceVariant {
    /// General-purpose provider. Accepts batches.
    General,
    /// Domestic exchange, point-in-time quote. One instrument per task.
    ExchangeLatest,
    /// Domestic exchange, historical range. One instrument per task.
    ExchangeHistorical,
}

impl SourceVariant {
    pub const ALL: [SourceVariant; 3] = [
        SourceVariant::General,
        SourceVariant::ExchangeLatest,
        SourceVariant::ExchangeHistorical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::ExchangeLatest => "EXCHANGE_LATEST",
            Self::ExchangeHistorical => "EXCHANGE_HISTORICAL",
        }
    }

    /// Whether several instruments may share one task.
    pub fn is_batched(&self) -> bool {
        matches!(self, Self::General)
    }
}

impl fmt::Display for SourceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing type on the domestic exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingKind {
    #[default]
    Security,
    MutualFund,
}

/// Per-instrument work item handed to a source fetcher.
///
/// The fetcher fills `record`, flips `success` and may leave a `message`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentRequest {
    /// Identifier exactly as the caller supplied it (after normalization).
    pub original_id: String,
    /// Identifier the source understands (the general-provider symbol when remapped).
    pub resolved_id: String,
    pub listing: ListingKind,
    pub attributes: Vec<Attribute>,
    pub date_range: Option<DateRange>,
    /// Sampling interval the source should return rows at.
    pub interval: Interval,
    pub record: IndicatorRecord,
    pub success: bool,
    pub message: String,
}

impl InstrumentRequest {
    pub fn new(
        original_id: impl Into<String>,
        resolved_id: impl Into<String>,
        attributes: Vec<Attribute>,
        date_range: Option<DateRange>,
    ) -> Self {
        let resolved_id = resolved_id.into();
        Self {
            original_id: original_id.into(),
            record: IndicatorRecord::new(resolved_id.clone()),
            resolved_id,
            listing: ListingKind::default(),
            attributes,
            date_range,
            interval: Interval::default(),
            success: false,
            message: String::new(),
        }
    }

    pub fn with_listing(mut self, listing: ListingKind) -> Self {
        self.listing = listing;
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn mark_success(&mut self) {
        self.success = true;
        self.message.clear();
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.success = false;
        self.message = message.into();
    }
}

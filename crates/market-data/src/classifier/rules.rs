//! Format rules that route an identifier to a source variant.

use std::collections::HashMap;

use log::debug;

use crate::errors::MarketDataError;
use crate::models::{Attribute, DateRange, InstrumentRequest, ListingKind, SourceVariant};

use super::remap::RemapTable;
use super::traits::RemapSource;

/// Identifier prefix of exchange-listed mutual funds.
pub const FUND_PREFIX: &str = "126.";

/// Where a single identifier is sent and under which symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub variant: SourceVariant,
    pub resolved_id: String,
    pub listing: ListingKind,
    /// Display name known up front (from the remap table).
    pub name: Option<String>,
}

/// Per-run classification state: the loaded remap table plus a memo of routes.
///
/// Built once per fetch and dropped with it.
#[derive(Debug)]
pub struct ClassificationContext {
    remap: RemapTable,
    ranged: bool,
    memo: HashMap<String, Route>,
}

impl ClassificationContext {
    /// Load the remap table. Fails for the whole batch if the source fails.
    pub fn load(source: &dyn RemapSource, date_range: Option<DateRange>) -> Result<Self, MarketDataError> {
        Ok(Self::new(source.load()?, date_range))
    }

    pub fn new(remap: RemapTable, date_range: Option<DateRange>) -> Self {
        Self {
            remap,
            ranged: date_range.is_some_and(|r| r.spans_multiple_days()),
            memo: HashMap::new(),
        }
    }

    /// Route for an identifier, memoized for the lifetime of the context.
    pub fn route(&mut self, identifier: &str) -> Result<Route, MarketDataError> {
        if let Some(route) = self.memo.get(identifier) {
            return Ok(route.clone());
        }
        let route = route_identifier(identifier, &self.remap, self.ranged)?;
        self.memo.insert(identifier.to_string(), route.clone());
        Ok(route)
    }
}

/// Exchange listing implied by the identifier format, if any.
pub fn exchange_listing(identifier: &str) -> Option<ListingKind> {
    if identifier.starts_with(FUND_PREFIX) {
        Some(ListingKind::MutualFund)
    } else if !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit()) {
        Some(ListingKind::Security)
    } else {
        None
    }
}

fn validate(identifier: &str) -> Result<(), MarketDataError> {
    if identifier.is_empty() {
        return Err(MarketDataError::Classification {
            identifier: identifier.to_string(),
            reason: "empty identifier".to_string(),
        });
    }
    if let Some(bad) = identifier
        .chars()
        .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '^' | '=' | '_')))
    {
        return Err(MarketDataError::Classification {
            identifier: identifier.to_string(),
            reason: format!("invalid character '{}'", bad),
        });
    }
    Ok(())
}

/// Pure routing rule: depends only on the identifier, the remap table and
/// whether the request spans more than one day.
pub fn route_identifier(
    identifier: &str,
    remap: &RemapTable,
    ranged: bool,
) -> Result<Route, MarketDataError> {
    validate(identifier)?;

    let Some(listing) = exchange_listing(identifier) else {
        return Ok(Route {
            variant: SourceVariant::General,
            resolved_id: identifier.to_string(),
            listing: ListingKind::Security,
            name: None,
        });
    };

    // General provider wins whenever an equivalent exists.
    if let Some(entry) = remap.get(identifier) {
        debug!("Remapped {} -> {}", identifier, entry.symbol);
        return Ok(Route {
            variant: SourceVariant::General,
            resolved_id: entry.symbol.clone(),
            listing: ListingKind::Security,
            name: entry.name.clone(),
        });
    }

    let variant = if ranged {
        SourceVariant::ExchangeHistorical
    } else {
        SourceVariant::ExchangeLatest
    };

    Ok(Route {
        variant,
        resolved_id: identifier.to_string(),
        listing,
        name: None,
    })
}

/// An identifier that was routed successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedInstrument {
    pub identifier: String,
    pub variant: SourceVariant,
    pub request: InstrumentRequest,
}

/// Result of classifying a batch of identifiers.
#[derive(Debug, Default)]
pub struct Classification {
    /// In input order.
    pub classified: Vec<ClassifiedInstrument>,
    pub unclassified: Vec<(String, MarketDataError)>,
}

/// Turns normalized identifiers into per-variant instrument requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

impl Classifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(
        &self,
        context: &mut ClassificationContext,
        identifiers: &[String],
        attributes: &[Attribute],
        date_range: Option<DateRange>,
    ) -> Classification {
        let mut out = Classification::default();

        for identifier in identifiers {
            match context.route(identifier) {
                Ok(route) => {
                    let mut request = InstrumentRequest::new(
                        identifier.clone(),
                        route.resolved_id,
                        attributes.to_vec(),
                        date_range,
                    )
                    .with_listing(route.listing);
                    request.record.name = route.name;

                    out.classified.push(ClassifiedInstrument {
                        identifier: identifier.clone(),
                        variant: route.variant,
                        request,
                    });
                }
                Err(e) => {
                    debug!("Unclassified identifier {}: {}", identifier, e);
                    out.unclassified.push((identifier.clone(), e));
                }
            }
        }

        out
    }
}

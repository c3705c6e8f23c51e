//! Routing of identifiers to source variants.
//!
//! ```text
//! identifier ──► format rules ──► exchange format? ──► remap table hit? ──► General (remapped symbol)
//!                     │                  │                     │
//!                     │                  no                    no
//!                     │                  ▼                     ▼
//!                     │               General        ExchangeLatest / ExchangeHistorical
//!                     ▼
//!              invalid / empty ──► unclassified (per identifier)
//! ```
//!
//! The remap table is loaded once per run into a [`ClassificationContext`];
//! failing to load it aborts the whole batch.

mod remap;
mod rules;
mod traits;

pub use remap::{JsonRemapSource, RemapEntry, RemapTable, StaticRemapSource};
pub use rules::{
    exchange_listing, route_identifier, Classification, ClassificationContext,
    ClassifiedInstrument, Classifier, Route, FUND_PREFIX,
};
pub use traits::RemapSource;

//! Source fetcher abstractions.
//!
//! This module contains:
//! - The `SourceFetcher` trait that every external source adapter implements
//! - `FetcherSet`, the lookup from source variant to fetcher used by the scheduler
//!
//! Fetchers receive instruments that were already classified and, where
//! applicable, remapped. They never decide routing themselves.

mod traits;

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::models::SourceVariant;

pub use traits::SourceFetcher;

/// Registered fetchers keyed by the variant they serve.
#[derive(Clone, Default)]
pub struct FetcherSet {
    fetchers: HashMap<SourceVariant, Arc<dyn SourceFetcher>>,
}

impl FetcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher under its own variant. A later registration replaces an earlier one.
    pub fn register(&mut self, fetcher: Arc<dyn SourceFetcher>) {
        let variant = fetcher.variant();
        if let Some(previous) = self.fetchers.insert(variant, fetcher) {
            warn!("Replacing fetcher '{}' for {}", previous.id(), variant);
        }
    }

    pub fn with(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.register(fetcher);
        self
    }

    pub fn get(&self, variant: SourceVariant) -> Option<Arc<dyn SourceFetcher>> {
        self.fetchers.get(&variant).cloned()
    }

    pub fn contains(&self, variant: SourceVariant) -> bool {
        self.fetchers.contains_key(&variant)
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

impl std::fmt::Debug for FetcherSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self
            .fetchers
            .iter()
            .map(|(variant, fetcher)| (*variant, fetcher.id()))
            .collect();
        ids.sort();
        f.debug_struct("FetcherSet").field("fetchers", &ids).finish()
    }
}

//! Classification traits.

use crate::errors::MarketDataError;

use super::remap::RemapTable;

/// Supplier of the static remap table.
///
/// Loaded once per classification pass. A load failure is fatal for the
/// whole batch, unlike per-identifier classification errors.
pub trait RemapSource: Send + Sync {
    fn load(&self) -> Result<RemapTable, MarketDataError>;
}

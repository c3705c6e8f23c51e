use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Canonical attribute a caller can request for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Name,
    Isin,
    Summary,
    QuoteType,
    Currency,
    Price,
    Last,
    Open,
    High,
    Low,
    Volume,
    AvgVolume3m,
    ChangePct,
    MarketCap,
    ExpenseRatio,
    DividendYield,
    TrailingPe,
    ForwardPe,
    Beta,
}

/// Freshness class governing how long a cached attribute stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlTier {
    /// Valid forever once fetched.
    Immutable,
    LongTerm,
    MediumTerm,
    ShortTerm,
}

impl TtlTier {
    pub const ALL: [TtlTier; 4] = [
        TtlTier::Immutable,
        TtlTier::LongTerm,
        TtlTier::MediumTerm,
        TtlTier::ShortTerm,
    ];
}

/// Alias table: lower-cased user spelling -> canonical attribute.
const ALIASES: &[(&str, Attribute)] = &[
    ("name", Attribute::Name),
    ("isin", Attribute::Isin),
    ("code", Attribute::Isin),
    ("summary", Attribute::Summary),
    ("brief_summary", Attribute::Summary),
    ("description", Attribute::Summary),
    ("quote_type", Attribute::QuoteType),
    ("quotetype", Attribute::QuoteType),
    ("type", Attribute::QuoteType),
    ("currency", Attribute::Currency),
    ("price", Attribute::Price),
    ("last", Attribute::Last),
    ("close", Attribute::Last),
    ("open", Attribute::Open),
    ("high", Attribute::High),
    ("low", Attribute::Low),
    ("volume", Attribute::Volume),
    ("vol", Attribute::Volume),
    ("avg_volume_3m", Attribute::AvgVolume3m),
    ("avgvolume", Attribute::AvgVolume3m),
    ("avg_daily_volume", Attribute::AvgVolume3m),
    ("change_pct", Attribute::ChangePct),
    ("change", Attribute::ChangePct),
    ("change%", Attribute::ChangePct),
    ("market_cap", Attribute::MarketCap),
    ("marketcap", Attribute::MarketCap),
    ("cap", Attribute::MarketCap),
    ("expense_ratio", Attribute::ExpenseRatio),
    ("expense_rate", Attribute::ExpenseRatio),
    ("expense", Attribute::ExpenseRatio),
    ("dividend_yield", Attribute::DividendYield),
    ("dividendyield", Attribute::DividendYield),
    ("dividend", Attribute::DividendYield),
    ("yield", Attribute::DividendYield),
    ("trailing_pe", Attribute::TrailingPe),
    ("trailingpe", Attribute::TrailingPe),
    ("pe", Attribute::TrailingPe),
    ("forward_pe", Attribute::ForwardPe),
    ("forwardpe", Attribute::ForwardPe),
    ("beta", Attribute::Beta),
];

impl Attribute {
    pub const ALL: [Attribute; 19] = [
        Attribute::Name,
        Attribute::Isin,
        Attribute::Summary,
        Attribute::QuoteType,
        Attribute::Currency,
        Attribute::Price,
        Attribute::Last,
        Attribute::Open,
        Attribute::High,
        Attribute::Low,
        Attribute::Volume,
        Attribute::AvgVolume3m,
        Attribute::ChangePct,
        Attribute::MarketCap,
        Attribute::ExpenseRatio,
        Attribute::DividendYield,
        Attribute::TrailingPe,
        Attribute::ForwardPe,
        Attribute::Beta,
    ];

    /// Resolve a user-supplied alias (case-insensitive) to its canonical attribute.
    pub fn from_alias(alias: &str) -> Result<Self, MarketDataError> {
        let key = alias.trim().to_ascii_lowercase();
        ALIASES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, attr)| *attr)
            .ok_or_else(|| MarketDataError::UnsupportedAttribute(alias.trim().to_string()))
    }

    /// Canonical snake_case name, used as column key and in persisted snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Isin => "isin",
            Self::Summary => "summary",
            Self::QuoteType => "quote_type",
            Self::Currency => "currency",
            Self::Price => "price",
            Self::Last => "last",
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Volume => "volume",
            Self::AvgVolume3m => "avg_volume_3m",
            Self::ChangePct => "change_pct",
            Self::MarketCap => "market_cap",
            Self::ExpenseRatio => "expense_ratio",
            Self::DividendYield => "dividend_yield",
            Self::TrailingPe => "trailing_pe",
            Self::ForwardPe => "forward_pe",
            Self::Beta => "beta",
        }
    }

    /// Parse a canonical name (as produced by [`as_str`](Self::as_str)).
    pub fn from_canonical(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.as_str() == name)
    }

    /// The TTL tier that governs this attribute, or `None` for price-type
    /// attributes which are never served from the tiered cache.
    pub fn tier(&self) -> Option<TtlTier> {
        match self {
            Self::Name | Self::Isin | Self::QuoteType | Self::Currency => Some(TtlTier::Immutable),
            Self::Summary | Self::ExpenseRatio => Some(TtlTier::LongTerm),
            Self::DividendYield | Self::TrailingPe | Self::ForwardPe | Self::Beta => {
                Some(TtlTier::MediumTerm)
            }
            Self::AvgVolume3m | Self::MarketCap => Some(TtlTier::ShortTerm),
            Self::Price
            | Self::Last
            | Self::Open
            | Self::High
            | Self::Low
            | Self::Volume
            | Self::ChangePct => None,
        }
    }

    /// Whether the attribute carries one value per date rather than one per instrument.
    pub fn is_series(&self) -> bool {
        matches!(
            self,
            Self::Price
                | Self::Last
                | Self::Open
                | Self::High
                | Self::Low
                | Self::Volume
                | Self::ChangePct
                | Self::MarketCap
        )
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

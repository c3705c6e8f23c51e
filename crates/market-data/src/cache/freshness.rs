//! Tiered freshness rule and history coverage helpers.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Attribute, DateRange, TtlTier};

/// Time-to-live per expiring tier. Immutable attributes never expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub long_term: Duration,
    pub medium_term: Duration,
    pub short_term: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            long_term: Duration::days(365),
            medium_term: Duration::days(90),
            short_term: Duration::days(7),
        }
    }
}

impl TtlPolicy {
    /// `None` means the tier never expires.
    pub fn ttl(&self, tier: TtlTier) -> Option<Duration> {
        match tier {
            TtlTier::Immutable => None,
            TtlTier::LongTerm => Some(self.long_term),
            TtlTier::MediumTerm => Some(self.medium_term),
            TtlTier::ShortTerm => Some(self.short_term),
        }
    }
}

/// Last refresh time of each tier for one instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTimestamps {
    pub immutable: Option<DateTime<Utc>>,
    pub long_term: Option<DateTime<Utc>>,
    pub medium_term: Option<DateTime<Utc>>,
    pub short_term: Option<DateTime<Utc>>,
}

impl TierTimestamps {
    pub fn get(&self, tier: TtlTier) -> Option<DateTime<Utc>> {
        match tier {
            TtlTier::Immutable => self.immutable,
            TtlTier::LongTerm => self.long_term,
            TtlTier::MediumTerm => self.medium_term,
            TtlTier::ShortTerm => self.short_term,
        }
    }

    fn slot(&mut self, tier: TtlTier) -> &mut Option<DateTime<Utc>> {
        match tier {
            TtlTier::Immutable => &mut self.immutable,
            TtlTier::LongTerm => &mut self.long_term,
            TtlTier::MediumTerm => &mut self.medium_term,
            TtlTier::ShortTerm => &mut self.short_term,
        }
    }

    /// Advance exactly the tiers that contain at least one fetched attribute.
    pub fn advance(&mut self, fetched: &[Attribute], now: DateTime<Utc>) {
        for tier in TtlTier::ALL {
            if fetched.iter().any(|a| a.tier() == Some(tier)) {
                *self.slot(tier) = Some(now);
            }
        }
    }

    /// Whether every attribute is fresh at `now`.
    ///
    /// Price-type attributes have no tier and are always stale.
    pub fn is_fresh(&self, attributes: &[Attribute], now: DateTime<Utc>, policy: &TtlPolicy) -> bool {
        attributes.iter().all(|attr| {
            let Some(tier) = attr.tier() else {
                return false;
            };
            match (self.get(tier), policy.ttl(tier)) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(refreshed), Some(ttl)) => now - refreshed <= ttl,
            }
        })
    }
}

/// Weekday gaps in `cached` over `range`, as inclusive `(start, end)` runs.
///
/// Weekends never count as missing. `cached` need not be sorted.
pub fn missing_ranges(range: DateRange, cached: &[NaiveDate]) -> Vec<(NaiveDate, NaiveDate)> {
    let mut missing: Vec<(NaiveDate, NaiveDate)> = Vec::new();
    let mut previous_weekday: Option<NaiveDate> = None;

    for day in range.weekdays() {
        if cached.contains(&day) {
            previous_weekday = Some(day);
            continue;
        }
        match missing.last_mut() {
            // Extend the current run if nothing cached sits between it and `day`.
            Some((_, end)) if previous_weekday == Some(*end) => *end = day,
            _ => missing.push((day, day)),
        }
        previous_weekday = Some(day);
    }

    missing
}

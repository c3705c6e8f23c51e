//! Database models for the freshness cache.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use finfetch_market_data::{CacheEntry, HistoryPoint, TierTimestamps};

use crate::errors::{Result, StorageError};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database model for one instrument snapshot and its tier stamps.
#[derive(Queryable, Identifiable, Selectable, Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::indicator_snapshots)]
#[diesel(primary_key(symbol))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IndicatorSnapshotDB {
    pub symbol: String,
    pub snapshot_json: String,
    pub immutable_at: Option<String>,
    pub long_term_at: Option<String>,
    pub medium_term_at: Option<String>,
    pub short_term_at: Option<String>,
    pub last_fetched_at: String,
    pub created_at: String,
}

/// Database model for one dated history row.
#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::price_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PriceHistoryDB {
    pub symbol: String,
    pub date: String,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub volume: Option<i64>,
    pub change_pct: Option<f64>,
    pub market_cap: Option<String>,
}

/// Fixed-width UTC timestamp so text comparison orders like time.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("Bad timestamp '{}': {}", raw, e)))
}

fn parse_optional_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(parse_timestamp).transpose()
}

fn parse_decimal(raw: Option<&str>) -> Result<Option<Decimal>> {
    raw.map(|s| {
        Decimal::from_str(s)
            .map_err(|e| StorageError::SerializationError(format!("Bad decimal '{}': {}", s, e)))
    })
    .transpose()
}

impl IndicatorSnapshotDB {
    pub fn from_entry(symbol: &str, entry: &CacheEntry) -> Self {
        Self {
            symbol: symbol.to_string(),
            snapshot_json: entry.snapshot_json.clone(),
            immutable_at: entry.tiers.immutable.map(format_timestamp),
            long_term_at: entry.tiers.long_term.map(format_timestamp),
            medium_term_at: entry.tiers.medium_term.map(format_timestamp),
            short_term_at: entry.tiers.short_term.map(format_timestamp),
            last_fetched_at: format_timestamp(entry.last_fetched_at),
            created_at: format_timestamp(entry.created_at),
        }
    }
}

impl TryFrom<IndicatorSnapshotDB> for CacheEntry {
    type Error = StorageError;

    fn try_from(db: IndicatorSnapshotDB) -> Result<Self> {
        Ok(CacheEntry {
            tiers: TierTimestamps {
                immutable: parse_optional_timestamp(db.immutable_at.as_deref())?,
                long_term: parse_optional_timestamp(db.long_term_at.as_deref())?,
                medium_term: parse_optional_timestamp(db.medium_term_at.as_deref())?,
                short_term: parse_optional_timestamp(db.short_term_at.as_deref())?,
            },
            last_fetched_at: parse_timestamp(&db.last_fetched_at)?,
            created_at: parse_timestamp(&db.created_at)?,
            snapshot_json: db.snapshot_json,
        })
    }
}

impl PriceHistoryDB {
    pub fn from_point(symbol: &str, point: &HistoryPoint) -> Self {
        Self {
            symbol: symbol.to_string(),
            date: format_date(point.date),
            open: point.open.map(|d| d.to_string()),
            high: point.high.map(|d| d.to_string()),
            low: point.low.map(|d| d.to_string()),
            close: point.close.map(|d| d.to_string()),
            volume: point.volume.and_then(|v| i64::try_from(v).ok()),
            change_pct: point.change_pct,
            market_cap: point.market_cap.map(|d| d.to_string()),
        }
    }
}

impl TryFrom<PriceHistoryDB> for HistoryPoint {
    type Error = StorageError;

    fn try_from(db: PriceHistoryDB) -> Result<Self> {
        let date = NaiveDate::parse_from_str(&db.date, DATE_FORMAT).map_err(|e| {
            StorageError::SerializationError(format!("Bad date '{}': {}", db.date, e))
        })?;

        Ok(HistoryPoint {
            date,
            open: parse_decimal(db.open.as_deref())?,
            high: parse_decimal(db.high.as_deref())?,
            low: parse_decimal(db.low.as_deref())?,
            close: parse_decimal(db.close.as_deref())?,
            volume: db.volume.and_then(|v| u64::try_from(v).ok()),
            change_pct: db.change_pct,
            market_cap: parse_decimal(db.market_cap.as_deref())?,
        })
    }
}

//! Fetched instrument payload and its explicit field table.
//!
//! Snapshot serialization and "which fields were actually populated" both walk
//! [`FIELD_TABLE`], so adding a field means adding one row there and bumping
//! [`SNAPSHOT_VERSION`] if the encoding changes.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::attribute::Attribute;
use crate::errors::MarketDataError;

/// Version stamped into every serialized snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Payload filled in by a source fetcher.
///
/// Per-date fields are aligned with `dates`. A point-in-time record carries a
/// single date; an empty vector means the field was not obtained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorRecord {
    pub symbol: String,
    pub name: Option<String>,
    pub isin: Option<String>,
    pub summary: Option<String>,
    pub quote_type: Option<String>,
    pub currency: Option<String>,

    pub dates: Vec<NaiveDate>,
    pub price: Vec<Decimal>,
    pub last: Vec<Decimal>,
    pub open: Vec<Decimal>,
    pub high: Vec<Decimal>,
    pub low: Vec<Decimal>,
    pub volume: Vec<u64>,
    pub change_pct: Vec<f64>,
    pub market_cap: Vec<Decimal>,

    pub avg_volume_3m: Option<u64>,
    pub expense_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub beta: Option<f64>,
}

/// Type-erased value of a single record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Missing,
    Text(String),
    Number(f64),
    Count(u64),
    Amounts(Vec<Decimal>),
    Numbers(Vec<f64>),
    Counts(Vec<u64>),
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// One row of the field table: attribute name plus accessor pair.
pub struct FieldDescriptor {
    pub attribute: Attribute,
    pub get: fn(&IndicatorRecord) -> FieldValue,
    /// Returns `false` when the value kind does not match the field.
    pub set: fn(&mut IndicatorRecord, FieldValue) -> bool,
}

macro_rules! text_field {
    ($attr:expr, $field:ident) => {
        FieldDescriptor {
            attribute: $attr,
            get: |r| r.$field.clone().map_or(FieldValue::Missing, FieldValue::Text),
            set: |r, v| match v {
                FieldValue::Text(s) => {
                    r.$field = Some(s);
                    true
                }
                FieldValue::Missing => {
                    r.$field = None;
                    true
                }
                _ => false,
            },
        }
    };
}

macro_rules! number_field {
    ($attr:expr, $field:ident) => {
        FieldDescriptor {
            attribute: $attr,
            get: |r| r.$field.map_or(FieldValue::Missing, FieldValue::Number),
            set: |r, v| match v {
                FieldValue::Number(n) => {
                    r.$field = Some(n);
                    true
                }
                FieldValue::Missing => {
                    r.$field = None;
                    true
                }
                _ => false,
            },
        }
    };
}

macro_rules! series_field {
    ($attr:expr, $field:ident, $variant:ident) => {
        FieldDescriptor {
            attribute: $attr,
            get: |r| {
                if r.$field.is_empty() {
                    FieldValue::Missing
                } else {
                    FieldValue::$variant(r.$field.clone())
                }
            },
            set: |r, v| match v {
                FieldValue::$variant(values) => {
                    r.$field = values;
                    true
                }
                FieldValue::Missing => {
                    r.$field.clear();
                    true
                }
                _ => false,
            },
        }
    };
}

/// Versioned field table. Order matches [`Attribute::ALL`].
pub static FIELD_TABLE: [FieldDescriptor; 19] = [
    text_field!(Attribute::Name, name),
    text_field!(Attribute::Isin, isin),
    text_field!(Attribute::Summary, summary),
    text_field!(Attribute::QuoteType, quote_type),
    text_field!(Attribute::Currency, currency),
    series_field!(Attribute::Price, price, Amounts),
    series_field!(Attribute::Last, last, Amounts),
    series_field!(Attribute::Open, open, Amounts),
    series_field!(Attribute::High, high, Amounts),
    series_field!(Attribute::Low, low, Amounts),
    series_field!(Attribute::Volume, volume, Counts),
    FieldDescriptor {
        attribute: Attribute::AvgVolume3m,
        get: |r| r.avg_volume_3m.map_or(FieldValue::Missing, FieldValue::Count),
        set: |r, v| match v {
            FieldValue::Count(n) => {
                r.avg_volume_3m = Some(n);
                true
            }
            FieldValue::Missing => {
                r.avg_volume_3m = None;
                true
            }
            _ => false,
        },
    },
    series_field!(Attribute::ChangePct, change_pct, Numbers),
    series_field!(Attribute::MarketCap, market_cap, Amounts),
    number_field!(Attribute::ExpenseRatio, expense_ratio),
    number_field!(Attribute::DividendYield, dividend_yield),
    number_field!(Attribute::TrailingPe, trailing_pe),
    number_field!(Attribute::ForwardPe, forward_pe),
    number_field!(Attribute::Beta, beta),
];

/// Look up the descriptor for an attribute.
pub fn descriptor(attribute: Attribute) -> &'static FieldDescriptor {
    // FIELD_TABLE is ordered like Attribute::ALL; the test below guards it.
    let idx = Attribute::ALL
        .iter()
        .position(|a| *a == attribute)
        .unwrap_or_default();
    &FIELD_TABLE[idx]
}

#[derive(Serialize, Deserialize)]
struct SnapshotDoc {
    version: u32,
    symbol: String,
    #[serde(default)]
    dates: Vec<NaiveDate>,
    fields: BTreeMap<String, FieldValue>,
}

/// One cached OHLCV row for a calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<u64>,
    pub change_pct: Option<f64>,
    pub market_cap: Option<Decimal>,
}

impl IndicatorRecord {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, attribute: Attribute) -> FieldValue {
        (descriptor(attribute).get)(self)
    }

    /// Attributes that carry a non-default value.
    pub fn populated_fields(&self) -> Vec<Attribute> {
        FIELD_TABLE
            .iter()
            .filter(|d| !(d.get)(self).is_missing())
            .map(|d| d.attribute)
            .collect()
    }

    /// Serialize into the versioned snapshot format.
    pub fn to_snapshot(&self) -> Result<String, MarketDataError> {
        let fields = FIELD_TABLE
            .iter()
            .filter_map(|d| {
                let value = (d.get)(self);
                (!value.is_missing()).then(|| (d.attribute.as_str().to_string(), value))
            })
            .collect();

        let doc = SnapshotDoc {
            version: SNAPSHOT_VERSION,
            symbol: self.symbol.clone(),
            dates: self.dates.clone(),
            fields,
        };

        serde_json::to_string(&doc).map_err(|e| MarketDataError::Cache(e.to_string()))
    }

    /// Rebuild a record from a snapshot produced by [`to_snapshot`](Self::to_snapshot).
    pub fn from_snapshot(json: &str) -> Result<Self, MarketDataError> {
        let doc: SnapshotDoc =
            serde_json::from_str(json).map_err(|e| MarketDataError::Cache(e.to_string()))?;

        if doc.version != SNAPSHOT_VERSION {
            return Err(MarketDataError::Cache(format!(
                "Unsupported snapshot version {} (expected {})",
                doc.version, SNAPSHOT_VERSION
            )));
        }

        let mut record = IndicatorRecord::new(doc.symbol);
        record.dates = doc.dates;

        for (name, value) in doc.fields {
            let attribute = Attribute::from_canonical(&name).ok_or_else(|| {
                MarketDataError::Cache(format!("Unknown snapshot field '{}'", name))
            })?;
            if !(descriptor(attribute).set)(&mut record, value) {
                return Err(MarketDataError::Cache(format!(
                    "Snapshot field '{}' has the wrong kind",
                    name
                )));
            }
        }

        Ok(record)
    }

    /// Overlay every populated field of `newer` onto this record.
    ///
    /// When `newer` carries dates, all per-date fields are replaced together
    /// so they stay aligned with the new `dates`.
    pub fn merge_from(&mut self, newer: &IndicatorRecord) {
        if !newer.dates.is_empty() {
            self.dates = newer.dates.clone();
            for d in FIELD_TABLE.iter().filter(|d| d.attribute.is_series()) {
                (d.set)(self, (d.get)(newer));
            }
        }
        for d in FIELD_TABLE.iter().filter(|d| !d.attribute.is_series()) {
            let value = (d.get)(newer);
            if !value.is_missing() {
                (d.set)(self, value);
            }
        }
        if !newer.symbol.is_empty() {
            self.symbol = newer.symbol.clone();
        }
    }

    /// Per-date rows suitable for the history table.
    pub fn history_points(&self) -> Vec<HistoryPoint> {
        self.dates
            .iter()
            .enumerate()
            .map(|(i, date)| HistoryPoint {
                date: *date,
                open: self.open.get(i).copied(),
                high: self.high.get(i).copied(),
                low: self.low.get(i).copied(),
                close: self.last.get(i).or_else(|| self.price.get(i)).copied(),
                volume: self.volume.get(i).copied(),
                change_pct: self.change_pct.get(i).copied(),
                market_cap: self.market_cap.get(i).copied(),
            })
            .collect()
    }

    /// Overlay per-date fields from history rows (ascending by date).
    ///
    /// A column is only filled when every row carries a value for it, so the
    /// resulting vectors stay aligned with `dates`.
    pub fn apply_history(&mut self, points: &[HistoryPoint]) {
        fn column<T: Copy>(points: &[HistoryPoint], f: impl Fn(&HistoryPoint) -> Option<T>) -> Vec<T> {
            points.iter().map(&f).collect::<Option<Vec<T>>>().unwrap_or_default()
        }

        self.dates = points.iter().map(|p| p.date).collect();
        self.open = column(points, |p| p.open);
        self.high = column(points, |p| p.high);
        self.low = column(points, |p| p.low);
        self.last = column(points, |p| p.close);
        self.price = self.last.clone();
        self.volume = column(points, |p| p.volume);
        self.change_pct = column(points, |p| p.change_pct);
        self.market_cap = column(points, |p| p.market_cap);
    }
}

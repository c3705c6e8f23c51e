use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::attribute::Attribute;
use super::record::{FieldValue, IndicatorRecord};

/// Row label of the result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKey {
    Date(NaiveDate),
    /// Single row of a point-in-time request.
    Now,
}

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Text(String),
    Amount(Decimal),
    Number(f64),
    Count(u64),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            Self::Amount(d) => Some(*d),
            _ => None,
        }
    }

    /// Numeric view of the cell, for plotting or arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Amount(d) => d.to_f64(),
            Self::Number(n) => Some(*n),
            Self::Count(c) => c.to_f64(),
            Self::Empty | Self::Text(_) => None,
        }
    }
}

/// One `(instrument, attribute)` column, aligned with [`ResultTable::index`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub instrument: String,
    pub attribute: Attribute,
    pub values: Vec<CellValue>,
}

/// Tabular output of a fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub index: Vec<RowKey>,
    pub columns: Vec<TableColumn>,
}

impl ResultTable {
    /// Assemble the table from records already sorted into caller order.
    ///
    /// With `ranged == false` the table has a single [`RowKey::Now`] row and
    /// per-date fields contribute their most recent value.
    pub fn assemble(records: &[(String, IndicatorRecord)], attributes: &[Attribute], ranged: bool) -> Self {
        let index: Vec<RowKey> = if ranged {
            let dates: BTreeSet<NaiveDate> = records
                .iter()
                .flat_map(|(_, r)| r.dates.iter().copied())
                .collect();
            dates.into_iter().map(RowKey::Date).collect()
        } else {
            vec![RowKey::Now]
        };

        let mut columns = Vec::with_capacity(records.len() * attributes.len());
        for (instrument, record) in records {
            let positions: HashMap<NaiveDate, usize> = record
                .dates
                .iter()
                .enumerate()
                .map(|(i, d)| (*d, i))
                .collect();

            for attribute in attributes {
                let value = record.get(*attribute);
                let values = index
                    .iter()
                    .map(|row| match row {
                        RowKey::Now => cell_at(&value, None),
                        RowKey::Date(d) => match positions.get(d) {
                            Some(i) => cell_at(&value, Some(*i)),
                            None if attribute.is_series() => CellValue::Empty,
                            None => cell_at(&value, None),
                        },
                    })
                    .collect();

                columns.push(TableColumn {
                    instrument: instrument.clone(),
                    attribute: *attribute,
                    values,
                });
            }
        }

        Self { index, columns }
    }

    pub fn column(&self, instrument: &str, attribute: Attribute) -> Option<&TableColumn> {
        self.columns
            .iter()
            .find(|c| c.instrument == instrument && c.attribute == attribute)
    }

    /// Instruments present in the table, in column order.
    pub fn instruments(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for column in &self.columns {
            if out.last() != Some(&column.instrument.as_str()) {
                out.push(&column.instrument);
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Value at a row position. `None` picks the latest value of a series;
/// scalars are broadcast regardless of position.
fn cell_at(value: &FieldValue, position: Option<usize>) -> CellValue {
    fn pick<T: Copy>(values: &[T], position: Option<usize>) -> Option<T> {
        match position {
            Some(i) => values.get(i).copied(),
            None => values.last().copied(),
        }
    }

    match value {
        FieldValue::Missing => CellValue::Empty,
        FieldValue::Text(s) => CellValue::Text(s.clone()),
        FieldValue::Number(n) => CellValue::Number(*n),
        FieldValue::Count(n) => CellValue::Count(*n),
        FieldValue::Amounts(v) => pick(v, position).map_or(CellValue::Empty, CellValue::Amount),
        FieldValue::Numbers(v) => pick(v, position).map_or(CellValue::Empty, CellValue::Number),
        FieldValue::Counts(v) => pick(v, position).map_or(CellValue::Empty, CellValue::Count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn ranged_record(symbol: &str, days: &[u32], closes: &[Decimal]) -> IndicatorRecord {
        IndicatorRecord {
            symbol: symbol.to_string(),
            name: Some(format!("{} Corp", symbol)),
            dates: days.iter().map(|d| date(*d)).collect(),
            last: closes.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_point_in_time_table_has_single_row() {
        let record = IndicatorRecord {
            symbol: "AAPL".to_string(),
            dates: vec![date(2)],
            price: vec![dec!(185.64)],
            ..Default::default()
        };
        let table = ResultTable::assemble(
            &[("AAPL".to_string(), record)],
            &[Attribute::Price, Attribute::Beta],
            false,
        );

        assert_eq!(table.index, vec![RowKey::Now]);
        let price = table.column("AAPL", Attribute::Price).unwrap();
        assert_eq!(price.values, vec![CellValue::Amount(dec!(185.64))]);
        assert_eq!(price.values[0].as_f64(), Some(185.64));
        let beta = table.column("AAPL", Attribute::Beta).unwrap();
        assert_eq!(beta.values, vec![CellValue::Empty]);
        assert_eq!(beta.values[0].as_f64(), None);
    }

    #[test]
    fn test_ranged_table_aligns_dates_and_broadcasts_scalars() {
        let a = ranged_record("A", &[2, 3, 4], &[dec!(1), dec!(2), dec!(3)]);
        let b = ranged_record("B", &[3, 4], &[dec!(20), dec!(30)]);
        let table = ResultTable::assemble(
            &[("A".to_string(), a), ("B".to_string(), b)],
            &[Attribute::Last, Attribute::Name],
            true,
        );

        assert_eq!(
            table.index,
            vec![RowKey::Date(date(2)), RowKey::Date(date(3)), RowKey::Date(date(4))]
        );
        let b_last = table.column("B", Attribute::Last).unwrap();
        assert_eq!(
            b_last.values,
            vec![
                CellValue::Empty,
                CellValue::Amount(dec!(20)),
                CellValue::Amount(dec!(30))
            ]
        );
        let b_name = table.column("B", Attribute::Name).unwrap();
        assert!(b_name
            .values
            .iter()
            .all(|v| *v == CellValue::Text("B Corp".to_string())));
    }

    #[test]
    fn test_columns_follow_instrument_then_attribute_order() {
        let table = ResultTable::assemble(
            &[
                ("C".to_string(), IndicatorRecord::new("C")),
                ("A".to_string(), IndicatorRecord::new("A")),
            ],
            &[Attribute::Name, Attribute::Price],
            false,
        );
        let keys: Vec<_> = table
            .columns
            .iter()
            .map(|c| (c.instrument.as_str(), c.attribute))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("C", Attribute::Name),
                ("C", Attribute::Price),
                ("A", Attribute::Name),
                ("A", Attribute::Price),
            ]
        );
        assert_eq!(table.instruments(), vec!["C", "A"]);
    }
}

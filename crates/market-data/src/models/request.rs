use std::fmt;

use chrono::{Datelike, Days, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::attribute::Attribute;
use crate::errors::MarketDataError;

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, MarketDataError> {
        if start > end {
            return Err(MarketDataError::InvalidRequest(format!(
                "Start date {} must be on or before end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Range covers more than one calendar day.
    pub fn spans_multiple_days(&self) -> bool {
        self.end > self.start
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Weekdays (Mon-Fri) inside the range, ascending.
    pub fn weekdays(&self) -> impl Iterator<Item = NaiveDate> {
        self.start
            .iter_days()
            .take_while({
                let end = self.end;
                move |d| *d <= end
            })
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
    }
}

/// Sampling interval for historical requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    Weekly,
    #[serde(rename = "1mo")]
    Monthly,
    #[serde(rename = "1y")]
    Yearly,
}

impl Interval {
    pub fn parse(value: &str) -> Result<Self, MarketDataError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Self::Daily),
            "1wk" => Ok(Self::Weekly),
            "1mo" => Ok(Self::Monthly),
            "1y" => Ok(Self::Yearly),
            _ => Err(MarketDataError::UnsupportedInterval(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "1d",
            Self::Weekly => "1wk",
            Self::Monthly => "1mo",
            Self::Yearly => "1y",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated fetch request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    identifiers: Vec<String>,
    attributes: Vec<Attribute>,
    date_range: Option<DateRange>,
    interval: Interval,
}

impl FetchRequest {
    pub fn builder() -> FetchRequestBuilder {
        FetchRequestBuilder::default()
    }

    /// Normalized identifiers in caller order, without duplicates.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// `None` means a point-in-time ("latest") request.
    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }
}

/// Builder that normalizes raw caller input into a [`FetchRequest`].
#[derive(Debug, Clone, Default)]
pub struct FetchRequestBuilder {
    identifiers: Vec<String>,
    attributes: Vec<String>,
    period: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    interval: Option<String>,
}

impl FetchRequestBuilder {
    /// Add identifiers. Each item may itself be a comma or whitespace separated list.
    pub fn identifiers<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.identifiers
            .extend(identifiers.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn identifier(self, identifier: &str) -> Self {
        self.identifiers([identifier])
    }

    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attributes
            .extend(attributes.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Relative period such as `5d`, `3w`, `2m` (30 days each) or `1y` (365 days).
    pub fn period(mut self, period: impl Into<String>) -> Self {
        self.period = Some(period.into());
        self
    }

    pub fn start(mut self, start: NaiveDate) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
    }

    pub fn interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    pub fn build(self) -> Result<FetchRequest, MarketDataError> {
        self.build_at(Utc::now().date_naive())
    }

    /// Build with an explicit "today" (UTC) for relative periods.
    pub fn build_at(self, today: NaiveDate) -> Result<FetchRequest, MarketDataError> {
        let identifiers = normalize_identifiers(&self.identifiers);
        if identifiers.is_empty() {
            return Err(MarketDataError::InvalidRequest(
                "At least one identifier is required".to_string(),
            ));
        }

        let attributes = if self.attributes.is_empty() {
            vec![Attribute::Price]
        } else {
            let mut out = Vec::with_capacity(self.attributes.len());
            for alias in &self.attributes {
                let attr = Attribute::from_alias(alias)?;
                if !out.contains(&attr) {
                    out.push(attr);
                }
            }
            out
        };

        let date_range = resolve_range(self.period.as_deref(), self.start, self.end, today)?;

        let interval = match self.interval.as_deref() {
            Some(raw) => Interval::parse(raw)?,
            None => Interval::default(),
        };

        Ok(FetchRequest {
            identifiers,
            attributes,
            date_range,
            interval,
        })
    }
}

/// Split on commas/whitespace, trim, upper-case, drop empties and duplicates.
pub fn normalize_identifiers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for chunk in raw {
        for part in chunk
            .as_ref()
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let id = part.to_uppercase();
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

/// Parse `<n><unit>` with unit one of d, w, m, y into a range ending today.
pub fn parse_period(period: &str, today: NaiveDate) -> Result<DateRange, MarketDataError> {
    let invalid = || {
        MarketDataError::InvalidRequest(format!(
            "Invalid period '{}'. Use like '1d', '3w', '2m', '5y'",
            period
        ))
    };

    let trimmed = period.trim().to_ascii_lowercase();
    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let count: u64 = trimmed[..trimmed.len() - unit.len_utf8()]
        .trim()
        .parse()
        .map_err(|_| invalid())?;

    let days_per_unit = match unit {
        'd' => 1,
        'w' => 7,
        'm' => 30,
        'y' => 365,
        _ => return Err(invalid()),
    };
    let days = count.checked_mul(days_per_unit).ok_or_else(invalid)?;

    let start = today.checked_sub_days(Days::new(days)).ok_or_else(invalid)?;
    DateRange::new(start, today)
}

fn resolve_range(
    period: Option<&str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<Option<DateRange>, MarketDataError> {
    match (period, start, end) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(MarketDataError::InvalidRequest(
            "Provide either a period or start/end, not both".to_string(),
        )),
        (Some(p), None, None) => parse_period(p, today).map(Some),
        (None, Some(s), Some(e)) => DateRange::new(s, e).map(Some),
        (None, Some(s), None) => DateRange::new(s, s).map(Some),
        (None, None, Some(e)) => DateRange::new(e, e).map(Some),
        (None, None, None) => Ok(None),
    }
}

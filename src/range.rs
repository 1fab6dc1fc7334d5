/**
 * Inclusive date-range filtering on recorded dates
 */

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Anything that carries an asset store's recorded date.
pub trait RecordedDate {
    fn recorded_date(&self) -> DateTime<Utc>;
}

/// Inclusive interval; an absent bound is unbounded on that side.
///
/// `lower > upper` is allowed and simply matches nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub lower: Option<DateTime<Utc>>,
    pub upper: Option<DateTime<Utc>>,
}

impl DateInterval {
    pub fn new(lower: Option<DateTime<Utc>>, upper: Option<DateTime<Utc>>) -> Self {
        Self { lower, upper }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whole UTC days given as "YYYY-MM-DD": from the start of `from` through the
    /// last instant of `to`.
    pub fn from_days(from: Option<&str>, to: Option<&str>) -> Result<Self, ConfigError> {
        let lower = from
            .map(|text| {
                parse_day(text)?
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc())
                    .ok_or_else(|| ConfigError::InvalidDate(text.to_string()))
            })
            .transpose()?;
        let upper = to
            .map(|text| {
                parse_day(text)?
                    .and_hms_nano_opt(23, 59, 59, 999_999_999)
                    .map(|dt| dt.and_utc())
                    .ok_or_else(|| ConfigError::InvalidDate(text.to_string()))
            })
            .transpose()?;
        Ok(Self { lower, upper })
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.lower.map_or(true, |lower| date >= lower) && self.upper.map_or(true, |upper| date <= upper)
    }
}

fn parse_day(text: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate(text.to_string()))
}

/// Items whose recorded date falls inside `interval`, in their original order.
pub fn apply<T: RecordedDate + Clone>(items: &[T], interval: &DateInterval) -> Vec<T> {
    items
        .iter()
        .filter(|item| interval.contains(item.recorded_date()))
        .cloned()
        .collect()
}

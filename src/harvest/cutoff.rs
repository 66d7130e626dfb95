//! Date normalization and minimum-date cutoffs
//!
//! Feeds report timestamps in several shapes: unix seconds, unix milliseconds,
//! bare years, calendar dates and RFC 3339 strings. Everything is normalized to
//! `DateTime<Utc>` before it is compared or stored.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Digits in a millisecond timestamp from 2001 onward
const MILLIS_DIGITS: usize = 13;

/// Converts a unix timestamp in seconds or milliseconds
///
/// Values with fewer than 13 digits are taken as seconds.
pub fn convert_timestamp(value: i64) -> Option<DateTime<Utc>> {
    if value.unsigned_abs().to_string().len() >= MILLIS_DIGITS {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}

/// Converts a textual date into UTC
///
/// Supports `2020`, `2010-10-10`, `2020-01-01T00:00:00.000Z`, `1577836800`
/// and `1577836800000`.
pub fn convert_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive));
    }

    if value.len() == 4 {
        if let Ok(year) = value.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    value.parse::<i64>().ok().and_then(convert_timestamp)
}

/// Minimum-date filter applied after a harvest has finished
///
/// An absent cutoff keeps everything, and so does an item without a date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cutoff(Option<DateTime<Utc>>);

impl Cutoff {
    /// A cutoff that keeps every item
    pub fn none() -> Self {
        Self(None)
    }

    /// A cutoff at the given instant
    pub fn at(min: DateTime<Utc>) -> Self {
        Self(Some(min))
    }

    /// Parses an optional configured date
    pub fn parse(value: Option<&str>) -> Result<Self, String> {
        match value {
            None => Ok(Self::none()),
            Some(v) => convert_date(v)
                .map(Self::at)
                .ok_or_else(|| format!("invalid date '{}'", v)),
        }
    }

    /// The minimum date, if one is set
    pub fn min(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Returns true if an item dated `when` is at or after the cutoff
    pub fn keeps(&self, when: Option<DateTime<Utc>>) -> bool {
        match (self.0, when) {
            (Some(min), Some(when)) => when >= min,
            _ => true,
        }
    }
}

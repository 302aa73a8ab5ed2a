//! iCalendar value types (RFC 5545 §3.3).

use std::fmt;

use chrono::NaiveDate;

use super::{DateTime, Duration, UtcOffset};

/// PERIOD value (RFC 5545 §3.3.9).
///
/// A precise period of time, defined by either:
/// - An explicit start and end (both DATE-TIME)
/// - A start DATE-TIME and a DURATION
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    /// Explicit start and end times.
    Explicit {
        /// Start of the period.
        start: DateTime,
        /// End of the period.
        end: DateTime,
    },
    /// Start time and duration.
    Duration {
        /// Start of the period.
        start: DateTime,
        /// Duration of the period.
        duration: Duration,
    },
}

impl Period {
    /// Returns the start of the period.
    #[must_use]
    pub fn start(&self) -> &DateTime {
        match self {
            Self::Explicit { start, .. } | Self::Duration { start, .. } => start,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit { start, end } => write!(f, "{start}/{end}"),
            Self::Duration { start, duration } => write!(f, "{start}/{duration}"),
        }
    }
}

/// Parsed property value.
///
/// Only the value types the query engine inspects are typed; everything
/// else is kept as `Unknown` with the raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// TEXT value (unescaped).
    Text(String),
    /// INTEGER value.
    Integer(i32),
    /// DATE value.
    Date(NaiveDate),
    /// DATE-TIME value.
    DateTime(DateTime),
    /// Comma-separated DATE values (RDATE/EXDATE).
    DateList(Vec<NaiveDate>),
    /// Comma-separated DATE-TIME values (RDATE/EXDATE).
    DateTimeList(Vec<DateTime>),
    /// Comma-separated PERIOD values (RDATE).
    PeriodList(Vec<Period>),
    /// DURATION value.
    Duration(Duration),
    /// UTC-OFFSET value.
    UtcOffset(UtcOffset),
    /// RECUR value, kept as rule text for the recurrence engine.
    Recur(String),
    /// Any other value type, kept raw.
    Unknown(String),
}

impl Value {
    /// Returns the value as text, if it is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a date-time, if it is one.
    #[must_use]
    pub fn as_datetime(&self) -> Option<&DateTime> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Returns the value as a date, if it is one.
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the value as a duration, if it is one.
    #[must_use]
    pub fn as_duration(&self) -> Option<&Duration> {
        match self {
            Self::Duration(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the value as a UTC offset, if it is one.
    #[must_use]
    pub fn as_utc_offset(&self) -> Option<UtcOffset> {
        match self {
            Self::UtcOffset(o) => Some(*o),
            _ => None,
        }
    }

    /// Returns the rule text of a RECUR value.
    #[must_use]
    pub fn as_recur(&self) -> Option<&str> {
        match self {
            Self::Recur(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the VALUE type name used when serializing this value.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "TEXT",
            Self::Integer(_) => "INTEGER",
            Self::Date(_) | Self::DateList(_) => "DATE",
            Self::DateTime(_) | Self::DateTimeList(_) => "DATE-TIME",
            Self::PeriodList(_) => "PERIOD",
            Self::Duration(_) => "DURATION",
            Self::UtcOffset(_) => "UTC-OFFSET",
            Self::Recur(_) => "RECUR",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

//! Time ranges, occurrence intervals and value resolution.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

use super::timezone::{TimeZoneResolver, ZoneRef};
use crate::rfc::ical::core::{DateTimeForm, Property, Value};

/// A query window. An absent bound is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Creates a range from optional bounds.
    #[must_use]
    pub const fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Creates a range bounded on both sides.
    #[must_use]
    pub const fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// A range with no bounds.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Returns whether `end > start` when both bounds are present.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end > start,
            _ => true,
        }
    }

    /// Returns whether an instant falls in `[start, end)`.
    #[must_use]
    pub fn contains_instant(&self, instant: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| start <= instant) && self.end.is_none_or(|end| instant < end)
    }

    /// Returns whether `[start, end)` overlaps this range.
    #[must_use]
    pub fn overlaps_span(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.end.is_none_or(|range_end| start < range_end)
            && self.start.is_none_or(|range_start| end > range_start)
    }

    /// Returns whether a candidate starting at `start` can no longer
    /// overlap this range.
    #[must_use]
    pub fn is_past(&self, start: DateTime<Utc>) -> bool {
        self.end.is_some_and(|end| start >= end)
    }
}

/// The concrete time span of one occurrence, normalized to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    /// Start instant.
    pub start: DateTime<Utc>,
    /// End instant; `None` for a point in time.
    pub end: Option<DateTime<Utc>>,
}

impl Interval {
    /// Creates a zero-duration interval.
    #[must_use]
    pub const fn instant(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    /// Creates an interval, collapsing a non-positive span to an instant.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: (end > start).then_some(end),
        }
    }

    /// Returns the end instant, or the start for a point in time.
    #[must_use]
    pub fn end_or_start(&self) -> DateTime<Utc> {
        self.end.unwrap_or(self.start)
    }

    /// ## Summary
    /// Returns whether this interval overlaps the range.
    ///
    /// Spans use `start < range.end && end > range.start`. Points in time
    /// use `range.start <= start < range.end`.
    #[must_use]
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        match self.end {
            Some(end) => range.overlaps_span(self.start, end),
            None => range.contains_instant(self.start),
        }
    }
}

/// A date or date-time value anchored to an instant.
#[derive(Debug, Clone)]
pub struct ResolvedTime {
    /// The absolute instant.
    pub utc: DateTime<Utc>,
    /// The wall-clock time in `zone`.
    pub wall: NaiveDateTime,
    /// The zone the wall time is expressed in.
    pub zone: ZoneRef,
    /// Whether the value was a DATE.
    pub all_day: bool,
}

/// Everything needed to anchor the values of one calendar object.
#[derive(Debug, Clone, Copy)]
pub struct TimeContext<'a> {
    resolver: &'a TimeZoneResolver,
    floating: &'a ZoneRef,
}

impl<'a> TimeContext<'a> {
    /// Creates a context. `floating` is the zone floating values and DATE
    /// values are interpreted in: the query timezone, or UTC.
    #[must_use]
    pub const fn new(resolver: &'a TimeZoneResolver, floating: &'a ZoneRef) -> Self {
        Self { resolver, floating }
    }

    /// Returns the zone used for floating values.
    #[must_use]
    pub const fn floating_zone(&self) -> &'a ZoneRef {
        self.floating
    }

    /// ## Summary
    /// Selects the zone for a DATE-TIME form.
    ///
    /// An explicit TZID wins. An unresolvable TZID is logged and the value
    /// is treated as floating.
    #[must_use]
    pub fn zone_for(&self, form: &DateTimeForm) -> ZoneRef {
        match form {
            DateTimeForm::Utc => ZoneRef::Utc,
            DateTimeForm::Floating => self.floating.clone(),
            DateTimeForm::Zoned { tzid } => match self.resolver.resolve(tzid) {
                Ok(zone) => zone,
                Err(err) => {
                    tracing::warn!(tzid = %tzid, error = %err, "Treating unresolvable TZID as floating");
                    self.floating.clone()
                }
            },
        }
    }

    /// Anchors a wall time of the given form.
    #[must_use]
    pub fn resolve_datetime(&self, local: NaiveDateTime, form: &DateTimeForm) -> ResolvedTime {
        let zone = self.zone_for(form);
        ResolvedTime {
            utc: zone.to_utc(local),
            wall: local,
            zone,
            all_day: false,
        }
    }

    /// Anchors the start of a calendar day in the floating zone.
    #[must_use]
    pub fn resolve_date(&self, date: NaiveDate) -> ResolvedTime {
        let wall = date.and_time(NaiveTime::MIN);
        ResolvedTime {
            utc: self.floating.to_utc(wall),
            wall,
            zone: self.floating.clone(),
            all_day: true,
        }
    }

    /// ## Summary
    /// Resolves a DATE or DATE-TIME property to an instant.
    ///
    /// Returns `None` for any other value type. List values resolve their
    /// first element.
    #[must_use]
    pub fn resolve_value(&self, property: &Property) -> Option<ResolvedTime> {
        match &property.value {
            Value::DateTime(dt) => Some(self.resolve_datetime(dt.local, &dt.form)),
            Value::Date(date) => Some(self.resolve_date(*date)),
            Value::DateTimeList(list) => list
                .first()
                .map(|dt| self.resolve_datetime(dt.local, &dt.form)),
            Value::DateList(list) => list.first().map(|date| self.resolve_date(*date)),
            _ => None,
        }
    }

    /// Returns the full-day interval of a date in the floating zone.
    #[must_use]
    pub fn day_interval(&self, date: NaiveDate) -> Interval {
        let start = date.and_time(NaiveTime::MIN);
        Interval::new(
            self.floating.to_utc(start),
            self.floating.to_utc(add_days(start, 1)),
        )
    }
}

/// Shifts a wall time by a whole number of days.
pub(crate) fn add_days(wall: NaiveDateTime, days: i64) -> NaiveDateTime {
    wall.checked_add_signed(TimeDelta::days(days)).unwrap_or(wall)
}

//! VTIMEZONE component parsing and offset calculation (RFC 5545 §3.6.5).

use chrono::NaiveDateTime;
use rrule::RRuleSet;

use super::rule::{RecurrenceRule, wall_times};
use crate::error::{RfcError, RfcResult};
use crate::rfc::ical::core::{Component, ComponentKind, PropertyName, UtcOffset, Value};
use crate::rfc::ical::parse::parse;

/// Error during VTIMEZONE parsing.
#[derive(Debug, thiserror::Error)]
pub enum VTimezoneError {
    /// Component is not a VTIMEZONE.
    #[error("Expected a VTIMEZONE component, got {0}")]
    NotATimezone(String),

    /// Missing required TZID property.
    #[error("Missing required TZID property")]
    MissingTzid,

    /// Missing STANDARD or DAYLIGHT sub-component.
    #[error("VTIMEZONE must have at least one STANDARD or DAYLIGHT component")]
    NoObservances,

    /// Missing required property in observance.
    #[error("Missing required property {0} in {1} component")]
    MissingProperty(&'static str, &'static str),

    /// Invalid property value.
    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),
}

/// Kind of timezone observance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservanceKind {
    /// Standard time (e.g., EST, GMT).
    Standard,
    /// Daylight saving time (e.g., EDT, BST).
    Daylight,
}

impl ObservanceKind {
    /// Returns the component name for this observance kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Daylight => "DAYLIGHT",
        }
    }
}

/// A timezone observance rule (STANDARD or DAYLIGHT).
#[derive(Debug, Clone)]
pub struct Observance {
    /// Type of observance.
    pub kind: ObservanceKind,
    /// The offset from UTC while this observance is in effect.
    pub offset_to: UtcOffset,
    /// The offset from UTC before this observance takes effect.
    pub offset_from: UtcOffset,
    /// Local onset of the first transition.
    pub dtstart: NaiveDateTime,
    /// Additional onsets given by RDATE.
    pub rdates: Vec<NaiveDateTime>,
    /// Anchored RRULE for yearly transitions, if any.
    rules: Vec<(RecurrenceRule, RRuleSet)>,
}

impl Observance {
    /// Returns the latest onset at or before `local`, if the observance has
    /// started by then.
    fn latest_onset(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        if local < self.dtstart {
            return None;
        }

        let mut best = self.dtstart;
        for rdate in &self.rdates {
            if *rdate <= local && *rdate > best {
                best = *rdate;
            }
        }
        for (rule, set) in &self.rules {
            let latest = wall_times(set)
                .take_while(|onset| *onset <= local)
                .filter(|onset| {
                    let instant = (*onset - self.offset_from.as_delta()).and_utc();
                    rule.allows(*onset, instant)
                })
                .last();
            if let Some(onset) = latest
                && onset > best
            {
                best = onset;
            }
        }
        Some(best)
    }
}

/// A parsed VTIMEZONE component.
#[derive(Debug, Clone)]
pub struct VTimezone {
    /// Timezone identifier (TZID property).
    pub tzid: String,
    /// Observance rules (STANDARD and/or DAYLIGHT components).
    pub observances: Vec<Observance>,
    /// The source component, kept for re-emission in projected results.
    pub component: Component,
}

impl VTimezone {
    /// ## Summary
    /// Parses a VTIMEZONE component.
    ///
    /// ## Errors
    /// Returns an error if required properties are missing or invalid.
    pub fn parse(component: &Component) -> Result<Self, VTimezoneError> {
        if component.kind != ComponentKind::Timezone {
            return Err(VTimezoneError::NotATimezone(component.name.clone()));
        }

        let tzid = component
            .property(&PropertyName::Tzid)
            .map(|p| p.match_text().trim().to_string())
            .filter(|tzid| !tzid.is_empty())
            .ok_or(VTimezoneError::MissingTzid)?;

        let mut observances = Vec::new();
        for child in &component.children {
            let kind = match child.kind {
                ComponentKind::Standard => ObservanceKind::Standard,
                ComponentKind::Daylight => ObservanceKind::Daylight,
                // Skip unknown children
                _ => continue,
            };
            observances.push(parse_observance(child, kind)?);
        }

        if observances.is_empty() {
            return Err(VTimezoneError::NoObservances);
        }

        Ok(Self {
            tzid,
            observances,
            component: component.clone(),
        })
    }

    /// ## Summary
    /// Parses the first VTIMEZONE of an iCalendar body, as carried by a
    /// `CALDAV:timezone` element.
    ///
    /// ## Errors
    /// Returns `RfcError::ParseError` for malformed text,
    /// `RfcError::ValidationError` when the body holds no VTIMEZONE and
    /// `RfcError::VTimezoneError` for an invalid definition.
    pub fn from_calendar_text(text: &str) -> RfcResult<Self> {
        let ical = parse(text)?;
        let component = ical
            .timezones()
            .next()
            .ok_or_else(|| RfcError::ValidationError("calendar holds no VTIMEZONE".into()))?;
        Ok(Self::parse(component)?)
    }

    /// ## Summary
    /// Returns the UTC offset in effect at the given local datetime.
    ///
    /// Before every observance has started, the earliest observance's
    /// `offset_from` applies.
    #[must_use]
    pub fn offset_at(&self, local: NaiveDateTime) -> UtcOffset {
        self.observances
            .iter()
            .filter_map(|obs| obs.latest_onset(local).map(|onset| (onset, obs)))
            .max_by_key(|(onset, _)| *onset)
            .map_or_else(
                || {
                    self.observances
                        .iter()
                        .min_by_key(|o| o.dtstart)
                        .map_or(UtcOffset::UTC, |o| o.offset_from)
                },
                |(_, obs)| obs.offset_to,
            )
    }

    /// ## Summary
    /// Converts a local datetime to UTC using this timezone's rules.
    #[must_use]
    pub fn to_utc(&self, local: NaiveDateTime) -> NaiveDateTime {
        local - self.offset_at(local).as_delta()
    }

    /// ## Summary
    /// Converts a UTC datetime to local time using this timezone's rules.
    #[must_use]
    pub fn from_utc(&self, utc: NaiveDateTime) -> NaiveDateTime {
        let approx = utc + self.offset_at(utc).as_delta();
        utc + self.offset_at(approx).as_delta()
    }
}

fn parse_observance(component: &Component, kind: ObservanceKind) -> Result<Observance, VTimezoneError> {
    let kind_str = kind.as_str();

    let dtstart = component
        .property(&PropertyName::Dtstart)
        .and_then(|p| p.as_datetime())
        .map(|dt| dt.local)
        .ok_or(VTimezoneError::MissingProperty("DTSTART", kind_str))?;

    let offset = |name: PropertyName, label: &'static str| {
        component
            .property(&name)
            .ok_or(VTimezoneError::MissingProperty(label, kind_str))?
            .value
            .as_utc_offset()
            .ok_or_else(|| VTimezoneError::InvalidValue(label, kind_str.to_string()))
    };
    let offset_to = offset(PropertyName::Tzoffsetto, "TZOFFSETTO")?;
    let offset_from = offset(PropertyName::Tzoffsetfrom, "TZOFFSETFROM")?;

    let rdates = component
        .properties_named(&PropertyName::Rdate)
        .flat_map(|p| match &p.value {
            Value::DateTime(dt) => vec![dt.local],
            Value::DateTimeList(list) => list.iter().map(|dt| dt.local).collect(),
            _ => Vec::new(),
        })
        .collect();

    let mut rules = Vec::new();
    for prop in component.properties_named(&PropertyName::Rrule) {
        let Some(text) = prop.value.as_recur() else {
            continue;
        };
        let rule = RecurrenceRule::parse(text)
            .map_err(|err| VTimezoneError::InvalidValue("RRULE", err.to_string()))?;
        let set = rule
            .anchor(dtstart)
            .map_err(|err| VTimezoneError::InvalidValue("RRULE", err.to_string()))?;
        rules.push((rule, set));
    }

    Ok(Observance {
        kind,
        offset_to,
        offset_from,
        dtstart,
        rdates,
        rules,
    })
}

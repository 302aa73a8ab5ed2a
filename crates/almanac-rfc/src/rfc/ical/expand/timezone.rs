//! Timezone resolution and UTC conversion for iCalendar date-times.
//!
//! Uses ICU4X for Windows timezone ID to IANA mapping and timezone canonicalization.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use icu::time::zone::WindowsParser;
use icu::time::zone::iana::IanaParserExtended;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::vtimezone::{VTimezone, VTimezoneError};
use crate::rfc::ical::core::ICalendar;

/// Error during timezone conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// Unknown or invalid timezone identifier.
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    /// A VTIMEZONE definition could not be used.
    #[error("Invalid VTIMEZONE: {0}")]
    InvalidDefinition(#[from] VTimezoneError),
}

/// A resolved zone that local wall times can be anchored in.
#[derive(Debug, Clone)]
pub enum ZoneRef {
    /// Coordinated Universal Time.
    Utc,
    /// A zone from the IANA database.
    Iana(Tz),
    /// A zone defined by an in-object or inline VTIMEZONE.
    Custom(Arc<VTimezone>),
}

impl ZoneRef {
    /// ## Summary
    /// Converts a wall time in this zone to an absolute instant.
    ///
    /// A wall time inside a DST gap is shifted forward by one hour. A wall
    /// time inside a DST fold resolves to the earlier instant.
    #[must_use]
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Self::Utc => Utc.from_utc_datetime(&local),
            Self::Iana(tz) => match tz.from_local_datetime(&local) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                LocalResult::None => {
                    let shifted = local + TimeDelta::hours(1);
                    tz.from_local_datetime(&shifted)
                        .earliest()
                        .map_or_else(|| Utc.from_utc_datetime(&local), |dt| dt.with_timezone(&Utc))
                }
            },
            Self::Custom(vtz) => Utc.from_utc_datetime(&vtz.to_utc(local)),
        }
    }

    /// ## Summary
    /// Returns the wall time in this zone for an absolute instant.
    #[must_use]
    pub fn from_utc(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::Utc => instant.naive_utc(),
            Self::Iana(tz) => instant.with_timezone(tz).naive_local(),
            Self::Custom(vtz) => vtz.from_utc(instant.naive_utc()),
        }
    }

    /// Returns whether this is the UTC zone.
    #[must_use]
    pub const fn is_utc(&self) -> bool {
        matches!(self, Self::Utc)
    }
}

impl fmt::Display for ZoneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utc => f.write_str("UTC"),
            Self::Iana(tz) => f.write_str(tz.name()),
            Self::Custom(vtz) => f.write_str(&vtz.tzid),
        }
    }
}

/// Resolver for timezone identifiers.
///
/// Holds the VTIMEZONE definitions of one calendar object and falls back to
/// the IANA database for everything else. Read-only once built, so a single
/// resolver can be shared by every component of the object.
#[derive(Debug, Clone, Default)]
pub struct TimeZoneResolver {
    vtimezones: HashMap<String, Arc<VTimezone>>,
}

impl TimeZoneResolver {
    /// Creates a resolver that only knows the IANA database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ## Summary
    /// Builds a resolver with the object's `VTIMEZONE` components registered.
    ///
    /// Definitions that fail to parse are skipped with a warning; any TZID
    /// referring to them falls back to IANA resolution.
    #[must_use]
    pub fn for_calendar(ical: &ICalendar) -> Self {
        let mut resolver = Self::new();
        for component in ical.timezones() {
            match VTimezone::parse(component) {
                Ok(vtz) => resolver.register(vtz),
                Err(err) => tracing::warn!(error = %err, "Skipping invalid VTIMEZONE"),
            }
        }
        resolver
    }

    /// Registers a parsed VTIMEZONE definition.
    pub fn register(&mut self, vtimezone: VTimezone) {
        self.vtimezones
            .insert(vtimezone.tzid.clone(), Arc::new(vtimezone));
    }

    /// Checks if a TZID has a registered VTIMEZONE.
    #[must_use]
    pub fn has_vtimezone(&self, tzid: &str) -> bool {
        self.vtimezones.contains_key(tzid)
    }

    /// ## Summary
    /// Resolves a TZID to a zone.
    ///
    /// Registered VTIMEZONE definitions take precedence; otherwise the TZID
    /// is normalized and looked up in the IANA database.
    ///
    /// ## Errors
    /// Returns `ConversionError::UnknownTimezone` if the TZID cannot be resolved.
    pub fn resolve(&self, tzid: &str) -> Result<ZoneRef, ConversionError> {
        if let Some(vtz) = self.vtimezones.get(tzid) {
            return Ok(ZoneRef::Custom(Arc::clone(vtz)));
        }
        resolve_iana(tzid)
    }
}

/// ## Summary
/// Resolves a TZID against the IANA database only.
///
/// ## Errors
/// Returns `ConversionError::UnknownTimezone` if the TZID cannot be resolved.
pub fn resolve_iana(tzid: &str) -> Result<ZoneRef, ConversionError> {
    if tzid.eq_ignore_ascii_case("UTC") || tzid == "Etc/UTC" || tzid == "Z" {
        return Ok(ZoneRef::Utc);
    }
    let normalized = normalize_tzid(tzid);
    Tz::from_str(&normalized)
        .or_else(|_| Tz::from_str(tzid))
        .map(ZoneRef::Iana)
        .map_err(|_e| ConversionError::UnknownTimezone(tzid.to_string()))
}

/// Normalizes common CalDAV/iCalendar timezone identifiers to IANA names.
///
/// Handles vendor prefixes, Windows zone names and IANA aliases. Unknown
/// identifiers are returned with prefixes stripped.
#[must_use]
pub fn normalize_tzid(tzid: &str) -> String {
    let stripped = tzid
        .strip_prefix("/mozilla.org/")
        .or_else(|| tzid.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(tzid)
        .trim();

    if let Some(tz) = WindowsParser::new().parse(stripped, None) {
        let iana_parser = IanaParserExtended::new();
        if let Some(entry) = iana_parser.iter().find(|entry| entry.time_zone == tz) {
            return entry.canonical.to_string();
        }
    }

    // Aliases such as Europe/Kiev -> Europe/Kyiv
    let parsed = IanaParserExtended::new().parse(stripped);
    if parsed.time_zone != icu::time::TimeZone::UNKNOWN {
        return parsed.canonical.to_string();
    }

    stripped.to_string()
}

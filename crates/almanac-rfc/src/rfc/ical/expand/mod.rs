//! Time model and recurrence expansion.
//!
//! - `timezone`: TZID resolution (VTIMEZONE, IANA, Windows names) and
//!   wall-clock to UTC conversion
//! - `vtimezone`: custom VTIMEZONE definitions
//! - `interval`: resolved times, intervals, and the time-range overlap law
//! - `rule`: RRULE parsing on top of the `rrule` crate
//! - `expander`: occurrence generation for a recurring component and its
//!   RECURRENCE-ID overrides

mod expander;
mod interval;
mod rule;
mod timezone;
mod vtimezone;

pub use expander::{
    ExpansionError, ExpansionOptions, Expansion, Occurrence, Occurrences, RecurrenceSet,
};
pub use interval::{Interval, ResolvedTime, TimeContext, TimeRange};
pub use rule::{RecurrenceRule, UntilBound};
pub use timezone::{ConversionError, TimeZoneResolver, ZoneRef, normalize_tzid, resolve_iana};
pub use vtimezone::{Observance, ObservanceKind, VTimezone, VTimezoneError};

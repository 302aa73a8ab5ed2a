//! iCalendar core models (RFC 5545).
//!
//! Stored calendar objects are parsed into these types once per query and
//! discarded afterwards. Raw property values are preserved next to the
//! typed value so unmodified components serialize back byte-for-byte.

mod component;
mod datetime;
mod duration;
mod parameter;
mod property;
mod value;

pub use component::{Component, ComponentKind, ICalendar};
pub use datetime::{DateTime, DateTimeForm, UtcOffset};
pub use duration::Duration;
pub use parameter::Parameter;
pub use property::{ContentLine, Property, PropertyName};
pub use value::{Period, Value};

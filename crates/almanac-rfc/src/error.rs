use thiserror::Error;

use crate::rfc::dav::core::CollationError;
use crate::rfc::ical::expand::{ConversionError, ExpansionError, VTimezoneError};
use crate::rfc::ical::parse::ParseError;

/// Errors raised by the RFC layer.
#[derive(Error, Debug)]
pub enum RfcError {
    #[error("iCalendar parse error: {0}")]
    ParseError(#[from] ParseError),

    #[error("Timezone error: {0}")]
    TimezoneError(#[from] ConversionError),

    #[error("VTIMEZONE error: {0}")]
    VTimezoneError(#[from] VTimezoneError),

    #[error("Expansion error: {0}")]
    ExpansionError(#[from] ExpansionError),

    #[error("Collation error: {0}")]
    CollationError(#[from] CollationError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    CoreError(#[from] almanac_core::error::CoreError),
}

pub type RfcResult<T> = std::result::Result<T, RfcError>;

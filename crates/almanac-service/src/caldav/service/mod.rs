//! Collection-level report evaluation.

mod multiget;
mod query;

use almanac_core::config::Settings;
use almanac_rfc::rfc::dav::core::{
    ConflictingTimezoneSpecification, PreconditionError, QueryTimezone,
};
use almanac_rfc::rfc::ical::expand::{ExpansionOptions, VTimezone};
use thiserror::Error;

use crate::error::ServiceResult;
use crate::store::StoreError;

pub use multiget::{MultigetEntry, MultigetReport, MultigetStatus, evaluate_calendar_multiget};
pub use query::{ObjectFailure, QueryReport, QueryResult, evaluate_calendar_query};

/// Limits applied to one report, taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    /// Objects whose calendar data may be returned by one calendar-query.
    pub max_results_with_data: usize,
    /// Hrefs one calendar-multiget may name when calendar data is requested.
    pub max_multiget_hrefs_with_data: usize,
    /// Objects evaluated concurrently.
    pub concurrency: usize,
    pub expansion: ExpansionOptions,
}

impl From<&Settings> for QueryLimits {
    fn from(settings: &Settings) -> Self {
        Self {
            max_results_with_data: settings.query.max_results_with_data,
            max_multiget_hrefs_with_data: settings.query.max_multiget_hrefs_with_data,
            concurrency: settings.query.concurrency,
            expansion: ExpansionOptions {
                max_instances: settings.expansion.max_instances,
            },
        }
    }
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Failures that reject a whole report.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error(transparent)]
    ConflictingTimezoneSpecification(#[from] ConflictingTimezoneSpecification),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Unsupported collation: {0}")]
    UnsupportedCollation(String),

    #[error("More than {limit} results with calendar data")]
    ResultSetTooLarge { limit: usize },

    #[error("{requested} hrefs requested with calendar data, limit is {limit}")]
    TooManyHrefs { requested: usize, limit: usize },

    #[error("Query cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl QueryError {
    /// ## Summary
    /// Returns the condition code reported to the client.
    ///
    /// `None` for failures that are not the client's fault.
    #[must_use]
    pub fn precondition(&self) -> Option<PreconditionError> {
        match self {
            Self::InvalidTimezone(tzid) => Some(PreconditionError::ValidTimezone(tzid.clone())),
            Self::ConflictingTimezoneSpecification(err) => {
                Some(PreconditionError::ValidFilter(err.to_string()))
            }
            Self::InvalidFilter(message) => Some(PreconditionError::ValidFilter(message.clone())),
            Self::UnsupportedFilter(message) => {
                Some(PreconditionError::CalendarSupportedFilter(message.clone()))
            }
            Self::UnsupportedCollation(name) => {
                Some(PreconditionError::CalendarSupportedCollation(name.clone()))
            }
            Self::ResultSetTooLarge { .. } | Self::TooManyHrefs { .. } => {
                Some(PreconditionError::NumberOfMatchesWithinLimits)
            }
            Self::Cancelled | Self::Storage(_) => None,
        }
    }

    /// Returns the HTTP status a transport layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match (self.precondition(), self) {
            (Some(condition), _) => condition.status_code(),
            // Client closed request
            (None, Self::Cancelled) => 499,
            (None, _) => 500,
        }
    }
}

/// ## Summary
/// Builds the query timezone from the body of a `CALDAV:timezone` element
/// and a `CALDAV:timezone-id` value.
///
/// ## Errors
/// Returns `ServiceError::RfcError` if the inline body is not a valid
/// VTIMEZONE, and `ServiceError::QueryError` if both forms are given.
pub fn query_timezone(inline: Option<&str>, tzid: Option<String>) -> ServiceResult<Option<QueryTimezone>> {
    let inline = inline.map(VTimezone::from_calendar_text).transpose()?;
    Ok(QueryTimezone::from_parts(inline, tzid).map_err(QueryError::from)?)
}

/// Maps a rejected filter to the matching query failure.
pub(crate) fn filter_rejection(condition: PreconditionError) -> QueryError {
    match condition {
        PreconditionError::CalendarSupportedFilter(message) => QueryError::UnsupportedFilter(message),
        PreconditionError::CalendarSupportedCollation(name) => QueryError::UnsupportedCollation(name),
        PreconditionError::ValidFilter(message) => QueryError::InvalidFilter(message),
        other => QueryError::InvalidFilter(other.to_string()),
    }
}

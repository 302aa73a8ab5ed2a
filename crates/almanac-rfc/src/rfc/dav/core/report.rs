//! REPORT request types for `CalDAV`.

use super::filter::ComponentFilter;
use super::partial_retrieval::CalendarDataRequest;
use crate::rfc::ical::expand::VTimezone;

/// The timezone floating values are interpreted in (RFC 4791 §9.8,
/// RFC 7809 §5.2).
#[derive(Debug, Clone)]
pub enum QueryTimezone {
    /// An inline `CALDAV:timezone` VTIMEZONE definition.
    Inline(VTimezone),
    /// A `CALDAV:timezone-id` reference resolved through the registry.
    Id(String),
}

/// Both `timezone` and `timezone-id` were supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Only one of timezone or timezone-id may be specified")]
pub struct ConflictingTimezoneSpecification;

impl QueryTimezone {
    /// ## Summary
    /// Builds the query timezone from the two wire forms.
    ///
    /// ## Errors
    /// Returns [`ConflictingTimezoneSpecification`] if both are present.
    pub fn from_parts(
        inline: Option<VTimezone>,
        id: Option<String>,
    ) -> Result<Option<Self>, ConflictingTimezoneSpecification> {
        match (inline, id) {
            (Some(_), Some(_)) => Err(ConflictingTimezoneSpecification),
            (Some(vtz), None) => Ok(Some(Self::Inline(vtz))),
            (None, Some(id)) => Ok(Some(Self::Id(id))),
            (None, None) => Ok(None),
        }
    }
}

/// Properties requested for each result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportProperties {
    /// `DAV:getetag`
    pub etag: bool,
    /// `CALDAV:calendar-data`
    pub calendar_data: Option<CalendarDataRequest>,
}

impl ReportProperties {
    /// Requests only the ETag.
    #[must_use]
    pub fn etag_only() -> Self {
        Self {
            etag: true,
            calendar_data: None,
        }
    }

    /// Requests the ETag and full calendar data.
    #[must_use]
    pub fn with_data() -> Self {
        Self {
            etag: true,
            calendar_data: Some(CalendarDataRequest::full()),
        }
    }

    /// Sets the calendar-data request.
    #[must_use]
    pub fn with_calendar_data(mut self, request: CalendarDataRequest) -> Self {
        self.calendar_data = Some(request);
        self
    }

    /// Returns whether calendar data is requested.
    #[must_use]
    pub const fn wants_data(&self) -> bool {
        self.calendar_data.is_some()
    }
}

/// `CalDAV` `calendar-query` (RFC 4791 §7.8).
#[derive(Debug, Clone)]
pub struct CalendarQuery {
    /// Root filter, naming VCALENDAR.
    pub filter: ComponentFilter,
    /// Timezone for floating values.
    pub timezone: Option<QueryTimezone>,
    /// Properties to return.
    pub properties: ReportProperties,
}

impl CalendarQuery {
    /// Creates a query with the given root filter.
    #[must_use]
    pub fn new(filter: ComponentFilter) -> Self {
        Self {
            filter,
            timezone: None,
            properties: ReportProperties::etag_only(),
        }
    }

    /// Sets the query timezone.
    #[must_use]
    pub fn with_timezone(mut self, timezone: QueryTimezone) -> Self {
        self.timezone = Some(timezone);
        self
    }

    /// Sets the requested properties.
    #[must_use]
    pub fn with_properties(mut self, properties: ReportProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// `CalDAV` `calendar-multiget` (RFC 4791 §7.9).
#[derive(Debug, Clone)]
pub struct CalendarMultiget {
    /// Object names to retrieve, in request order.
    pub hrefs: Vec<String>,
    /// Properties to return.
    pub properties: ReportProperties,
}

impl CalendarMultiget {
    #[must_use]
    pub fn new(hrefs: Vec<String>, properties: ReportProperties) -> Self {
        Self { hrefs, properties }
    }
}

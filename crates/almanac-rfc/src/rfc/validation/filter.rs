//! ## Summary
//! Filter validation for `CalDAV` queries.
//!
//! RFC 4791 §7.8 requires returning `supported-filter` precondition (403) when
//! a REPORT request uses unsupported components, properties, or parameters,
//! and `valid-filter` (400) when the filter is malformed.

use crate::rfc::dav::core::{
    Collation, ComponentFilter, FilterNode, PreconditionError, PropertyFilter,
};
use crate::rfc::ical::core::ComponentKind;

/// ## Summary
/// Result of filter validation.
///
/// Contains information about the offending element if validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValidationResult {
    /// Filter is valid - all elements are supported
    Valid,
    /// The root filter does not name VCALENDAR
    InvalidRoot(String),
    /// Filter is invalid - contains unsupported component
    UnsupportedComponent(String),
    /// Filter is invalid - contains unsupported property
    UnsupportedProperty(String),
    /// Filter is invalid - contains unsupported parameter
    UnsupportedParameter(String),
    /// A text match names an unknown collation
    UnsupportedCollation(String),
    /// More than one time-range in one comp-filter
    MultipleTimeRanges(String),
    /// A time-range on a component that cannot carry one
    MisplacedTimeRange(String),
    /// A time-range whose end is not after its start
    InvalidTimeRange,
}

impl FilterValidationResult {
    /// Returns true if filter is valid
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns error message if invalid
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Valid => None,
            Self::InvalidRoot(name) => Some(format!("Filter root must be VCALENDAR, got {name}")),
            Self::UnsupportedComponent(name) => {
                Some(format!("Unsupported component in filter: {name}"))
            }
            Self::UnsupportedProperty(name) => {
                Some(format!("Unsupported property in filter: {name}"))
            }
            Self::UnsupportedParameter(name) => {
                Some(format!("Unsupported parameter in filter: {name}"))
            }
            Self::UnsupportedCollation(name) => Some(format!("Unsupported collation: {name}")),
            Self::MultipleTimeRanges(name) => {
                Some(format!("Only one time-range is allowed in comp-filter {name}"))
            }
            Self::MisplacedTimeRange(name) => {
                Some(format!("time-range is not allowed in comp-filter {name}"))
            }
            Self::InvalidTimeRange => Some("time-range end must be after start".to_string()),
        }
    }

    /// ## Summary
    /// Maps a failed validation to the condition code returned to the client.
    #[must_use]
    pub fn into_precondition(self) -> Option<PreconditionError> {
        let message = self.error_message()?;
        Some(match self {
            Self::Valid => return None,
            Self::UnsupportedComponent(_)
            | Self::UnsupportedProperty(_)
            | Self::UnsupportedParameter(_)
            | Self::MisplacedTimeRange(_) => PreconditionError::CalendarSupportedFilter(message),
            Self::UnsupportedCollation(name) => PreconditionError::CalendarSupportedCollation(name),
            Self::InvalidRoot(_) | Self::MultipleTimeRanges(_) | Self::InvalidTimeRange => {
                PreconditionError::ValidFilter(message)
            }
        })
    }
}

/// ## Summary
/// Components that may appear in a filter.
///
/// VCALENDAR is the root; VALARM, STANDARD and DAYLIGHT only appear nested.
const SUPPORTED_CALENDAR_COMPONENTS: &[&str] = &[
    "VCALENDAR", // Root container
    "VEVENT",    // Events (RFC 5545 §3.6.1)
    "VTODO",     // Tasks (RFC 5545 §3.6.2)
    "VJOURNAL",  // Journal entries (RFC 5545 §3.6.3)
    "VFREEBUSY", // Free/busy info (RFC 5545 §3.6.4)
    "VTIMEZONE", // Timezone definitions (RFC 5545 §3.6.5)
    "VALARM",    // Alarms (RFC 5545 §3.6.6)
    "STANDARD",
    "DAYLIGHT",
];

/// ## Summary
/// Properties that may be filtered on, plus any `X-` property.
const SUPPORTED_CALENDAR_PROPERTIES: &[&str] = &[
    "UID",
    "DTSTART",
    "DTEND",
    "DTSTAMP",
    "DUE",
    "DURATION",
    "COMPLETED",
    "RECURRENCE-ID",
    "SUMMARY",
    "DESCRIPTION",
    "LOCATION",
    "CATEGORIES",
    "STATUS",
    "CLASS",
    "CREATED",
    "LAST-MODIFIED",
    "ATTENDEE",
    "ORGANIZER",
    "PRIORITY",
    "PERCENT-COMPLETE",
    "RRULE",
    "RDATE",
    "EXDATE",
    "EXRULE",
    "TRANSP",
    "ATTACH",
    "RELATED-TO",
    "COMMENT",
    "CONTACT",
    "SEQUENCE",
    "URL",
    "ACTION",
    "TRIGGER",
    "TZID",
    "TZNAME",
    "VERSION",
    "PRODID",
    "CALSCALE",
    "METHOD",
];

/// ## Summary
/// Parameters that may be filtered on, plus any `X-` parameter.
const SUPPORTED_CALENDAR_PARAMETERS: &[&str] = &[
    "TZID", "VALUE", "ROLE", "PARTSTAT", "CN", "EMAIL", "RSVP", "RELATED", "CUTYPE", "LANGUAGE",
    "RANGE",
];

/// ## Summary
/// Validates a `CalDAV` filter before evaluation.
///
/// Checks that the root names VCALENDAR, that every component, property and
/// parameter is supported, that every collation is known, and that
/// time-ranges appear at most once per comp-filter, only on schedulable
/// components directly below VCALENDAR, and with `end > start`.
#[must_use]
pub fn validate_calendar_filter(filter: &ComponentFilter) -> FilterValidationResult {
    if !filter.name.eq_ignore_ascii_case("VCALENDAR") {
        return FilterValidationResult::InvalidRoot(filter.name.clone());
    }
    validate_comp_filter(filter, 0)
}

fn validate_comp_filter(comp_filter: &ComponentFilter, depth: usize) -> FilterValidationResult {
    if !is_supported_component(&comp_filter.name) {
        return FilterValidationResult::UnsupportedComponent(comp_filter.name.clone());
    }

    let ranges: Vec<_> = comp_filter.time_ranges().collect();
    if ranges.len() > 1 {
        return FilterValidationResult::MultipleTimeRanges(comp_filter.name.clone());
    }
    if let Some(range) = ranges.first() {
        if depth != 1 || !comp_filter.kind().is_schedulable() {
            return FilterValidationResult::MisplacedTimeRange(comp_filter.name.clone());
        }
        if !range.is_valid() {
            return FilterValidationResult::InvalidTimeRange;
        }
    }

    for child in &comp_filter.children {
        let result = match child {
            FilterNode::Property(prop_filter) => validate_prop_filter(prop_filter),
            FilterNode::Component(nested) => validate_comp_filter(nested, depth + 1),
            FilterNode::TimeRange(_) => FilterValidationResult::Valid,
        };
        if !result.is_valid() {
            return result;
        }
    }

    FilterValidationResult::Valid
}

fn validate_prop_filter(prop_filter: &PropertyFilter) -> FilterValidationResult {
    if !is_supported_property(&prop_filter.name) {
        return FilterValidationResult::UnsupportedProperty(prop_filter.name.clone());
    }

    if prop_filter.time_range.as_ref().is_some_and(|r| !r.is_valid()) {
        return FilterValidationResult::InvalidTimeRange;
    }

    let param_matches = prop_filter.param_filters.iter().filter_map(|p| p.text_match.as_ref());
    for text_match in prop_filter.text_match.iter().chain(param_matches) {
        if let Err(err) = Collation::from_name(text_match.collation.as_deref()) {
            tracing::debug!(error = %err, "Rejecting filter collation");
            return FilterValidationResult::UnsupportedCollation(
                text_match.collation.clone().unwrap_or_default(),
            );
        }
    }

    for param_filter in &prop_filter.param_filters {
        if !is_supported_parameter(&param_filter.name) {
            return FilterValidationResult::UnsupportedParameter(param_filter.name.clone());
        }
    }

    FilterValidationResult::Valid
}

fn is_supported_component(name: &str) -> bool {
    ComponentKind::parse(name) != ComponentKind::Unknown
        && SUPPORTED_CALENDAR_COMPONENTS
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
}

fn is_supported_property(name: &str) -> bool {
    is_extension(name)
        || SUPPORTED_CALENDAR_PROPERTIES
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
}

fn is_supported_parameter(name: &str) -> bool {
    is_extension(name)
        || SUPPORTED_CALENDAR_PARAMETERS
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
}

/// Vendor extensions (`X-` names) are always accepted.
fn is_extension(name: &str) -> bool {
    name.get(..2).is_some_and(|prefix| prefix.eq_ignore_ascii_case("X-"))
}

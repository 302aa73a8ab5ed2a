//! `WebDAV` and `CalDAV` condition codes for rejected queries.
//!
//! RFC 4918 §16 defines machine-readable error codes returned as XML
//! elements in error response bodies. Only the codes a calendar query can
//! produce are modelled here.

use thiserror::Error;

/// Namespace constants for precondition XML elements.
pub mod ns {
    /// `DAV:` namespace URI.
    pub const DAV: &str = "DAV:";
    /// `CalDAV` namespace URI.
    pub const CALDAV: &str = "urn:ietf:params:xml:ns:caldav";
}

/// A `WebDAV`/`CalDAV` precondition error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// `DAV:number-of-matches-within-limits` (403 Forbidden)
    ///
    /// The result set exceeds server-defined limits.
    #[error("Result set exceeds server limits")]
    NumberOfMatchesWithinLimits,

    /// `CALDAV:valid-filter` (400 Bad Request)
    ///
    /// The request is malformed. Contains a description.
    #[error("Invalid filter: {0}")]
    ValidFilter(String),

    /// `CALDAV:supported-filter` (403 Forbidden)
    ///
    /// The filter uses unsupported components/properties/parameters.
    #[error("Unsupported filter element: {0}")]
    CalendarSupportedFilter(String),

    /// `CALDAV:supported-collation` (403 Forbidden)
    ///
    /// The specified collation is not supported. Contains the collation name.
    #[error("Unsupported collation: {0}")]
    CalendarSupportedCollation(String),

    /// `CALDAV:valid-timezone` (403 Forbidden)
    ///
    /// The timezone is unknown or its definition is invalid.
    #[error("Invalid timezone: {0}")]
    ValidTimezone(String),
}

impl PreconditionError {
    /// Returns the HTTP status code for this precondition error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ValidFilter(_) => 400,
            Self::CalendarSupportedFilter(_)
            | Self::CalendarSupportedCollation(_)
            | Self::ValidTimezone(_)
            | Self::NumberOfMatchesWithinLimits => 403,
        }
    }

    /// Returns the XML element name for this precondition.
    #[must_use]
    pub const fn element_name(&self) -> &'static str {
        match self {
            Self::NumberOfMatchesWithinLimits => "number-of-matches-within-limits",
            Self::ValidFilter(_) => "valid-filter",
            Self::CalendarSupportedFilter(_) => "supported-filter",
            Self::CalendarSupportedCollation(_) => "supported-collation",
            Self::ValidTimezone(_) => "valid-timezone",
        }
    }

    /// Returns the XML namespace URI for this precondition element.
    #[must_use]
    pub const fn namespace(&self) -> &'static str {
        match self {
            Self::NumberOfMatchesWithinLimits => ns::DAV,
            Self::ValidFilter(_)
            | Self::CalendarSupportedFilter(_)
            | Self::CalendarSupportedCollation(_)
            | Self::ValidTimezone(_) => ns::CALDAV,
        }
    }

    /// Returns the `{namespace}element` form used in logs and CLI output.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{{{}}}{}", self.namespace(), self.element_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collation_condition() {
        let err = PreconditionError::CalendarSupportedCollation("i;foo".into());
        assert_eq!(err.element_name(), "supported-collation");
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.to_string(), "Unsupported collation: i;foo");
    }

    #[test]
    fn limit_condition_lives_in_dav_namespace() {
        let err = PreconditionError::NumberOfMatchesWithinLimits;
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.qualified_name(), "{DAV:}number-of-matches-within-limits");
    }
}

//! iCalendar property and content line types (RFC 5545 §3.1, §3.8).

use chrono::NaiveDate;

use super::{DateTime, Duration, Parameter, Value};

/// A raw content line as parsed from iCalendar text.
///
/// This is the low-level representation before value type resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    /// Property name (normalized to uppercase).
    pub name: String,
    /// Parameters in order of appearance.
    pub params: Vec<Parameter>,
    /// Raw value string (after unfolding, before unescaping).
    pub raw_value: String,
}

impl ContentLine {
    /// Returns the value of a parameter.
    #[must_use]
    pub fn get_param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))?
            .value()
    }
}

macro_rules! property_names {
    ($($variant:ident => $text:literal),* $(,)?) => {
        /// Property names the engine knows about.
        ///
        /// Anything else (including X- properties) is carried as `Other` with
        /// its uppercased name.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum PropertyName {
            $($variant,)*
            Other(String),
        }

        impl PropertyName {
            /// ## Summary
            /// Maps an external property name to its typed form (case-insensitive).
            #[must_use]
            pub fn parse(name: &str) -> Self {
                let upper = name.to_ascii_uppercase();
                match upper.as_str() {
                    $($text => Self::$variant,)*
                    _ => Self::Other(upper),
                }
            }

            /// Returns the canonical uppercase name.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $text,)*
                    Self::Other(name) => name,
                }
            }
        }
    };
}

property_names! {
    Action => "ACTION",
    Attendee => "ATTENDEE",
    Calscale => "CALSCALE",
    Categories => "CATEGORIES",
    Class => "CLASS",
    Comment => "COMMENT",
    Completed => "COMPLETED",
    Created => "CREATED",
    Description => "DESCRIPTION",
    Dtend => "DTEND",
    Dtstamp => "DTSTAMP",
    Dtstart => "DTSTART",
    Due => "DUE",
    Duration => "DURATION",
    Exdate => "EXDATE",
    Exrule => "EXRULE",
    LastModified => "LAST-MODIFIED",
    Location => "LOCATION",
    Method => "METHOD",
    Organizer => "ORGANIZER",
    PercentComplete => "PERCENT-COMPLETE",
    Priority => "PRIORITY",
    Prodid => "PRODID",
    Rdate => "RDATE",
    RecurrenceId => "RECURRENCE-ID",
    Rrule => "RRULE",
    Sequence => "SEQUENCE",
    Status => "STATUS",
    Summary => "SUMMARY",
    Transp => "TRANSP",
    Trigger => "TRIGGER",
    Tzid => "TZID",
    Tzname => "TZNAME",
    Tzoffsetfrom => "TZOFFSETFROM",
    Tzoffsetto => "TZOFFSETTO",
    Tzurl => "TZURL",
    Uid => "UID",
    Url => "URL",
    Version => "VERSION",
}

impl std::fmt::Display for PropertyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully parsed iCalendar property.
///
/// Contains the parsed value along with the original raw value
/// for round-trip fidelity.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property name.
    pub name: PropertyName,
    /// Parameters in order of appearance.
    pub params: Vec<Parameter>,
    /// Parsed value.
    pub value: Value,
    /// Original raw value string (for round-trip).
    pub raw_value: String,
}

impl Property {
    /// Creates a property with a text value.
    #[must_use]
    pub fn text(name: PropertyName, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            name,
            params: Vec::new(),
            raw_value: crate::rfc::ical::build::escape_text(&value),
            value: Value::Text(value),
        }
    }

    /// Creates a property with a date-time value, adding TZID when zoned.
    #[must_use]
    pub fn datetime(name: PropertyName, dt: DateTime) -> Self {
        let params = dt.tzid().map(Parameter::tzid).into_iter().collect();
        Self {
            name,
            params,
            raw_value: dt.to_string(),
            value: Value::DateTime(dt),
        }
    }

    /// Creates a property with a date value (adds VALUE=DATE).
    #[must_use]
    pub fn date(name: PropertyName, d: NaiveDate) -> Self {
        Self {
            name,
            params: vec![Parameter::value_type("DATE")],
            raw_value: d.format("%Y%m%d").to_string(),
            value: Value::Date(d),
        }
    }

    /// Creates a property with a duration value.
    #[must_use]
    pub fn duration(name: PropertyName, d: Duration) -> Self {
        Self {
            name,
            params: Vec::new(),
            raw_value: d.to_string(),
            value: Value::Duration(d),
        }
    }

    /// Returns the parameter with the given name.
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns the value of a parameter.
    #[must_use]
    pub fn get_param_value(&self, name: &str) -> Option<&str> {
        self.get_param(name)?.value()
    }

    /// Sets a parameter, replacing any existing parameter with the same name.
    pub fn set_param(&mut self, param: Parameter) {
        self.params.retain(|p| p.name != param.name);
        self.params.push(param);
    }

    /// Returns the value as text if it is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        self.value.as_text()
    }

    /// Returns the value as a datetime if it is a datetime value.
    #[must_use]
    pub fn as_datetime(&self) -> Option<&DateTime> {
        self.value.as_datetime()
    }

    /// Returns the value as a date if it is a date value.
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        self.value.as_date()
    }

    /// Returns the value as a duration if it is a duration value.
    #[must_use]
    pub fn as_duration(&self) -> Option<&Duration> {
        self.value.as_duration()
    }

    /// ## Summary
    /// Returns the text a text-match is evaluated against.
    ///
    /// TEXT values are compared unescaped; everything else by raw value.
    #[must_use]
    pub fn match_text(&self) -> &str {
        self.as_text().unwrap_or(&self.raw_value)
    }
}

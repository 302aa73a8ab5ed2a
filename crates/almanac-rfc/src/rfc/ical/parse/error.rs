//! Errors raised while reading iCalendar text.

use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

/// A parse failure with its 1-based position in the unfolded text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {line}, column {column}{}", context_suffix(.context.as_deref()))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub column: usize,
    /// Offending input or expectation, when known.
    pub context: Option<String>,
}

fn context_suffix(context: Option<&str>) -> String {
    context.map(|ctx| format!(": {ctx}")).unwrap_or_default()
}

impl ParseError {
    #[must_use]
    pub fn new(kind: ParseErrorKind, line: usize, column: usize) -> Self {
        Self {
            kind,
            line,
            column,
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("invalid property name")]
    InvalidPropertyName,
    #[error("missing property name")]
    MissingPropertyName,
    #[error("missing colon separator")]
    MissingColon,
    #[error("invalid parameter format")]
    InvalidParameter,
    #[error("unclosed quoted string")]
    UnclosedQuote,
    #[error("invalid date format")]
    InvalidDate,
    #[error("invalid date-time format")]
    InvalidDateTime,
    #[error("invalid duration format")]
    InvalidDuration,
    #[error("invalid UTC offset format")]
    InvalidUtcOffset,
    #[error("invalid period format")]
    InvalidPeriod,
    #[error("invalid integer value")]
    InvalidInteger,
    /// Content before the first BEGIN, or a body that is not a VCALENDAR.
    #[error("missing BEGIN line")]
    MissingBegin,
    #[error("missing END line")]
    MissingEnd,
    /// END names a different component than the innermost open BEGIN.
    #[error("mismatched BEGIN/END")]
    MismatchedComponent,
}

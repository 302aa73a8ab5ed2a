//! Text-match evaluation with RFC 4790 collations.

use std::borrow::Cow;

use icu::casemap::CaseMapper;

use super::filter::{MatchType, TextMatch};
use super::precondition::PreconditionError;

/// Error type for collation operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollationError {
    /// The requested collation is not supported.
    /// Per RFC 4791 §7.5.1, the server MUST respond with a
    /// `CALDAV:supported-collation` precondition error.
    #[error("unsupported collation: {0}")]
    UnsupportedCollation(String),
}

impl CollationError {
    /// Converts this error to a `CalDAV` precondition error.
    #[must_use]
    pub fn into_precondition(self) -> PreconditionError {
        match self {
            Self::UnsupportedCollation(collation) => {
                PreconditionError::CalendarSupportedCollation(collation)
            }
        }
    }
}

/// Supported collations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collation {
    /// Case-sensitive (i;octet).
    Octet,
    /// ASCII-only casemap (i;ascii-casemap).
    AsciiCasemap,
    /// Unicode casemap (i;unicode-casemap).
    #[default]
    UnicodeCasemap,
}

impl Collation {
    /// ## Summary
    /// Resolves a collation name. An absent name is `i;unicode-casemap`.
    ///
    /// ## Errors
    /// Returns [`CollationError::UnsupportedCollation`] if the collation is unknown.
    pub fn from_name(name: Option<&str>) -> Result<Self, CollationError> {
        match name {
            Some("i;octet") => Ok(Self::Octet),
            Some("i;unicode-casemap") | None => Ok(Self::UnicodeCasemap),
            Some("i;ascii-casemap") => Ok(Self::AsciiCasemap),
            Some(unsupported) => Err(CollationError::UnsupportedCollation(unsupported.to_owned())),
        }
    }

    /// Returns the collation identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Octet => "i;octet",
            Self::AsciiCasemap => "i;ascii-casemap",
            Self::UnicodeCasemap => "i;unicode-casemap",
        }
    }

    /// ## Summary
    /// Folds text for comparison under this collation.
    ///
    /// `i;unicode-casemap` uses ICU case folding, so `ß` compares equal to
    /// `ss`. `i;ascii-casemap` only folds ASCII letters.
    #[must_use]
    pub fn fold(self, text: &str) -> Cow<'_, str> {
        match self {
            Self::Octet => Cow::Borrowed(text),
            Self::AsciiCasemap => Cow::Owned(text.to_ascii_lowercase()),
            Self::UnicodeCasemap => Cow::Owned(CaseMapper::new().fold_string(text).into_owned()),
        }
    }
}

impl TextMatch {
    /// ## Summary
    /// Returns the collation this match uses.
    ///
    /// ## Errors
    /// Returns [`CollationError::UnsupportedCollation`] if the collation is unknown.
    pub fn resolve_collation(&self) -> Result<Collation, CollationError> {
        Collation::from_name(self.collation.as_deref())
    }

    /// ## Summary
    /// Evaluates the match against a candidate value, applying `negate`.
    ///
    /// ## Errors
    /// Returns [`CollationError::UnsupportedCollation`] if the collation is unknown.
    pub fn matches(&self, candidate: &str) -> Result<bool, CollationError> {
        let collation = self.resolve_collation()?;
        let needle = collation.fold(&self.value);
        let haystack = collation.fold(candidate);
        let hit = match self.match_type {
            MatchType::Contains => haystack.contains(needle.as_ref()),
            MatchType::Equals => haystack == needle,
            MatchType::StartsWith => haystack.starts_with(needle.as_ref()),
            MatchType::EndsWith => haystack.ends_with(needle.as_ref()),
        };
        Ok(hit != self.negate)
    }
}

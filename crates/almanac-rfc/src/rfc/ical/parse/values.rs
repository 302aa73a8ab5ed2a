//! Value parsers for the iCalendar types the query engine inspects (RFC 5545 §3.3).
#![expect(
    clippy::map_err_ignore,
    reason = "Numeric parse failures map to a positional ParseError, the source error carries nothing useful"
)]

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::error::{ParseError, ParseErrorKind, ParseResult};
use crate::rfc::ical::core::{DateTime, Duration, Period, UtcOffset};

/// Parses a DATE value (RFC 5545 §3.3.4).
///
/// Format: `YYYYMMDD`
///
/// ## Errors
/// Returns an error if the string is not a valid calendar date.
pub fn parse_date(s: &str, line: usize, col: usize) -> ParseResult<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::new(ParseErrorKind::InvalidDate, line, col)
            .with_context(format!("expected YYYYMMDD, got '{s}'")));
    }
    let no_such_date = || {
        ParseError::new(ParseErrorKind::InvalidDate, line, col)
            .with_context(format!("no such date '{s}'"))
    };
    let year: i32 = s[0..4].parse().map_err(|_| no_such_date())?;
    let month: u32 = s[4..6].parse().map_err(|_| no_such_date())?;
    let day: u32 = s[6..8].parse().map_err(|_| no_such_date())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(no_such_date)
}

/// Parses a DATE-TIME value (RFC 5545 §3.3.5).
///
/// Format: `YYYYMMDDTHHMMSS[Z]`. A trailing `Z` yields a UTC value; otherwise
/// the value is zoned when `tzid` is given and floating when not.
///
/// ## Errors
/// Returns an error if the string is not a valid date-time.
pub fn parse_datetime(
    s: &str,
    tzid: Option<&str>,
    line: usize,
    col: usize,
) -> ParseResult<DateTime> {
    let invalid = || {
        ParseError::new(ParseErrorKind::InvalidDateTime, line, col)
            .with_context(format!("expected YYYYMMDDTHHMMSS[Z], got '{s}'"))
    };

    let (body, is_utc) = match s.strip_suffix(['Z', 'z']) {
        Some(body) => (body, true),
        None => (s, false),
    };
    let (date_part, time_part) = body.split_once(['T', 't']).ok_or_else(invalid)?;
    if time_part.len() != 6 || !time_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let date = parse_date(date_part, line, col).map_err(|_| invalid())?;
    let hour: u32 = time_part[0..2].parse().map_err(|_| invalid())?;
    let minute: u32 = time_part[2..4].parse().map_err(|_| invalid())?;
    // Leap seconds are clamped to :59.
    let second: u32 = time_part[4..6].parse::<u32>().map_err(|_| invalid())?.min(59);
    let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid)?;
    let local = NaiveDateTime::new(date, time);

    Ok(match (is_utc, tzid) {
        (true, _) => DateTime::utc(local),
        (false, Some(tzid)) => DateTime::zoned(local, tzid),
        (false, None) => DateTime::floating(local),
    })
}

/// Parses a UTC-OFFSET value (RFC 5545 §3.3.14).
///
/// Format: `(+|-)HHMM[SS]`
///
/// ## Errors
/// Returns an error if the string is not a valid offset.
pub fn parse_utc_offset(s: &str, line: usize, col: usize) -> ParseResult<UtcOffset> {
    let invalid = || {
        ParseError::new(ParseErrorKind::InvalidUtcOffset, line, col)
            .with_context(format!("expected (+|-)HHMM[SS], got '{s}'"))
    };

    let (sign, digits) = if let Some(rest) = s.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = s.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };

    if !(digits.len() == 4 || digits.len() == 6) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[0..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..4].parse().map_err(|_| invalid())?;
    let seconds: i32 = if digits.len() == 6 {
        digits[4..6].parse().map_err(|_| invalid())?
    } else {
        0
    };
    if minutes > 59 || seconds > 59 {
        return Err(invalid());
    }

    Ok(UtcOffset::from_seconds(
        sign * (hours * 3600 + minutes * 60 + seconds),
    ))
}

/// Parses a DURATION value (RFC 5545 §3.3.6).
///
/// Format: `[+|-]P(nW | nD[T[nH][nM][nS]] | T[nH][nM][nS])`
///
/// ## Errors
/// Returns an error if the string is not a valid duration.
pub fn parse_duration(s: &str, line: usize, col: usize) -> ParseResult<Duration> {
    let invalid = || {
        ParseError::new(ParseErrorKind::InvalidDuration, line, col)
            .with_context(format!("invalid duration '{s}'"))
    };

    let (negative, rest) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else {
        (false, s.strip_prefix('+').unwrap_or(s))
    };
    let rest = rest.strip_prefix(['P', 'p']).ok_or_else(invalid)?;
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut duration = Duration {
        negative,
        ..Duration::zero()
    };
    let mut in_time = false;
    let mut saw_component = false;
    let mut number = String::new();

    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            'T' if !in_time && number.is_empty() => in_time = true,
            d if d.is_ascii_digit() => number.push(d),
            unit => {
                let value: u32 = number.parse().map_err(|_| invalid())?;
                number.clear();
                match (unit, in_time) {
                    ('W', false) => duration.weeks = value,
                    ('D', false) => duration.days = value,
                    ('H', true) => duration.hours = value,
                    ('M', true) => duration.minutes = value,
                    ('S', true) => duration.seconds = value,
                    _ => return Err(invalid()),
                }
                saw_component = true;
            }
        }
    }

    if !number.is_empty() || !saw_component {
        return Err(invalid());
    }

    Ok(duration)
}

/// Parses a PERIOD value (RFC 5545 §3.3.9).
///
/// Format: `start/end` or `start/duration`
///
/// ## Errors
/// Returns an error if either half is malformed.
pub fn parse_period(
    s: &str,
    tzid: Option<&str>,
    line: usize,
    col: usize,
) -> ParseResult<Period> {
    let (start, end) = s.split_once('/').ok_or_else(|| {
        ParseError::new(ParseErrorKind::InvalidPeriod, line, col)
            .with_context(format!("missing '/' in '{s}'"))
    })?;

    let start = parse_datetime(start, tzid, line, col)?;
    if end.starts_with(['P', 'p', '+', '-']) {
        let duration = parse_duration(end, line, col)?;
        Ok(Period::Duration { start, duration })
    } else {
        let end = parse_datetime(end, tzid, line, col)?;
        Ok(Period::Explicit { start, end })
    }
}

/// Unescapes a TEXT value (RFC 5545 §3.3.11).
#[must_use]
pub fn unescape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n' | 'N') => result.push('\n'),
                Some(',') => result.push(','),
                Some(';') => result.push(';'),
                Some('\\') | None => result.push('\\'),
                Some(other) => {
                    // Invalid escape, preserve as-is
                    result.push('\\');
                    result.push(other);
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_valid_and_invalid() {
        assert_eq!(
            parse_date("20241005", 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 5).unwrap()
        );
        assert_eq!(
            parse_date("20240230", 1, 1).unwrap_err().kind,
            ParseErrorKind::InvalidDate
        );
        assert!(parse_date("2024-10-05", 1, 1).is_err());
    }

    #[test]
    fn parse_datetime_forms() {
        let utc = parse_datetime("20241005T093000Z", None, 1, 1).unwrap();
        assert!(utc.is_utc());
        assert_eq!(utc.to_string(), "20241005T093000Z");

        let zoned = parse_datetime("20241005T093000", Some("Europe/Paris"), 1, 1).unwrap();
        assert_eq!(zoned.tzid(), Some("Europe/Paris"));

        let floating = parse_datetime("20241005T093000", None, 1, 1).unwrap();
        assert!(floating.is_floating());

        assert!(parse_datetime("20241005", None, 1, 1).is_err());
        assert!(parse_datetime("20241005T250000", None, 1, 1).is_err());
    }

    #[test]
    fn parse_utc_offsets() {
        assert_eq!(parse_utc_offset("+0530", 1, 1).unwrap().as_seconds(), 19_800);
        assert_eq!(parse_utc_offset("-0800", 1, 1).unwrap().as_seconds(), -28_800);
        assert_eq!(parse_utc_offset("+013045", 1, 1).unwrap().as_seconds(), 5445);
        assert!(parse_utc_offset("0530", 1, 1).is_err());
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("PT1H", 1, 1).unwrap(), Duration::hours(1));
        assert_eq!(parse_duration("P2D", 1, 1).unwrap(), Duration::days(2));
        let d = parse_duration("-P1DT2H30M", 1, 1).unwrap();
        assert!(d.negative);
        assert_eq!((d.days, d.hours, d.minutes), (1, 2, 30));
        assert_eq!(parse_duration("P3W", 1, 1).unwrap().weeks, 3);

        assert!(parse_duration("P", 1, 1).is_err());
        assert!(parse_duration("PT", 1, 1).is_err());
        assert!(parse_duration("P1H", 1, 1).is_err());
        assert!(parse_duration("PT5", 1, 1).is_err());
    }

    #[test]
    fn parse_periods() {
        let explicit = parse_period("20241005T090000Z/20241005T100000Z", None, 1, 1).unwrap();
        assert!(matches!(explicit, Period::Explicit { .. }));

        let with_duration = parse_period("20241005T090000Z/PT2H", None, 1, 1).unwrap();
        assert!(matches!(
            with_duration,
            Period::Duration { duration, .. } if duration == Duration::hours(2)
        ));
    }

    #[test]
    fn unescape_text_basic() {
        assert_eq!(unescape_text("hello\\, world"), "hello, world");
        assert_eq!(unescape_text("line1\\nline2"), "line1\nline2");
        assert_eq!(unescape_text("back\\\\slash"), "back\\slash");
    }
}

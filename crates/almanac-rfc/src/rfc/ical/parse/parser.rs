//! iCalendar document parser (RFC 5545).
//!
//! Parses complete iCalendar documents into typed structures.

use super::error::{ParseError, ParseErrorKind, ParseResult};
use super::lexer::{parse_content_line, split_lines};
use super::values::{
    parse_date, parse_datetime, parse_duration, parse_period, parse_utc_offset, unescape_text,
};
use crate::rfc::ical::core::{Component, ComponentKind, ContentLine, ICalendar, Property, PropertyName, Value};

/// Parses an iCalendar document from a string.
///
/// ## Errors
///
/// Returns an error if the input is not valid iCalendar or its root is not
/// a VCALENDAR.
#[tracing::instrument(skip(input), fields(input_len = input.len()))]
pub fn parse(input: &str) -> ParseResult<ICalendar> {
    let lines = split_lines(input);

    if lines.is_empty() {
        tracing::debug!("Empty iCalendar input");
        return Err(ParseError::new(ParseErrorKind::MissingBegin, 1, 1));
    }

    tracing::trace!(count = lines.len(), "Split lines");

    let mut iter = lines
        .into_iter()
        .map(|(line_num, line)| parse_content_line(&line, line_num).map(|cl| (line_num, cl)));

    let (line_num, begin) = iter
        .next()
        .ok_or_else(|| ParseError::new(ParseErrorKind::MissingBegin, 1, 1))??;
    if begin.name != "BEGIN" {
        return Err(ParseError::new(ParseErrorKind::MissingBegin, line_num, 1));
    }

    let root = parse_component(&mut iter, line_num, &begin.raw_value)?;

    if root.kind != ComponentKind::Calendar {
        return Err(ParseError::new(ParseErrorKind::MissingBegin, 1, 1)
            .with_context("expected VCALENDAR"));
    }

    Ok(ICalendar { root })
}

/// ## Summary
/// Cheap scan of raw iCalendar text for a `BEGIN:<name>` line.
///
/// Lets a caller skip full parsing of objects that cannot satisfy a
/// component filter. Lines are unfolded first, so this never returns
/// `false` for an object that contains the component.
#[must_use]
pub fn might_contain_component(raw: &str, name: &str) -> bool {
    split_lines(raw).iter().any(|(_, line)| {
        line.get(..6).is_some_and(|b| b.eq_ignore_ascii_case("BEGIN:"))
            && line[6..].trim().eq_ignore_ascii_case(name)
    })
}

/// Parses a component whose BEGIN line has already been consumed.
fn parse_component(
    iter: &mut impl Iterator<Item = ParseResult<(usize, ContentLine)>>,
    begin_line_num: usize,
    raw_name: &str,
) -> ParseResult<Component> {
    let mut component = Component::named(raw_name.trim());
    let mut last_line_num = begin_line_num;

    loop {
        let Some(next) = iter.next() else {
            return Err(
                ParseError::new(ParseErrorKind::MissingEnd, last_line_num, 1)
                    .with_context(format!("missing END:{}", component.name)),
            );
        };
        let (line_num, content_line) = next?;
        last_line_num = line_num;

        match content_line.name.as_str() {
            "BEGIN" => {
                let nested = parse_component(iter, line_num, &content_line.raw_value)?;
                component.add_child(nested);
            }
            "END" => {
                let end_name = content_line.raw_value.trim();
                if !component.is_named(end_name) {
                    return Err(
                        ParseError::new(ParseErrorKind::MismatchedComponent, line_num, 1)
                            .with_context(format!(
                                "expected END:{}, got END:{end_name}",
                                component.name
                            )),
                    );
                }
                return Ok(component);
            }
            _ => {
                let property = parse_property(content_line, line_num)?;
                component.add_property(property);
            }
        }
    }
}

/// Parses a property from a content line, resolving the value type.
fn parse_property(cl: ContentLine, line_num: usize) -> ParseResult<Property> {
    let name = PropertyName::parse(&cl.name);
    let value_type = determine_value_type(&name, &cl);
    let value = parse_value(&cl, value_type, line_num)?;

    Ok(Property {
        name,
        params: cl.params,
        value,
        raw_value: cl.raw_value,
    })
}

/// Internal enum for value type handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueType {
    Date,
    DateTime,
    /// DATE or DATE-TIME, decided by the shape of the value.
    DateOrDateTime,
    /// RDATE/EXDATE list whose element type is decided by the first element.
    TimeList,
    Period,
    Duration,
    Integer,
    Recur,
    Text,
    UtcOffset,
    Raw,
}

/// Determines the value type for a property.
fn determine_value_type(name: &PropertyName, cl: &ContentLine) -> ValueType {
    if let Some(explicit) = cl.get_param_value("VALUE") {
        match explicit.to_ascii_uppercase().as_str() {
            "DATE" => return ValueType::Date,
            "DATE-TIME" => return ValueType::DateTime,
            "PERIOD" => return ValueType::Period,
            "DURATION" => return ValueType::Duration,
            "TEXT" => return ValueType::Text,
            "INTEGER" => return ValueType::Integer,
            _ => {}
        }
    }

    match name {
        PropertyName::Dtstart
        | PropertyName::Dtend
        | PropertyName::Due
        | PropertyName::RecurrenceId
        | PropertyName::Dtstamp
        | PropertyName::Created
        | PropertyName::LastModified
        | PropertyName::Completed => ValueType::DateOrDateTime,
        PropertyName::Rdate | PropertyName::Exdate => ValueType::TimeList,
        PropertyName::Duration => ValueType::Duration,
        PropertyName::Trigger => {
            if cl.raw_value.starts_with(['P', '+', '-']) {
                ValueType::Duration
            } else {
                ValueType::DateTime
            }
        }
        PropertyName::Rrule | PropertyName::Exrule => ValueType::Recur,
        PropertyName::Tzoffsetfrom | PropertyName::Tzoffsetto => ValueType::UtcOffset,
        PropertyName::Sequence | PropertyName::Priority | PropertyName::PercentComplete => {
            ValueType::Integer
        }
        PropertyName::Attendee
        | PropertyName::Organizer
        | PropertyName::Url
        | PropertyName::Tzurl => ValueType::Raw,
        _ => ValueType::Text,
    }
}

/// Parses a raw value string into a typed Value.
fn parse_value(cl: &ContentLine, value_type: ValueType, line_num: usize) -> ParseResult<Value> {
    let raw = cl.raw_value.as_str();
    let tzid = cl.get_param_value("TZID");
    let col = cl.name.len() + 2;

    let is_date_shaped = |s: &str| s.len() == 8 && !s.contains(['T', 't']);

    match value_type {
        ValueType::Text => Ok(Value::Text(unescape_text(raw))),
        ValueType::Raw => Ok(Value::Unknown(raw.to_string())),
        ValueType::Recur => Ok(Value::Recur(raw.to_string())),
        ValueType::Duration => Ok(Value::Duration(parse_duration(raw, line_num, col)?)),
        ValueType::UtcOffset => Ok(Value::UtcOffset(parse_utc_offset(raw, line_num, col)?)),
        ValueType::Integer => raw.trim().parse().map(Value::Integer).map_err(|e| {
            ParseError::new(ParseErrorKind::InvalidInteger, line_num, col)
                .with_context(e.to_string())
        }),
        ValueType::Date => parse_date_list(raw, line_num, col),
        ValueType::DateTime => parse_datetime_list(raw, tzid, line_num, col),
        ValueType::DateOrDateTime if is_date_shaped(raw) => {
            Ok(Value::Date(parse_date(raw, line_num, col)?))
        }
        ValueType::DateOrDateTime => Ok(Value::DateTime(parse_datetime(raw, tzid, line_num, col)?)),
        ValueType::Period => parse_period_list(raw, tzid, line_num, col),
        ValueType::TimeList => {
            let first = raw.split(',').next().unwrap_or_default();
            if first.contains('/') {
                parse_period_list(raw, tzid, line_num, col)
            } else if is_date_shaped(first) {
                parse_date_list(raw, line_num, col)
            } else {
                parse_datetime_list(raw, tzid, line_num, col)
            }
        }
    }
}

fn parse_date_list(raw: &str, line_num: usize, col: usize) -> ParseResult<Value> {
    let mut dates = raw
        .split(',')
        .map(|s| parse_date(s.trim(), line_num, col))
        .collect::<ParseResult<Vec<_>>>()?;
    if dates.len() == 1 {
        return Ok(Value::Date(dates.remove(0)));
    }
    Ok(Value::DateList(dates))
}

fn parse_datetime_list(
    raw: &str,
    tzid: Option<&str>,
    line_num: usize,
    col: usize,
) -> ParseResult<Value> {
    let mut dts = raw
        .split(',')
        .map(|s| parse_datetime(s.trim(), tzid, line_num, col))
        .collect::<ParseResult<Vec<_>>>()?;
    if dts.len() == 1 {
        return Ok(Value::DateTime(dts.remove(0)));
    }
    Ok(Value::DateTimeList(dts))
}

fn parse_period_list(
    raw: &str,
    tzid: Option<&str>,
    line_num: usize,
    col: usize,
) -> ParseResult<Value> {
    raw.split(',')
        .map(|s| parse_period(s.trim(), tzid, line_num, col))
        .collect::<ParseResult<Vec<_>>>()
        .map(Value::PeriodList)
}

//! iCalendar serialization (RFC 5545).
//!
//! Properties are written from their raw value, so unmodified components
//! come back out exactly as they were parsed (modulo line folding).

use crate::rfc::ical::core::{Component, ICalendar, Property};

/// Maximum line length in octets (not including CRLF).
const MAX_LINE_OCTETS: usize = 75;

/// Serializes an iCalendar document to a string.
#[must_use]
pub fn serialize(ical: &ICalendar) -> String {
    serialize_component(&ical.root)
}

/// Serializes a component and its children to a string.
#[must_use]
pub fn serialize_component(component: &Component) -> String {
    let mut out = String::new();
    write_component(&mut out, component);
    out
}

fn write_component(out: &mut String, component: &Component) {
    push_folded(out, &format!("BEGIN:{}", component.name));
    for prop in &component.properties {
        push_folded(out, &serialize_property(prop));
    }
    for child in &component.children {
        write_component(out, child);
    }
    push_folded(out, &format!("END:{}", component.name));
}

/// Serializes a property to an unfolded content line (no line ending).
#[must_use]
pub fn serialize_property(prop: &Property) -> String {
    let mut line = prop.name.as_str().to_string();
    for param in &prop.params {
        line.push(';');
        line.push_str(&param.to_string());
    }
    line.push(':');
    line.push_str(&prop.raw_value);
    line
}

fn push_folded(out: &mut String, line: &str) {
    out.push_str(&fold_line(line));
}

/// Folds a content line to the 75-octet limit and terminates it with CRLF.
///
/// Continuation lines start with a single space. UTF-8 sequences are never
/// split.
#[must_use]
pub fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return format!("{line}\r\n");
    }

    let mut result = String::with_capacity(line.len() + (line.len() / MAX_LINE_OCTETS) * 3);
    let mut rest = line;
    let mut room = MAX_LINE_OCTETS;

    while rest.len() > room {
        let mut end = room;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        result.push_str(&rest[..end]);
        result.push_str("\r\n ");
        rest = &rest[end..];
        // Continuation lines lose one octet to the leading space
        room = MAX_LINE_OCTETS - 1;
    }
    result.push_str(rest);
    result.push_str("\r\n");
    result
}

/// Escapes text for iCalendar TEXT values (RFC 5545 §3.3.11).
#[must_use]
pub fn escape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 10);
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            ',' => result.push_str("\\,"),
            ';' => result.push_str("\\;"),
            '\n' => result.push_str("\\n"),
            '\r' => {}
            _ => result.push(c),
        }
    }
    result
}

/// Escapes a parameter value, quoting it when it contains delimiters.
///
/// Inside quotes RFC 6868 caret encoding is applied.
#[must_use]
pub fn escape_param_value(s: &str) -> String {
    if !s.contains([':', ';', ',', '"', '\n']) {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len() + 4);
    result.push('"');
    for c in s.chars() {
        match c {
            '^' => result.push_str("^^"),
            '\n' => result.push_str("^n"),
            '"' => result.push_str("^'"),
            _ => result.push(c),
        }
    }
    result.push('"');
    result
}

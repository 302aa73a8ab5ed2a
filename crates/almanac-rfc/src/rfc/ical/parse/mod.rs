//! iCalendar parsing (RFC 5545).
//!
//! - Lexer: content line splitting with unfolding
//! - Values: DATE, DATE-TIME, DURATION, PERIOD, UTC-OFFSET
//! - Parser: full document parsing into typed structures

mod error;
mod lexer;
mod parser;
mod values;

pub use error::{ParseError, ParseErrorKind, ParseResult};
pub use lexer::{parse_content_line, split_lines};
pub use parser::{might_contain_component, parse};
pub use values::{
    parse_date, parse_datetime, parse_duration, parse_period, parse_utc_offset, unescape_text,
};

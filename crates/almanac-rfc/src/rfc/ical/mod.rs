//! iCalendar (RFC 5545) model, parser, serializer, and time-range expansion.

pub mod build;
pub mod core;
pub mod expand;
pub mod parse;

//! `CalDAV` query types (RFC 4791).

pub mod core;

//! Validation logic for RFC compliance.
//!
//! This module provides validators for `CalDAV` requests so malformed or
//! unsupported queries are rejected before any calendar object is read.

pub mod filter;

pub use filter::{FilterValidationResult, validate_calendar_filter};

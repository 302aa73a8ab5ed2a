//! `CalDAV` query evaluation.
//!
//! - `matcher`: filter evaluation against one parsed object
//! - `projector`: calendar-data payloads for matches
//! - `service`: calendar-query and calendar-multiget over a collection

pub mod matcher;
pub mod projector;
pub mod service;

pub use matcher::{MatchError, MatchResult, expand_object, matches};
pub use projector::{Payload, Projector, generate_etag, select};

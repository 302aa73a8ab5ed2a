//! `CalDAV` query model.
//!
//! This module defines the typed filter tree, text-match collations, partial
//! retrieval selections, report requests and the condition codes returned
//! when a query is rejected.

mod filter;
mod partial_retrieval;
pub mod precondition;
mod report;
mod text_match;

pub use filter::{
    ComponentFilter, FilterNode, MatchType, ParamFilter, PropertyFilter, TextMatch, TimeRange,
};
pub use partial_retrieval::{CalendarDataRequest, ComponentSelection};
pub use precondition::PreconditionError;
pub use report::{
    CalendarMultiget, CalendarQuery, ConflictingTimezoneSpecification, QueryTimezone,
    ReportProperties,
};
pub use text_match::{Collation, CollationError};

//! `CALDAV:calendar-multiget` over one collection.

use almanac_rfc::rfc::dav::core::{CalendarMultiget, ReportProperties};
use almanac_rfc::rfc::ical::expand::{TimeContext, TimeZoneResolver, ZoneRef};
use almanac_rfc::rfc::ical::parse::parse;
use futures::{StreamExt, TryStreamExt, stream};

use super::{QueryError, QueryLimits};
use crate::caldav::matcher::expand_object;
use crate::caldav::projector::{Payload, Projector};
use crate::store::{CalendarStore, StoreError};

/// Result for one requested href.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultigetStatus {
    Found(Payload),
    NotFound,
    /// The stored object exists but is not valid UTF-8 iCalendar.
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultigetEntry {
    pub href: String,
    pub status: MultigetStatus,
}

/// Entries in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultigetReport {
    pub entries: Vec<MultigetEntry>,
}

/// ## Summary
/// Retrieves the requested properties of each href.
///
/// Hrefs resolve to object names by their last path segment. Missing and
/// unreadable objects are reported per href.
///
/// ## Errors
/// Returns `QueryError::TooManyHrefs` when calendar data is requested for
/// more than `limits.max_multiget_hrefs_with_data` hrefs, and
/// `QueryError::Storage` when the store fails.
#[tracing::instrument(skip_all, fields(hrefs = multiget.hrefs.len()))]
pub async fn evaluate_calendar_multiget<S>(
    store: &S,
    multiget: &CalendarMultiget,
    limits: &QueryLimits,
) -> Result<MultigetReport, QueryError>
where
    S: CalendarStore + ?Sized,
{
    let requested = multiget.hrefs.len();
    if multiget.properties.wants_data() && requested > limits.max_multiget_hrefs_with_data {
        tracing::debug!(requested, limit = limits.max_multiget_hrefs_with_data, "Too many hrefs");
        return Err(QueryError::TooManyHrefs {
            requested,
            limit: limits.max_multiget_hrefs_with_data,
        });
    }

    let entries: Vec<MultigetEntry> = stream::iter(&multiget.hrefs)
        .map(|href| fetch_entry(store, href, &multiget.properties, limits))
        .buffered(limits.concurrency.max(1))
        .try_collect()
        .await?;

    tracing::info!(entries = entries.len(), "Calendar multiget evaluated");
    Ok(MultigetReport { entries })
}

/// Maps an href to the object name it addresses.
fn object_name(href: &str) -> Option<&str> {
    href.rsplit('/').next().filter(|name| !name.is_empty())
}

async fn fetch_entry<S>(
    store: &S,
    href: &str,
    properties: &ReportProperties,
    limits: &QueryLimits,
) -> Result<MultigetEntry, QueryError>
where
    S: CalendarStore + ?Sized,
{
    let entry = |status| MultigetEntry {
        href: href.to_string(),
        status,
    };

    let Some(name) = object_name(href) else {
        return Ok(entry(MultigetStatus::NotFound));
    };
    let raw = match store.get(name).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Ok(entry(MultigetStatus::NotFound)),
        Err(err @ StoreError::InvalidEncoding { .. }) => {
            tracing::warn!(href = %href, error = %err, "Stored object is not readable text");
            return Ok(entry(MultigetStatus::Unreadable(err.to_string())));
        }
        Err(err) => return Err(err.into()),
    };

    let ical = match parse(&raw) {
        Ok(ical) => ical,
        Err(err) => {
            tracing::warn!(href = %href, error = %err, "Stored object is not valid iCalendar");
            return Ok(entry(MultigetStatus::Unreadable(err.to_string())));
        }
    };

    let expand = properties
        .calendar_data
        .as_ref()
        .is_some_and(|request| request.expand);
    let floating = ZoneRef::Utc;
    let instances = if expand {
        let resolver = TimeZoneResolver::for_calendar(&ical);
        let ctx = TimeContext::new(&resolver, &floating);
        expand_object(&ical, &ctx, limits.expansion)
    } else {
        Vec::new()
    };

    let payload = Projector::new(&raw, &ical, &floating).project(&instances, expand, properties);
    Ok(entry(MultigetStatus::Found(payload)))
}

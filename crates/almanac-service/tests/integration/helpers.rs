#![allow(clippy::expect_used, dead_code)]
//! Test helpers for integration tests.
//!
//! Provides:
//! - Sample calendar objects
//! - An in-memory collection seeded with them
//! - A store wrapper counting how many objects were read
//! - A store wrapper serving objects that are not UTF-8

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use almanac_rfc::rfc::dav::core::{ComponentFilter, TimeRange};
use almanac_service::store::{CalendarStore, InMemoryStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

pub use almanac_rfc::rfc::dav::core::{
    CalendarDataRequest, CalendarMultiget, CalendarQuery, ComponentSelection, PropertyFilter,
    QueryTimezone, ReportProperties, TextMatch,
};
pub use almanac_service::caldav::service::{
    MultigetStatus, QueryError, QueryLimits, evaluate_calendar_multiget, evaluate_calendar_query,
};
pub use almanac_service::cancel::CancellationFlag;
pub use almanac_service::store::ChronoTzRegistry;

/// Wraps a store and counts `get` calls.
#[derive(Debug, Clone, Default)]
pub struct CountingStore {
    pub inner: InMemoryStore,
    gets: Arc<AtomicUsize>,
}

impl CountingStore {
    #[must_use]
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            gets: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn objects_read(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarStore for CountingStore {
    async fn list(&self) -> StoreResult<Vec<String>> {
        self.inner.list().await
    }

    async fn get(&self, name: &str) -> StoreResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(name).await
    }
}

/// Wraps a store and adds objects whose bytes are not UTF-8.
#[derive(Debug, Clone, Default)]
pub struct BinaryObjectStore {
    pub inner: InMemoryStore,
    binary: Vec<String>,
}

impl BinaryObjectStore {
    #[must_use]
    pub fn new(inner: InMemoryStore, binary: &[&str]) -> Self {
        Self {
            inner,
            binary: binary.iter().map(ToString::to_string).collect(),
        }
    }
}

#[async_trait]
impl CalendarStore for BinaryObjectStore {
    async fn list(&self) -> StoreResult<Vec<String>> {
        let mut names = self.inner.list().await?;
        names.extend(self.binary.iter().cloned());
        names.sort_unstable();
        Ok(names)
    }

    async fn get(&self, name: &str) -> StoreResult<Option<String>> {
        if self.binary.iter().any(|binary| binary == name) {
            let source = String::from_utf8(vec![0x42, 0xff, 0xfe]).expect_err("invalid UTF-8");
            return Err(StoreError::InvalidEncoding {
                name: name.to_string(),
                source,
            });
        }
        self.inner.get(name).await
    }
}

#[must_use]
pub fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
        .single()
        .expect("valid instant")
}

/// `VCALENDAR > VEVENT` with an optional time-range.
#[must_use]
pub fn events_filter(range: Option<TimeRange>) -> ComponentFilter {
    let mut events = ComponentFilter::new("VEVENT");
    if let Some(range) = range {
        events = events.with_time_range(range);
    }
    ComponentFilter::vcalendar().with_comp_filter(events)
}

/// Wraps components in a VCALENDAR.
#[must_use]
pub fn calendar(components: &str) -> String {
    format!(
        r"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Almanac//Test//EN
{components}END:VCALENDAR
"
    )
}

/// Single event on 2024-10-05 at 10:00Z.
#[must_use]
pub fn single_event(uid: &str, summary: &str) -> String {
    calendar(&format!(
        r"BEGIN:VEVENT
UID:{uid}
DTSTAMP:20240901T120000Z
DTSTART:20241005T100000Z
DTEND:20241005T110000Z
SUMMARY:{summary}
END:VEVENT
"
    ))
}

/// Weekly event from 2024-10-01 09:00Z with no end.
#[must_use]
pub fn weekly_event(uid: &str) -> String {
    calendar(&format!(
        r"BEGIN:VEVENT
UID:{uid}
DTSTAMP:20240901T120000Z
DTSTART:20241001T090000Z
DTEND:20241001T100000Z
SUMMARY:Weekly sync
RRULE:FREQ=WEEKLY
END:VEVENT
"
    ))
}

/// Daily event with one EXDATE and one moved, renamed instance.
#[must_use]
pub fn daily_with_exceptions(uid: &str) -> String {
    calendar(&format!(
        r"BEGIN:VEVENT
UID:{uid}
DTSTAMP:20240901T120000Z
DTSTART:20241001T090000Z
DURATION:PT30M
SUMMARY:Daily
RRULE:FREQ=DAILY;COUNT=5
EXDATE:20241002T090000Z
END:VEVENT
BEGIN:VEVENT
UID:{uid}
DTSTAMP:20240901T120000Z
RECURRENCE-ID:20241003T090000Z
DTSTART:20241003T140000Z
DURATION:PT30M
SUMMARY:Daily (moved)
END:VEVENT
"
    ))
}

/// Task without any VEVENT.
#[must_use]
pub fn task(uid: &str) -> String {
    calendar(&format!(
        r"BEGIN:VTODO
UID:{uid}
DTSTAMP:20240901T120000Z
DUE:20241010T170000Z
SUMMARY:File report
END:VTODO
"
    ))
}

/// A collection with a single event, a weekly event and a task.
pub async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert("single.ics", single_event("single", "Lunch")).await;
    store.insert("weekly.ics", weekly_event("weekly")).await;
    store.insert("task.ics", task("task")).await;
    store
}

#[must_use]
pub fn result_names(report: &almanac_service::caldav::service::QueryReport) -> Vec<&str> {
    report.results.iter().map(|r| r.name.as_str()).collect()
}

#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Tests for calendar-multiget retrieval.

use almanac_rfc::rfc::ical::parse::parse;
use almanac_service::caldav::projector::generate_etag;

use super::helpers::*;

fn multiget(hrefs: &[&str], properties: ReportProperties) -> CalendarMultiget {
    CalendarMultiget::new(hrefs.iter().map(|h| (*h).to_string()).collect(), properties)
}

/// ## Summary
/// An object that is not UTF-8 is unreadable; its neighbours are still
/// returned.
#[test_log::test(tokio::test)]
async fn undecodable_object_is_unreadable() {
    let store = BinaryObjectStore::new(seeded_store().await, &["binary.ics"]);

    let request = multiget(&["binary.ics", "single.ics"], ReportProperties::etag_only());
    let report = evaluate_calendar_multiget(&store, &request, &QueryLimits::default())
        .await
        .unwrap();

    assert!(matches!(
        &report.entries[0].status,
        MultigetStatus::Unreadable(reason) if reason.contains("UTF-8")
    ));
    assert!(matches!(report.entries[1].status, MultigetStatus::Found(_)));
}

/// ## Summary
/// Entries come back in request order with per-href status.
#[test_log::test(tokio::test)]
async fn entries_follow_request_order() {
    let store = seeded_store().await;
    store.insert("broken.ics", "BEGIN:VCALENDAR\nBEGIN:VEVENT\n").await;

    let request = multiget(
        &[
            "/calendars/alice/work/weekly.ics",
            "/calendars/alice/work/missing.ics",
            "/calendars/alice/work/",
            "broken.ics",
            "single.ics",
        ],
        ReportProperties::etag_only(),
    );
    let report = evaluate_calendar_multiget(&store, &request, &QueryLimits::default())
        .await
        .unwrap();

    let hrefs: Vec<_> = report.entries.iter().map(|e| e.href.as_str()).collect();
    assert_eq!(
        hrefs,
        vec![
            "/calendars/alice/work/weekly.ics",
            "/calendars/alice/work/missing.ics",
            "/calendars/alice/work/",
            "broken.ics",
            "single.ics",
        ]
    );

    let MultigetStatus::Found(weekly) = &report.entries[0].status else {
        panic!("weekly.ics should be found");
    };
    assert_eq!(
        weekly.etag.as_deref(),
        Some(generate_etag(weekly_event("weekly").as_bytes()).as_str())
    );
    assert!(weekly.calendar_data.is_none());

    assert_eq!(report.entries[1].status, MultigetStatus::NotFound);
    assert_eq!(report.entries[2].status, MultigetStatus::NotFound);
    assert!(matches!(report.entries[3].status, MultigetStatus::Unreadable(_)));
    assert!(matches!(report.entries[4].status, MultigetStatus::Found(_)));
}

#[test_log::test(tokio::test)]
async fn full_data_is_returned_verbatim() {
    let store = seeded_store().await;
    let report = evaluate_calendar_multiget(
        &store,
        &multiget(&["single.ics"], ReportProperties::with_data()),
        &QueryLimits::default(),
    )
    .await
    .unwrap();

    let MultigetStatus::Found(payload) = &report.entries[0].status else {
        panic!("single.ics should be found");
    };
    assert_eq!(
        payload.calendar_data.as_deref(),
        Some(single_event("single", "Lunch").as_str())
    );
}

#[test_log::test(tokio::test)]
async fn expanded_data_lists_every_instance() {
    let store = seeded_store().await;
    store.insert("daily.ics", daily_with_exceptions("daily")).await;

    let properties =
        ReportProperties::etag_only().with_calendar_data(CalendarDataRequest::full().expanded());
    let report = evaluate_calendar_multiget(
        &store,
        &multiget(&["daily.ics"], properties),
        &QueryLimits::default(),
    )
    .await
    .unwrap();

    let MultigetStatus::Found(payload) = &report.entries[0].status else {
        panic!("daily.ics should be found");
    };
    let data = payload.calendar_data.as_deref().unwrap();
    assert!(!data.contains("RRULE"));
    assert_eq!(parse(data).unwrap().components().count(), 4);
}

/// ## Summary
/// The href cap applies only when calendar data is requested.
#[test_log::test(tokio::test)]
async fn href_cap_applies_only_to_calendar_data() {
    let store = CountingStore::new(seeded_store().await);
    let limits = QueryLimits {
        max_multiget_hrefs_with_data: 1,
        ..QueryLimits::default()
    };

    let err = evaluate_calendar_multiget(
        &store,
        &multiget(&["single.ics", "weekly.ics"], ReportProperties::with_data()),
        &limits,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        QueryError::TooManyHrefs {
            requested: 2,
            limit: 1
        }
    ));
    assert_eq!(err.status_code(), 403);
    assert_eq!(store.objects_read(), 0);

    let report = evaluate_calendar_multiget(
        &store,
        &multiget(&["single.ics", "weekly.ics"], ReportProperties::etag_only()),
        &limits,
    )
    .await
    .unwrap();
    assert_eq!(report.entries.len(), 2);
}

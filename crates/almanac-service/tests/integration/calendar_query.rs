#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Tests for calendar-query evaluation.
//!
//! Covers time-range matching of single and recurring events, query
//! timezones, result caps, text-match collations and fail-closed objects.

use almanac_rfc::rfc::dav::core::{ComponentFilter, TimeRange};
use almanac_rfc::rfc::ical::expand::VTimezone;
use almanac_rfc::rfc::ical::parse::parse;
use almanac_service::caldav::service::QueryReport;
use almanac_service::store::{CalendarStore, InMemoryStore};

use super::helpers::*;

const NEW_YORK: &str = r"BEGIN:VTIMEZONE
TZID:America/New_York
BEGIN:STANDARD
DTSTART:19701101T020000
TZOFFSETFROM:-0400
TZOFFSETTO:-0500
RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU
END:STANDARD
BEGIN:DAYLIGHT
DTSTART:19700308T020000
TZOFFSETFROM:-0500
TZOFFSETTO:-0400
RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU
END:DAYLIGHT
END:VTIMEZONE
";

fn inline_new_york() -> VTimezone {
    VTimezone::from_calendar_text(&calendar(NEW_YORK)).expect("valid VTIMEZONE")
}

/// Builds a query the way a transport layer would from its two timezone
/// elements.
fn build_query(
    filter: ComponentFilter,
    inline: Option<VTimezone>,
    tzid: Option<&str>,
) -> Result<CalendarQuery, QueryError> {
    let mut query = CalendarQuery::new(filter);
    if let Some(timezone) = QueryTimezone::from_parts(inline, tzid.map(str::to_string))? {
        query = query.with_timezone(timezone);
    }
    Ok(query)
}

async fn run<S: CalendarStore>(store: &S, query: &CalendarQuery) -> Result<QueryReport, QueryError> {
    evaluate_calendar_query(
        store,
        &ChronoTzRegistry,
        query,
        &QueryLimits::default(),
        &CancellationFlag::new(),
    )
    .await
}

// ============================================================================
// Time-range matching
// ============================================================================

/// ## Summary
/// A single event inside the window matches with exactly one instance.
#[test_log::test(tokio::test)]
async fn single_event_in_window_matches_once() {
    let store = InMemoryStore::new();
    store.insert("single.ics", single_event("single", "Lunch")).await;

    let range = TimeRange::between(utc(2024, 10, 1, 0), utc(2024, 11, 1, 0));
    let report = run(&store, &CalendarQuery::new(events_filter(Some(range))))
        .await
        .unwrap();

    assert_eq!(result_names(&report), vec!["single.ics"]);
    let instances = &report.results[0].instances;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].interval.start, utc(2024, 10, 5, 10));
    assert!(report.results[0].payload.etag.is_some());
    assert!(report.results[0].payload.calendar_data.is_none());
}

/// ## Summary
/// An open-ended weekly rule yields Oct 1, 8 and 15; Oct 22 is on the
/// exclusive upper bound.
#[test_log::test(tokio::test)]
async fn weekly_event_respects_half_open_window() {
    let store = InMemoryStore::new();
    store.insert("weekly.ics", weekly_event("weekly")).await;

    let range = TimeRange::between(utc(2024, 10, 1, 0), utc(2024, 10, 22, 0));
    let report = run(&store, &CalendarQuery::new(events_filter(Some(range))))
        .await
        .unwrap();

    let starts: Vec<_> = report.results[0]
        .instances
        .iter()
        .map(|o| o.interval.start)
        .collect();
    assert_eq!(
        starts,
        vec![utc(2024, 10, 1, 9), utc(2024, 10, 8, 9), utc(2024, 10, 15, 9)]
    );
}

#[test_log::test(tokio::test)]
async fn objects_outside_window_and_tasks_do_not_match() {
    let store = seeded_store().await;

    let range = TimeRange::between(utc(2024, 9, 1, 0), utc(2024, 9, 30, 0));
    let report = run(&store, &CalendarQuery::new(events_filter(Some(range))))
        .await
        .unwrap();
    assert!(report.results.is_empty());

    let report = run(&store, &CalendarQuery::new(events_filter(None)))
        .await
        .unwrap();
    assert_eq!(result_names(&report), vec!["single.ics", "weekly.ics"]);
    assert!(report.results.iter().all(|r| r.instances.is_empty()));
}

/// ## Summary
/// EXDATE removes an instance; the override replaces its generated
/// instance and the returned data holds standalone instances.
#[test_log::test(tokio::test)]
async fn exceptions_are_applied_and_projected() {
    let store = InMemoryStore::new();
    store.insert("daily.ics", daily_with_exceptions("daily")).await;

    let range = TimeRange::between(utc(2024, 10, 1, 0), utc(2024, 10, 6, 0));
    let query = CalendarQuery::new(events_filter(Some(range)))
        .with_properties(ReportProperties::with_data());
    let report = run(&store, &query).await.unwrap();

    let result = &report.results[0];
    let starts: Vec<_> = result.instances.iter().map(|o| o.interval.start).collect();
    assert_eq!(
        starts,
        vec![
            utc(2024, 10, 1, 9),
            utc(2024, 10, 3, 14),
            utc(2024, 10, 4, 9),
            utc(2024, 10, 5, 9),
        ]
    );

    let data = result.payload.calendar_data.as_deref().unwrap();
    assert!(data.contains("SUMMARY:Daily (moved)"));
    assert!(data.contains("RECURRENCE-ID:20241004T090000Z"));
    assert!(!data.contains("RRULE"));
    assert!(!data.contains("EXDATE"));

    let projected = parse(data).unwrap();
    assert_eq!(projected.components().count(), 4);
}

/// ## Summary
/// Expanded data without a time-range returns every instance.
#[test_log::test(tokio::test)]
async fn expanded_data_without_time_range() {
    let store = InMemoryStore::new();
    store.insert("daily.ics", daily_with_exceptions("daily")).await;

    let properties = ReportProperties::etag_only()
        .with_calendar_data(CalendarDataRequest::full().expanded());
    let query = CalendarQuery::new(events_filter(None)).with_properties(properties);
    let report = run(&store, &query).await.unwrap();

    assert_eq!(report.results[0].instances.len(), 4);
    let data = report.results[0].payload.calendar_data.as_deref().unwrap();
    assert_eq!(parse(data).unwrap().components().count(), 4);
}

// ============================================================================
// Query timezone
// ============================================================================

#[test_log::test(tokio::test)]
async fn floating_times_use_query_timezone() {
    let store = InMemoryStore::new();
    store
        .insert(
            "floating.ics",
            calendar(
                r"BEGIN:VEVENT
UID:floating
DTSTAMP:20240901T120000Z
DTSTART:20241005T090000
DURATION:PT30M
END:VEVENT
",
            ),
        )
        .await;

    let range = TimeRange::between(utc(2024, 10, 5, 13), utc(2024, 10, 5, 14));

    let in_utc = build_query(events_filter(Some(range)), None, None).unwrap();
    assert!(run(&store, &in_utc).await.unwrap().results.is_empty());

    let by_id = build_query(events_filter(Some(range)), None, Some("America/New_York")).unwrap();
    assert_eq!(run(&store, &by_id).await.unwrap().results.len(), 1);

    let inline = build_query(events_filter(Some(range)), Some(inline_new_york()), None).unwrap();
    assert_eq!(run(&store, &inline).await.unwrap().results.len(), 1);
}

/// ## Summary
/// Both timezone forms are rejected before anything is evaluated.
#[test_log::test(tokio::test)]
async fn conflicting_timezone_specification_is_rejected() {
    let err = build_query(
        events_filter(None),
        Some(inline_new_york()),
        Some("America/New_York"),
    )
    .unwrap_err();

    assert!(matches!(err, QueryError::ConflictingTimezoneSpecification(_)));
    assert!(err.to_string().contains("Only one of"));
    let condition = err.precondition().unwrap();
    assert_eq!(condition.element_name(), "valid-filter");
    assert_eq!(err.status_code(), 400);
}

/// ## Summary
/// An unknown timezone identifier rejects the query with zero objects read.
#[test_log::test(tokio::test)]
async fn unknown_timezone_id_reads_no_objects() {
    let store = CountingStore::new(seeded_store().await);
    let query = build_query(events_filter(None), None, Some("bogus")).unwrap();

    let err = evaluate_calendar_query(
        &store,
        &ChronoTzRegistry,
        &query,
        &QueryLimits::default(),
        &CancellationFlag::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, QueryError::InvalidTimezone(ref tzid) if tzid == "bogus"));
    assert_eq!(err.precondition().unwrap().element_name(), "valid-timezone");
    assert_eq!(store.objects_read(), 0);
}

// ============================================================================
// Result cap
// ============================================================================

/// ## Summary
/// Exceeding the data cap fails the query; the etag-only form of the same
/// query succeeds under the same cap.
#[test_log::test(tokio::test)]
async fn result_cap_applies_only_to_calendar_data() {
    let store = seeded_store().await;
    let limits = QueryLimits {
        max_results_with_data: 1,
        ..QueryLimits::default()
    };

    let with_data =
        CalendarQuery::new(events_filter(None)).with_properties(ReportProperties::with_data());
    let err = evaluate_calendar_query(
        &store,
        &ChronoTzRegistry,
        &with_data,
        &limits,
        &CancellationFlag::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, QueryError::ResultSetTooLarge { limit: 1 }));
    assert_eq!(
        err.precondition().unwrap().element_name(),
        "number-of-matches-within-limits"
    );
    assert_eq!(err.status_code(), 403);

    let etag_only = CalendarQuery::new(events_filter(None));
    let report = evaluate_calendar_query(
        &store,
        &ChronoTzRegistry,
        &etag_only,
        &limits,
        &CancellationFlag::new(),
    )
    .await
    .unwrap();
    assert_eq!(report.results.len(), 2);
}

#[test_log::test(tokio::test)]
async fn cancelled_query_reports_cancellation() {
    let store = seeded_store().await;
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let err = evaluate_calendar_query(
        &store,
        &ChronoTzRegistry,
        &CalendarQuery::new(events_filter(None)),
        &QueryLimits::default(),
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, QueryError::Cancelled));
}

// ============================================================================
// Property and component filters
// ============================================================================

fn summary_filter(text_match: TextMatch) -> ComponentFilter {
    ComponentFilter::vcalendar().with_comp_filter(
        ComponentFilter::new("VEVENT")
            .with_prop_filter(PropertyFilter::new("SUMMARY").with_text_match(text_match)),
    )
}

#[test_log::test(tokio::test)]
async fn text_match_collations() {
    let store = seeded_store().await;

    let casemap = run(&store, &CalendarQuery::new(summary_filter(TextMatch::contains("LUNCH"))))
        .await
        .unwrap();
    assert_eq!(result_names(&casemap), vec!["single.ics"]);

    let octet = run(
        &store,
        &CalendarQuery::new(summary_filter(
            TextMatch::contains("LUNCH").with_collation("i;octet"),
        )),
    )
    .await
    .unwrap();
    assert!(octet.results.is_empty());

    let negated = run(
        &store,
        &CalendarQuery::new(summary_filter(TextMatch::contains("lunch").negate())),
    )
    .await
    .unwrap();
    assert_eq!(result_names(&negated), vec!["weekly.ics"]);
}

#[test_log::test(tokio::test)]
async fn unknown_collation_is_rejected_up_front() {
    let store = CountingStore::new(seeded_store().await);
    let query = CalendarQuery::new(summary_filter(
        TextMatch::contains("x").with_collation("i;klingon"),
    ));

    let err = evaluate_calendar_query(
        &store,
        &ChronoTzRegistry,
        &query,
        &QueryLimits::default(),
        &CancellationFlag::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, QueryError::UnsupportedCollation(_)));
    assert_eq!(err.precondition().unwrap().element_name(), "supported-collation");
    assert_eq!(store.objects_read(), 0);
}

#[test_log::test(tokio::test)]
async fn is_not_defined_selects_objects_without_component() {
    let store = seeded_store().await;
    let filter =
        ComponentFilter::vcalendar().with_comp_filter(ComponentFilter::new("VTODO").not_defined());

    let report = run(&store, &CalendarQuery::new(filter)).await.unwrap();
    assert_eq!(result_names(&report), vec!["single.ics", "weekly.ics"]);
}

#[test_log::test(tokio::test)]
async fn invalid_filter_root_is_rejected() {
    let store = seeded_store().await;
    let err = run(&store, &CalendarQuery::new(ComponentFilter::new("VEVENT")))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidFilter(_)));
    assert_eq!(err.status_code(), 400);
}

// ============================================================================
// Fail-closed objects
// ============================================================================

/// ## Summary
/// An object whose only event has a malformed rule is reported and
/// excluded; other objects are still evaluated.
#[test_log::test(tokio::test)]
async fn broken_objects_fail_closed() {
    let store = seeded_store().await;
    store
        .insert(
            "bad-rule.ics",
            calendar(
                r"BEGIN:VEVENT
UID:bad-rule
DTSTAMP:20240901T120000Z
DTSTART:20241002T090000Z
RRULE:FREQ=SOMETIMES
END:VEVENT
",
            ),
        )
        .await;
    store.insert("garbage.ics", "BEGIN:VCALENDAR\nBEGIN:VEVENT\n").await;

    let range = TimeRange::between(utc(2024, 10, 1, 0), utc(2024, 11, 1, 0));
    let report = run(&store, &CalendarQuery::new(events_filter(Some(range))))
        .await
        .unwrap();

    assert_eq!(result_names(&report), vec!["single.ics", "weekly.ics"]);
    let failed: Vec<_> = report.failures.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(failed, vec!["bad-rule.ics", "garbage.ics"]);
}

/// ## Summary
/// An object that is not UTF-8 is reported as a failure of that object
/// alone.
#[test_log::test(tokio::test)]
async fn undecodable_object_fails_alone() {
    let store = BinaryObjectStore::new(seeded_store().await, &["binary.ics"]);

    let range = TimeRange::between(utc(2024, 10, 1, 0), utc(2024, 11, 1, 0));
    let report = run(&store, &CalendarQuery::new(events_filter(Some(range))))
        .await
        .unwrap();

    assert_eq!(result_names(&report), vec!["single.ics", "weekly.ics"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name, "binary.ics");
    assert!(report.failures[0].reason.contains("UTF-8"));
}

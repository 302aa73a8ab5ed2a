//! `CALDAV:calendar-query` over one collection.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use almanac_rfc::rfc::dav::core::{CalendarQuery, QueryTimezone};
use almanac_rfc::rfc::ical::expand::{Occurrence, TimeContext, TimeZoneResolver, ZoneRef};
use almanac_rfc::rfc::ical::parse::{might_contain_component, parse};
use almanac_rfc::rfc::validation::validate_calendar_filter;
use futures::{StreamExt, TryStreamExt, stream};

use super::{QueryError, QueryLimits, filter_rejection};
use crate::caldav::matcher::{MatchError, MatchResult, expand_object, matches};
use crate::caldav::projector::{Payload, Projector};
use crate::cancel::CancellationFlag;
use crate::store::{CalendarStore, StoreError, TimezoneRegistry};

/// One matching object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub name: String,
    pub payload: Payload,
    /// Instances selected by the filter's time-range, or every instance
    /// when expanded data was requested without one.
    pub instances: Vec<Occurrence>,
}

/// An object that failed closed and is excluded from the results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of a calendar-query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryReport {
    /// Matches in object-name order.
    pub results: Vec<QueryResult>,
    /// Objects that could not be evaluated, in object-name order.
    pub failures: Vec<ObjectFailure>,
}

enum ObjectOutcome {
    Matched(QueryResult),
    Failed(ObjectFailure),
    NoMatch,
    Skipped,
}

/// State shared by the workers of one query.
struct Evaluation<'a, S: ?Sized> {
    store: &'a S,
    query: &'a CalendarQuery,
    limits: &'a QueryLimits,
    floating: ZoneRef,
    /// Top-level components an object must contain to possibly match.
    required_components: Vec<&'a str>,
    instance_limited: bool,
    data_results: AtomicUsize,
    cancel: &'a CancellationFlag,
    /// Tripped when the result cap is exceeded.
    stop: CancellationFlag,
}

impl<S: ?Sized> Evaluation<'_, S> {
    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.stop.is_cancelled()
    }
}

/// ## Summary
/// Evaluates a calendar-query against every object of a collection.
///
/// The filter is validated and the query timezone resolved before any
/// object is read. Objects are then fetched and matched concurrently.
///
/// ## Side Effects
/// Reads objects from `store`. Exceeding the result cap stops the remaining
/// workers.
///
/// ## Errors
/// Returns a `QueryError` carrying a condition code when the filter is
/// rejected, the timezone is invalid or conflicting, or more than
/// `limits.max_results_with_data` objects would be returned with calendar
/// data. Returns `QueryError::Cancelled` if `cancel` is tripped and
/// `QueryError::Storage` when the store fails.
#[tracing::instrument(skip_all, fields(filter = %query.filter.name, concurrency = limits.concurrency))]
pub async fn evaluate_calendar_query<S, R>(
    store: &S,
    registry: &R,
    query: &CalendarQuery,
    limits: &QueryLimits,
    cancel: &CancellationFlag,
) -> Result<QueryReport, QueryError>
where
    S: CalendarStore + ?Sized,
    R: TimezoneRegistry + ?Sized,
{
    let validation = validate_calendar_filter(&query.filter);
    if let Some(condition) = validation.into_precondition() {
        tracing::debug!(condition = %condition, "Rejecting filter");
        return Err(filter_rejection(condition));
    }

    let floating = resolve_query_timezone(registry, query.timezone.as_ref()).await?;

    if cancel.is_cancelled() {
        return Err(QueryError::Cancelled);
    }

    let names = store.list().await?;
    tracing::debug!(objects = names.len(), "Evaluating collection");

    let expand_requested = query
        .properties
        .calendar_data
        .as_ref()
        .is_some_and(|request| request.expand);
    let evaluation = Evaluation {
        store,
        query,
        limits,
        floating,
        required_components: query
            .filter
            .comp_filters()
            .filter(|f| !f.is_not_defined)
            .map(|f| f.name.as_str())
            .collect(),
        instance_limited: query.filter.find_time_range().is_some() || expand_requested,
        data_results: AtomicUsize::new(0),
        cancel,
        stop: CancellationFlag::new(),
    };

    let outcomes: Vec<ObjectOutcome> = stream::iter(names)
        .map(|name| evaluate_object(&evaluation, name))
        .buffer_unordered(limits.concurrency.max(1))
        .try_collect()
        .await?;

    if cancel.is_cancelled() {
        return Err(QueryError::Cancelled);
    }

    let mut report = QueryReport::default();
    for outcome in outcomes {
        match outcome {
            ObjectOutcome::Matched(result) => report.results.push(result),
            ObjectOutcome::Failed(failure) => report.failures.push(failure),
            ObjectOutcome::NoMatch | ObjectOutcome::Skipped => {}
        }
    }
    report.results.sort_by(|a, b| a.name.cmp(&b.name));
    report.failures.sort_by(|a, b| a.name.cmp(&b.name));

    tracing::info!(
        matches = report.results.len(),
        failures = report.failures.len(),
        "Calendar query evaluated"
    );
    Ok(report)
}

/// ## Summary
/// Resolves the zone floating values are interpreted in.
///
/// ## Errors
/// Returns `QueryError::InvalidTimezone` if the registry does not know the
/// identifier.
async fn resolve_query_timezone<R>(
    registry: &R,
    timezone: Option<&QueryTimezone>,
) -> Result<ZoneRef, QueryError>
where
    R: TimezoneRegistry + ?Sized,
{
    match timezone {
        None => Ok(ZoneRef::Utc),
        Some(QueryTimezone::Inline(vtimezone)) => Ok(ZoneRef::Custom(Arc::new(vtimezone.clone()))),
        Some(QueryTimezone::Id(tzid)) => registry.resolve(tzid).await.map_err(|err| {
            tracing::debug!(tzid = %tzid, error = %err, "Rejecting query timezone");
            QueryError::InvalidTimezone(tzid.clone())
        }),
    }
}

async fn evaluate_object<S>(
    evaluation: &Evaluation<'_, S>,
    name: String,
) -> Result<ObjectOutcome, QueryError>
where
    S: CalendarStore + ?Sized,
{
    if evaluation.should_stop() {
        return Ok(ObjectOutcome::Skipped);
    }

    let raw = match evaluation.store.get(&name).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::debug!(name = %name, "Object disappeared during query");
            return Ok(ObjectOutcome::Skipped);
        }
        Err(err @ StoreError::InvalidEncoding { .. }) => {
            tracing::warn!(name = %name, error = %err, "Stored object is not readable text");
            return Ok(ObjectOutcome::Failed(ObjectFailure {
                name,
                reason: err.to_string(),
            }));
        }
        Err(err) => return Err(err.into()),
    };

    if !evaluation
        .required_components
        .iter()
        .all(|component| might_contain_component(&raw, component))
    {
        tracing::trace!(name = %name, "Skipping object without required components");
        return Ok(ObjectOutcome::NoMatch);
    }

    let ical = match parse(&raw) {
        Ok(ical) => ical,
        Err(err) => {
            tracing::warn!(name = %name, error = %err, "Stored object is not valid iCalendar");
            return Ok(ObjectOutcome::Failed(ObjectFailure {
                name,
                reason: err.to_string(),
            }));
        }
    };

    let resolver = TimeZoneResolver::for_calendar(&ical);
    let ctx = TimeContext::new(&resolver, &evaluation.floating);
    let options = evaluation.limits.expansion;

    let instances = match matches(&evaluation.query.filter, &ical, &ctx, options) {
        Ok(MatchResult::Match(instances)) => instances,
        Ok(MatchResult::NoMatch) => {
            tracing::debug!(name = %name, "No match");
            return Ok(ObjectOutcome::NoMatch);
        }
        Err(MatchError::Collation(err)) => {
            return Err(QueryError::UnsupportedCollation(err.to_string()));
        }
        Err(MatchError::Expansion(err)) => {
            return Ok(ObjectOutcome::Failed(ObjectFailure {
                name,
                reason: err.to_string(),
            }));
        }
    };

    let properties = &evaluation.query.properties;
    if properties.wants_data() {
        let returned = evaluation.data_results.fetch_add(1, Ordering::AcqRel) + 1;
        if returned > evaluation.limits.max_results_with_data {
            evaluation.stop.cancel();
            tracing::info!(limit = evaluation.limits.max_results_with_data, "Result cap exceeded");
            return Err(QueryError::ResultSetTooLarge {
                limit: evaluation.limits.max_results_with_data,
            });
        }
    }

    if evaluation.should_stop() {
        return Ok(ObjectOutcome::Skipped);
    }

    let instances = if evaluation.instance_limited && evaluation.query.filter.find_time_range().is_none() {
        expand_object(&ical, &ctx, options)
    } else {
        instances
    };

    tracing::debug!(name = %name, instances = instances.len(), "Object matches");
    let payload = Projector::new(&raw, &ical, &evaluation.floating).project(
        &instances,
        evaluation.instance_limited,
        properties,
    );
    Ok(ObjectOutcome::Matched(QueryResult {
        name,
        payload,
        instances,
    }))
}

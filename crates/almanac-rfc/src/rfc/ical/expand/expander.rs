//! Recurrence expansion.
//!
//! A [`RecurrenceSet`] gathers the master component and RECURRENCE-ID
//! overrides sharing one UID, anchors every date value once, and then hands
//! out lazy, restartable [`Occurrences`] for any query window.

use std::iter::Peekable;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use rrule::RRuleSet;

use super::interval::{Interval, ResolvedTime, TimeContext, TimeRange, add_days};
use super::rule::{RecurrenceRule, wall_times};
use super::timezone::ZoneRef;
use crate::rfc::ical::core::{Component, ComponentKind, Period, Property, PropertyName, Value};

/// Error during recurrence expansion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpansionError {
    /// The RRULE could not be parsed or validated.
    #[error("Invalid recurrence rule {rule:?}: {reason}")]
    InvalidRecurrenceRule {
        /// The offending rule text.
        rule: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No component in the set has a usable DTSTART.
    #[error("Component {0} has no DTSTART")]
    MissingStart(String),
}

/// Limits applied while expanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionOptions {
    /// Maximum number of occurrences yielded. When the window has no upper
    /// bound this also caps the number of candidates examined.
    pub max_instances: usize,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            max_instances: 10_000,
        }
    }
}

/// One concrete instance of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// UID shared by the master and its overrides.
    pub uid: String,
    /// RECURRENCE-ID of the instance; `None` for non-recurring components.
    pub recurrence_id: Option<DateTime<Utc>>,
    /// Resolved interval.
    pub interval: Interval,
    /// Whether the instance is date-valued.
    pub all_day: bool,
    /// Index of the producing component among the VCALENDAR's children.
    pub source: usize,
    /// Whether the instance comes from a RECURRENCE-ID override.
    pub overridden: bool,
}

/// A fully collected expansion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expansion {
    /// Occurrences in ascending start order.
    pub occurrences: Vec<Occurrence>,
    /// Whether the instance cap stopped expansion early.
    pub truncated: bool,
}

impl Expansion {
    /// Returns whether the instance cap stopped expansion early.
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }
}

/// How an occurrence's end follows from its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    /// Point in time.
    Instant,
    /// Fixed elapsed time.
    Exact(TimeDelta),
    /// Whole days on the wall clock plus an exact remainder.
    Nominal { days: i64, exact: TimeDelta },
}

impl Span {
    /// Upper bound on how far an occurrence's end lies after its start.
    fn reach(self) -> Option<TimeDelta> {
        match self {
            Self::Instant => Some(TimeDelta::zero()),
            Self::Exact(delta) => Some(delta.max(TimeDelta::zero())),
            Self::Nominal { days, exact } => {
                TimeDelta::try_days(days.max(0))?.checked_add(&exact.max(TimeDelta::zero()))
            }
        }
    }

    fn interval(self, start: DateTime<Utc>, wall: NaiveDateTime, zone: &ZoneRef) -> Interval {
        match self {
            Self::Instant => Interval::instant(start),
            Self::Exact(delta) => Interval::new(start, start + delta),
            Self::Nominal { days, exact } => {
                Interval::new(start, zone.to_utc(add_days(wall, days)) + exact)
            }
        }
    }
}

/// A generated start.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    wall: NaiveDateTime,
    utc: DateTime<Utc>,
    /// Explicit end carried by a PERIOD RDATE.
    end: Option<DateTime<Utc>>,
}

/// An EXDATE entry.
#[derive(Debug, Clone, Copy)]
enum Exclusion {
    Instant(DateTime<Utc>),
    Day(NaiveDate),
}

#[derive(Debug)]
struct Master {
    source: usize,
    start: ResolvedTime,
    span: Span,
    rules: Vec<(RecurrenceRule, RRuleSet)>,
    rdates: Vec<Candidate>,
    exclusions: Vec<Exclusion>,
}

impl Master {
    fn is_recurring(&self) -> bool {
        !self.rules.is_empty() || !self.rdates.is_empty()
    }

    fn is_excluded(&self, candidate: &Candidate) -> bool {
        self.exclusions.iter().any(|ex| match ex {
            Exclusion::Instant(instant) => *instant == candidate.utc,
            Exclusion::Day(day) => *day == candidate.wall.date(),
        })
    }

    fn occurrence(&self, uid: &str, candidate: &Candidate) -> Occurrence {
        let interval = candidate.end.map_or_else(
            || self.span.interval(candidate.utc, candidate.wall, &self.start.zone),
            |end| Interval::new(candidate.utc, end),
        );
        Occurrence {
            uid: uid.to_string(),
            recurrence_id: self.is_recurring().then_some(candidate.utc),
            interval,
            all_day: self.start.all_day,
            source: self.source,
            overridden: false,
        }
    }
}

#[derive(Debug)]
struct Override {
    recurrence_id: ResolvedTime,
    occurrence: Occurrence,
}

/// A master component and its overrides, ready to expand.
#[derive(Debug)]
pub struct RecurrenceSet {
    uid: String,
    master: Option<Master>,
    overrides: Vec<Override>,
}

impl RecurrenceSet {
    /// ## Summary
    /// Builds a set from components sharing one UID.
    ///
    /// `group` pairs each component with its index among the VCALENDAR's
    /// children. The first component without RECURRENCE-ID is the master;
    /// components without DTSTART are skipped.
    ///
    /// ## Errors
    /// Returns `InvalidRecurrenceRule` if the master carries a malformed
    /// RRULE, and `MissingStart` if no component has a DTSTART.
    pub fn new(group: &[(usize, &Component)], ctx: &TimeContext<'_>) -> Result<Self, ExpansionError> {
        let uid = group
            .iter()
            .find_map(|(_, c)| c.uid())
            .unwrap_or_default()
            .to_string();

        let mut master = None;
        let mut pending = Vec::new();
        for (index, component) in group {
            if component.is_override() {
                pending.push((*index, *component));
            } else if master.is_none() {
                master = build_master(*index, component, ctx)?;
            } else {
                tracing::warn!(uid = %uid, "Ignoring duplicate master component");
            }
        }

        let mut overrides: Vec<Override> = pending
            .into_iter()
            .filter_map(|(index, component)| build_override(&uid, index, component, master.as_ref(), ctx))
            .collect();
        overrides.sort_by_key(|o| o.occurrence.interval);

        if master.is_none() && overrides.is_empty() {
            return Err(ExpansionError::MissingStart(uid));
        }

        Ok(Self {
            uid,
            master,
            overrides,
        })
    }

    /// Returns the UID of the set.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// ## Summary
    /// Returns a lazy iterator over occurrences overlapping `window`.
    ///
    /// The iterator yields occurrences in ascending start order. Calling this
    /// again with the same arguments yields the same sequence.
    #[must_use]
    pub fn occurrences(&self, window: TimeRange, options: ExpansionOptions) -> Occurrences<'_> {
        let overrides = self
            .overrides
            .iter()
            .map(|o| &o.occurrence)
            .filter(|o| o.interval.overlaps(&window))
            .collect::<Vec<_>>()
            .into_iter()
            .peekable();

        Occurrences {
            set: self,
            window,
            options,
            candidates: self.master.as_ref().map(|master| candidate_stream(master, window)),
            last_start: None,
            pending: None,
            overrides,
            examined: 0,
            yielded: 0,
            truncated: false,
        }
    }

    /// Collects every occurrence overlapping `window`.
    #[must_use]
    pub fn expand(&self, window: TimeRange, options: ExpansionOptions) -> Expansion {
        let mut iter = self.occurrences(window, options);
        let occurrences: Vec<Occurrence> = iter.by_ref().collect();
        Expansion {
            occurrences,
            truncated: iter.truncated(),
        }
    }

    fn is_overridden(&self, master: &Master, candidate: &Candidate) -> bool {
        self.overrides.iter().any(|o| {
            o.recurrence_id.utc == candidate.utc
                || ((master.start.all_day || o.recurrence_id.all_day)
                    && o.recurrence_id.wall.date() == candidate.wall.date())
        })
    }
}

type CandidateStream<'a> = Box<dyn Iterator<Item = Candidate> + 'a>;

/// Merges DTSTART, every RRULE and the RDATEs into one ascending stream.
///
/// Rules start near the window's lower bound when they can. A rule whose
/// first instance is not DTSTART gives up one instance of its COUNT, since
/// DTSTART is always the first occurrence.
fn candidate_stream(master: &Master, window: TimeRange) -> MergedCandidates<'_> {
    let zone = &master.start.zone;
    let first = Candidate {
        wall: master.start.wall,
        utc: master.start.utc,
        end: None,
    };
    // Two days cover any zone offset between wall and UTC.
    let target = window.start.and_then(|start| {
        let lookback = master.span.reach()?.checked_add(&TimeDelta::days(2))?;
        start.naive_utc().checked_sub_signed(lookback)
    });

    let mut streams: Vec<Peekable<CandidateStream<'_>>> = vec![
        (Box::new(std::iter::once(first)) as CandidateStream<'_>).peekable(),
        (Box::new(master.rdates.iter().copied()) as CandidateStream<'_>).peekable(),
    ];
    for (rule, set) in &master.rules {
        let reanchored = target
            .and_then(|target| rule.seek(master.start.wall, target))
            .and_then(|anchor| rule.anchor(anchor).ok());
        let mut walls = wall_times(reanchored.as_ref().unwrap_or(set)).peekable();
        let limit = match rule.count() {
            Some(count) if walls.peek() != Some(&master.start.wall) => count.saturating_sub(1),
            _ => usize::MAX,
        };
        let stream = walls
            .take(limit)
            .map(move |wall| Candidate {
                wall,
                utc: zone.to_utc(wall),
                end: None,
            })
            .take_while(move |c| rule.allows(c.wall, c.utc));
        streams.push((Box::new(stream) as CandidateStream<'_>).peekable());
    }
    MergedCandidates { streams }
}

struct MergedCandidates<'a> {
    streams: Vec<Peekable<CandidateStream<'a>>>,
}

impl Iterator for MergedCandidates<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let mut best: Option<(usize, DateTime<Utc>)> = None;
        for (index, stream) in self.streams.iter_mut().enumerate() {
            if let Some(candidate) = stream.peek()
                && best.is_none_or(|(_, utc)| candidate.utc < utc)
            {
                best = Some((index, candidate.utc));
            }
        }
        let (index, _) = best?;
        self.streams.get_mut(index)?.next()
    }
}

/// Lazy occurrences of a [`RecurrenceSet`] within one window.
pub struct Occurrences<'a> {
    set: &'a RecurrenceSet,
    window: TimeRange,
    options: ExpansionOptions,
    candidates: Option<MergedCandidates<'a>>,
    last_start: Option<DateTime<Utc>>,
    pending: Option<Occurrence>,
    overrides: Peekable<std::vec::IntoIter<&'a Occurrence>>,
    examined: usize,
    yielded: usize,
    truncated: bool,
}

impl Occurrences<'_> {
    /// Returns whether the instance cap stopped the iterator early.
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }

    fn next_generated(&mut self) -> Option<Occurrence> {
        let master = self.set.master.as_ref()?;
        let candidates = self.candidates.as_mut()?;
        loop {
            let candidate = candidates.next()?;
            if self.window.is_past(candidate.utc) {
                self.candidates = None;
                return None;
            }
            if self.last_start == Some(candidate.utc) {
                continue;
            }
            self.last_start = Some(candidate.utc);

            self.examined += 1;
            if self.window.end.is_none() && self.examined > self.options.max_instances {
                self.truncated = true;
                self.candidates = None;
                return None;
            }

            if master.is_excluded(&candidate) || self.set.is_overridden(master, &candidate) {
                tracing::trace!(uid = %self.set.uid, start = %candidate.utc, "Skipping excluded or overridden instance");
                continue;
            }

            let occurrence = master.occurrence(&self.set.uid, &candidate);
            if occurrence.interval.overlaps(&self.window) {
                return Some(occurrence);
            }
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        if self.pending.is_none() {
            self.pending = self.next_generated();
        }

        let take_override = match (&self.pending, self.overrides.peek()) {
            (Some(generated), Some(overridden)) => overridden.interval.start < generated.interval.start,
            (None, Some(_)) => true,
            (_, None) => false,
        };
        if take_override || self.pending.is_some() {
            if self.yielded >= self.options.max_instances {
                self.truncated = true;
                return None;
            }
            self.yielded += 1;
        }

        if take_override {
            self.overrides.next().cloned()
        } else {
            self.pending.take()
        }
    }
}

fn build_master(
    source: usize,
    component: &Component,
    ctx: &TimeContext<'_>,
) -> Result<Option<Master>, ExpansionError> {
    let Some(start) = component
        .property(&PropertyName::Dtstart)
        .and_then(|p| ctx.resolve_value(p))
    else {
        tracing::debug!(uid = ?component.uid(), "Component has no DTSTART");
        return Ok(None);
    };

    let span = span_of(component, &start, ctx);

    let mut rules = Vec::new();
    for prop in component.properties_named(&PropertyName::Rrule) {
        let text = prop.value.as_recur().unwrap_or(&prop.raw_value);
        let rule = RecurrenceRule::parse(text)?;
        let set = rule.anchor(start.wall)?;
        rules.push((rule, set));
    }
    if component.has_property(&PropertyName::Exrule) {
        tracing::warn!(uid = ?component.uid(), "EXRULE is not supported and is ignored");
    }

    let mut rdates: Vec<Candidate> = component
        .properties_named(&PropertyName::Rdate)
        .flat_map(|p| rdate_candidates(p, &start, ctx))
        .collect();
    rdates.sort_by_key(|c| c.utc);

    let exclusions = component
        .properties_named(&PropertyName::Exdate)
        .flat_map(|p| exclusions_of(p, &start, ctx))
        .collect();

    Ok(Some(Master {
        source,
        start,
        span,
        rules,
        rdates,
        exclusions,
    }))
}

fn build_override(
    uid: &str,
    source: usize,
    component: &Component,
    master: Option<&Master>,
    ctx: &TimeContext<'_>,
) -> Option<Override> {
    let recurrence_id = component
        .property(&PropertyName::RecurrenceId)
        .and_then(|p| ctx.resolve_value(p))?;
    if component
        .property(&PropertyName::RecurrenceId)
        .and_then(|p| p.get_param_value("RANGE"))
        .is_some_and(|range| range.eq_ignore_ascii_case("THISANDFUTURE"))
    {
        tracing::debug!(uid = %uid, "RANGE=THISANDFUTURE treated as a single-instance override");
    }

    let start = component
        .property(&PropertyName::Dtstart)
        .and_then(|p| ctx.resolve_value(p))
        .unwrap_or_else(|| recurrence_id.clone());

    let span = if has_explicit_end(component) {
        span_of(component, &start, ctx)
    } else {
        master.map_or_else(|| span_of(component, &start, ctx), |m| m.span)
    };

    let occurrence = Occurrence {
        uid: uid.to_string(),
        recurrence_id: Some(recurrence_id.utc),
        interval: span.interval(start.utc, start.wall, &start.zone),
        all_day: start.all_day,
        source,
        overridden: true,
    };
    Some(Override {
        recurrence_id,
        occurrence,
    })
}

fn has_explicit_end(component: &Component) -> bool {
    component.has_property(&PropertyName::Dtend)
        || component.has_property(&PropertyName::Due)
        || component.has_property(&PropertyName::Duration)
}

/// Derives the span from DTEND/DUE, DURATION, or the per-kind default.
fn span_of(component: &Component, start: &ResolvedTime, ctx: &TimeContext<'_>) -> Span {
    let end_name = if component.kind == ComponentKind::Todo {
        PropertyName::Due
    } else {
        PropertyName::Dtend
    };

    if let Some(end_prop) = component.property(&end_name)
        && let Some(end) = ctx.resolve_value(end_prop)
    {
        return if start.all_day && end.all_day {
            Span::Nominal {
                // A DATE end on or before the start still covers the start day.
                days: (end.wall.date() - start.wall.date()).num_days().max(1),
                exact: TimeDelta::zero(),
            }
        } else {
            Span::Exact(end.utc - start.utc)
        };
    }

    if let Some(duration) = component
        .property(&PropertyName::Duration)
        .and_then(Property::as_duration)
    {
        return Span::Nominal {
            days: duration.nominal_days(),
            exact: TimeDelta::seconds(duration.exact_seconds()),
        };
    }

    if start.all_day {
        Span::Nominal {
            days: 1,
            exact: TimeDelta::zero(),
        }
    } else {
        Span::Instant
    }
}

fn rdate_candidates(prop: &Property, start: &ResolvedTime, ctx: &TimeContext<'_>) -> Vec<Candidate> {
    let from_datetime = |dt: &crate::rfc::ical::core::DateTime| {
        let resolved = ctx.resolve_datetime(dt.local, &dt.form);
        rezone(&resolved, start)
    };
    let from_date = |date: &NaiveDate| {
        let resolved = ctx.resolve_date(*date);
        Candidate {
            wall: resolved.wall,
            utc: resolved.utc,
            end: None,
        }
    };

    match &prop.value {
        Value::DateTime(dt) => vec![from_datetime(dt)],
        Value::DateTimeList(list) => list.iter().map(from_datetime).collect(),
        Value::Date(date) => vec![from_date(date)],
        Value::DateList(list) => list.iter().map(from_date).collect(),
        Value::PeriodList(periods) => periods
            .iter()
            .map(|period| {
                let mut candidate = from_datetime(period.start());
                candidate.end = Some(match period {
                    Period::Explicit { end, .. } => ctx.resolve_datetime(end.local, &end.form).utc,
                    Period::Duration { duration, .. } => {
                        candidate.utc + TimeDelta::seconds(duration.as_seconds())
                    }
                });
                candidate
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Expresses a resolved value as a candidate on the master's wall clock.
fn rezone(resolved: &ResolvedTime, start: &ResolvedTime) -> Candidate {
    Candidate {
        wall: start.zone.from_utc(resolved.utc),
        utc: resolved.utc,
        end: None,
    }
}

fn exclusions_of(prop: &Property, start: &ResolvedTime, ctx: &TimeContext<'_>) -> Vec<Exclusion> {
    // All-day masters exclude by calendar day
    let instant = |dt: &crate::rfc::ical::core::DateTime| {
        if start.all_day {
            Exclusion::Day(dt.local.date())
        } else {
            Exclusion::Instant(ctx.resolve_datetime(dt.local, &dt.form).utc)
        }
    };
    match &prop.value {
        Value::DateTime(dt) => vec![instant(dt)],
        Value::DateTimeList(list) => list.iter().map(instant).collect(),
        Value::Date(date) => vec![Exclusion::Day(*date)],
        Value::DateList(list) => list.iter().copied().map(Exclusion::Day).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::rfc::ical::expand::timezone::{TimeZoneResolver, resolve_iana};
    use crate::rfc::ical::parse::parse;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeRange {
        TimeRange::between(start, end)
    }

    fn calendar(body: &str) -> crate::rfc::ical::core::ICalendar {
        let text = format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n{body}END:VCALENDAR\r\n");
        parse(&text).unwrap()
    }

    fn expand_with(body: &str, floating: &ZoneRef, range: TimeRange) -> Result<Expansion, ExpansionError> {
        let ical = calendar(body);
        let resolver = TimeZoneResolver::for_calendar(&ical);
        let ctx = TimeContext::new(&resolver, floating);
        let group: Vec<(usize, &Component)> = ical
            .root
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind.is_schedulable())
            .collect();
        let set = RecurrenceSet::new(&group, &ctx)?;
        Ok(set.expand(range, ExpansionOptions::default()))
    }

    fn expand(body: &str, range: TimeRange) -> Expansion {
        expand_with(body, &ZoneRef::Utc, range).unwrap()
    }

    fn starts(expansion: &Expansion) -> Vec<DateTime<Utc>> {
        expansion.occurrences.iter().map(|o| o.interval.start).collect()
    }

    #[test]
    fn single_instance_uses_declared_interval() {
        let exp = expand(
            "BEGIN:VEVENT\r\nUID:one\r\nDTSTART:20241005T090000Z\r\nDTEND:20241005T100000Z\r\nEND:VEVENT\r\n",
            window(utc(2024, 10, 1, 0), utc(2024, 11, 1, 0)),
        );
        assert_eq!(exp.occurrences.len(), 1);
        let occ = &exp.occurrences[0];
        assert_eq!(occ.interval, Interval::new(utc(2024, 10, 5, 9), utc(2024, 10, 5, 10)));
        assert_eq!(occ.recurrence_id, None);
        assert!(!occ.overridden);
    }

    #[test]
    fn weekly_rule_respects_half_open_window() {
        let exp = expand(
            "BEGIN:VEVENT\r\nUID:weekly\r\nDTSTART:20241001T090000Z\r\nDURATION:PT1H\r\nRRULE:FREQ=WEEKLY\r\nEND:VEVENT\r\n",
            window(utc(2024, 10, 1, 0), utc(2024, 10, 22, 0)),
        );
        assert_eq!(
            starts(&exp),
            vec![utc(2024, 10, 1, 9), utc(2024, 10, 8, 9), utc(2024, 10, 15, 9)]
        );
        assert!(!exp.truncated());
    }

    #[test]
    fn expansion_is_restartable() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:daily\r\nDTSTART:20240101T080000Z\r\nRRULE:FREQ=DAILY\r\nEND:VEVENT\r\n",
        );
        let resolver = TimeZoneResolver::for_calendar(&ical);
        let ctx = TimeContext::new(&resolver, &ZoneRef::Utc);
        let group: Vec<(usize, &Component)> = ical.root.children.iter().enumerate().collect();
        let set = RecurrenceSet::new(&group, &ctx).unwrap();
        let range = window(utc(2024, 3, 1, 0), utc(2024, 3, 8, 0));
        let first: Vec<_> = set.occurrences(range, ExpansionOptions::default()).collect();
        let second: Vec<_> = set.occurrences(range, ExpansionOptions::default()).collect();
        assert_eq!(first.len(), 7);
        assert_eq!(first, second);
    }

    #[test]
    fn count_and_until_bound_expansion() {
        let exp = expand(
            "BEGIN:VEVENT\r\nUID:c\r\nDTSTART:20240101T080000Z\r\nRRULE:FREQ=DAILY;COUNT=5\r\nEND:VEVENT\r\n",
            TimeRange::unbounded(),
        );
        assert_eq!(exp.occurrences.len(), 5);

        let exp = expand(
            "BEGIN:VEVENT\r\nUID:u\r\nDTSTART:20240101T080000Z\r\nRRULE:FREQ=DAILY;UNTIL=20240103T080000Z\r\nEND:VEVENT\r\n",
            TimeRange::unbounded(),
        );
        assert_eq!(
            starts(&exp),
            vec![utc(2024, 1, 1, 8), utc(2024, 1, 2, 8), utc(2024, 1, 3, 8)]
        );
        let mut sorted = starts(&exp);
        sorted.dedup();
        assert_eq!(sorted, starts(&exp));
    }

    #[test]
    fn exdate_removes_and_override_replaces() {
        let body = "BEGIN:VEVENT\r\nUID:r\r\nDTSTART:20241001T090000Z\r\nDURATION:PT1H\r\n\
RRULE:FREQ=DAILY;COUNT=4\r\nEXDATE:20241002T090000Z\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:r\r\nRECURRENCE-ID:20241003T090000Z\r\nDTSTART:20241003T150000Z\r\nEND:VEVENT\r\n";
        let exp = expand(body, TimeRange::unbounded());
        assert_eq!(
            starts(&exp),
            vec![utc(2024, 10, 1, 9), utc(2024, 10, 3, 15), utc(2024, 10, 4, 9)]
        );
        let replaced = &exp.occurrences[1];
        assert!(replaced.overridden);
        assert_eq!(replaced.source, 1);
        assert_eq!(replaced.recurrence_id, Some(utc(2024, 10, 3, 9)));
        // The override inherits the master's one hour span
        assert_eq!(replaced.interval.end, Some(utc(2024, 10, 3, 16)));
    }

    #[test]
    fn override_moved_into_window_is_found() {
        let body = "BEGIN:VEVENT\r\nUID:m\r\nDTSTART:20241001T090000Z\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:m\r\nRECURRENCE-ID:20241008T090000Z\r\nDTSTART:20241020T090000Z\r\nEND:VEVENT\r\n";
        let exp = expand(body, window(utc(2024, 10, 19, 0), utc(2024, 10, 21, 0)));
        assert_eq!(starts(&exp), vec![utc(2024, 10, 20, 9)]);
    }

    #[test]
    fn rdate_merges_in_order() {
        let body = "BEGIN:VEVENT\r\nUID:rd\r\nDTSTART:20241001T090000Z\r\nRRULE:FREQ=WEEKLY;COUNT=2\r\n\
RDATE:20241003T090000Z,20241008T090000Z\r\nEND:VEVENT\r\n";
        let exp = expand(body, TimeRange::unbounded());
        assert_eq!(
            starts(&exp),
            vec![utc(2024, 10, 1, 9), utc(2024, 10, 3, 9), utc(2024, 10, 8, 9)]
        );
    }

    #[test]
    fn dtstart_outside_rule_is_the_first_counted_instance() {
        let body = "BEGIN:VEVENT\r\nUID:mo\r\nDTSTART:20241001T090000Z\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO;COUNT=2\r\nEND:VEVENT\r\n";
        let exp = expand(body, TimeRange::unbounded());
        assert_eq!(starts(&exp), vec![utc(2024, 10, 1, 9), utc(2024, 10, 7, 9)]);

        let matching = "BEGIN:VEVENT\r\nUID:tu\r\nDTSTART:20241001T090000Z\r\n\
RRULE:FREQ=WEEKLY;BYDAY=TU;COUNT=2\r\nEND:VEVENT\r\n";
        let exp = expand(matching, TimeRange::unbounded());
        assert_eq!(starts(&exp), vec![utc(2024, 10, 1, 9), utc(2024, 10, 8, 9)]);
    }

    #[test]
    fn distant_window_skips_old_instances() {
        let minutely = "BEGIN:VEVENT\r\nUID:min\r\nDTSTART:20200101T000000Z\r\nRRULE:FREQ=MINUTELY\r\nEND:VEVENT\r\n";
        let exp = expand(minutely, window(utc(2024, 6, 1, 12), utc(2024, 6, 1, 12) + TimeDelta::minutes(5)));
        assert_eq!(exp.occurrences.len(), 5);
        assert_eq!(exp.occurrences[0].interval.start, utc(2024, 6, 1, 12));
        assert!(!exp.truncated());

        let biweekly = "BEGIN:VEVENT\r\nUID:bw\r\nDTSTART:20200107T090000Z\r\nDURATION:PT1H\r\n\
RRULE:FREQ=WEEKLY;INTERVAL=2;BYDAY=TU,TH\r\nEND:VEVENT\r\n";
        let exp = expand(biweekly, window(utc(2024, 6, 1, 0), utc(2024, 6, 15, 0)));
        assert_eq!(starts(&exp), vec![utc(2024, 6, 4, 9), utc(2024, 6, 6, 9)]);
    }

    #[test]
    fn all_day_event_ending_on_its_start_date_covers_the_day() {
        let body = "BEGIN:VEVENT\r\nUID:same\r\nDTSTART;VALUE=DATE:20241005\r\n\
DTEND;VALUE=DATE:20241005\r\nEND:VEVENT\r\n";
        let exp = expand(body, window(utc(2024, 10, 5, 12), utc(2024, 10, 5, 13)));
        assert_eq!(exp.occurrences.len(), 1);
        assert_eq!(
            exp.occurrences[0].interval,
            Interval::new(utc(2024, 10, 5, 0), utc(2024, 10, 6, 0))
        );
    }

    #[test]
    fn all_day_events_cover_their_day() {
        let body = "BEGIN:VEVENT\r\nUID:ad\r\nDTSTART;VALUE=DATE:20241005\r\nEND:VEVENT\r\n";
        let inside = expand(body, window(utc(2024, 10, 5, 20), utc(2024, 10, 5, 21)));
        assert_eq!(inside.occurrences.len(), 1);
        assert!(inside.occurrences[0].all_day);
        let next_day = expand(body, window(utc(2024, 10, 6, 0), utc(2024, 10, 7, 0)));
        assert!(next_day.occurrences.is_empty());
    }

    #[test]
    fn zoned_rule_keeps_local_time_across_dst() {
        let body = "BEGIN:VEVENT\r\nUID:ny\r\nDTSTART;TZID=America/New_York:20241027T090000\r\n\
RRULE:FREQ=WEEKLY;COUNT=2\r\nEND:VEVENT\r\n";
        let exp = expand(body, TimeRange::unbounded());
        assert_eq!(starts(&exp), vec![utc(2024, 10, 27, 13), utc(2024, 11, 3, 14)]);
    }

    #[test]
    fn floating_events_use_query_zone() {
        let body = "BEGIN:VEVENT\r\nUID:f\r\nDTSTART:20241005T090000\r\nEND:VEVENT\r\n";
        let zone = resolve_iana("America/New_York").unwrap();
        let exp = expand_with(body, &zone, TimeRange::unbounded()).unwrap();
        assert_eq!(starts(&exp), vec![utc(2024, 10, 5, 13)]);
    }

    #[test]
    fn invalid_rule_is_reported() {
        let body = "BEGIN:VEVENT\r\nUID:bad\r\nDTSTART:20241001T090000Z\r\nRRULE:FREQ=OFTEN\r\nEND:VEVENT\r\n";
        assert!(matches!(
            expand_with(body, &ZoneRef::Utc, TimeRange::unbounded()),
            Err(ExpansionError::InvalidRecurrenceRule { .. })
        ));
    }

    #[test]
    fn missing_start_is_reported() {
        let body = "BEGIN:VTODO\r\nUID:t\r\nDUE:20241001T090000Z\r\nEND:VTODO\r\n";
        assert!(matches!(
            expand_with(body, &ZoneRef::Utc, TimeRange::unbounded()),
            Err(ExpansionError::MissingStart(_))
        ));
    }

    #[test]
    fn unbounded_infinite_rule_is_capped() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:inf\r\nDTSTART:20240101T080000Z\r\nRRULE:FREQ=DAILY\r\nEND:VEVENT\r\n",
        );
        let resolver = TimeZoneResolver::new();
        let ctx = TimeContext::new(&resolver, &ZoneRef::Utc);
        let group: Vec<(usize, &Component)> = ical.root.children.iter().enumerate().collect();
        let set = RecurrenceSet::new(&group, &ctx).unwrap();
        let exp = set.expand(TimeRange::unbounded(), ExpansionOptions { max_instances: 50 });
        assert_eq!(exp.occurrences.len(), 50);
        assert!(exp.truncated());
    }
}

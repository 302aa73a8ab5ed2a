//! Filter evaluation against a single calendar object.
//!
//! Matching is synchronous and pure: the object is already parsed and every
//! timezone it needs is reachable through the [`TimeContext`].

use std::collections::HashMap;

use almanac_rfc::rfc::dav::core::{
    CollationError, ComponentFilter, FilterNode, ParamFilter, PropertyFilter, TimeRange,
};
use almanac_rfc::rfc::ical::core::{Component, ComponentKind, ICalendar, Property};
use almanac_rfc::rfc::ical::expand::{
    ExpansionError, ExpansionOptions, Interval, Occurrence, RecurrenceSet, TimeContext,
};
use thiserror::Error;

/// Errors that make a whole object fail closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error(transparent)]
    Collation(#[from] CollationError),

    #[error("Object cannot be expanded: {0}")]
    Expansion(#[from] ExpansionError),
}

/// Verdict for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    NoMatch,
    /// The object matches. The instances are the occurrences selected by
    /// time-range filters, sorted by start then UID; empty when the filter
    /// has no time-range.
    Match(Vec<Occurrence>),
}

impl MatchResult {
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match(_))
    }

    /// Returns the matched instances (empty for `NoMatch`).
    #[must_use]
    pub fn instances(&self) -> &[Occurrence] {
        match self {
            Self::NoMatch => &[],
            Self::Match(instances) => instances,
        }
    }

    #[must_use]
    pub fn into_instances(self) -> Vec<Occurrence> {
        match self {
            Self::NoMatch => Vec::new(),
            Self::Match(instances) => instances,
        }
    }
}

/// ## Summary
/// Evaluates a VCALENDAR filter against a parsed object.
///
/// Comp-filters OR across same-named sibling components and AND across
/// their children. A time-range on a top-level schedulable comp-filter
/// expands each UID's master and overrides together; the remaining children
/// are then checked against the component each occurrence came from.
///
/// An object with no top-level components never matches. Filters are
/// expected to have passed `validate_calendar_filter`, which rejects
/// time-ranges below the top level; such a time-range never matches here.
///
/// ## Errors
/// Returns `MatchError::Collation` for an unknown collation, and
/// `MatchError::Expansion` when the object's only recurrence set carries an
/// invalid recurrence rule. An invalid rule on one of several sets only
/// excludes that set.
#[tracing::instrument(skip_all, fields(filter = %filter.name))]
pub fn matches(
    filter: &ComponentFilter,
    ical: &ICalendar,
    ctx: &TimeContext<'_>,
    options: ExpansionOptions,
) -> Result<MatchResult, MatchError> {
    if ical.components().next().is_none() {
        tracing::debug!("Object has no components");
        return Ok(MatchResult::NoMatch);
    }

    let mut evaluator = Evaluator::new(ical, *ctx, options);
    let outcome = if ical.root.is_named(&filter.name) {
        if filter.is_not_defined {
            None
        } else {
            evaluator.children(filter, &ical.root)?
        }
    } else {
        filter.is_not_defined.then(Vec::new)
    };

    if let Some(err) = evaluator.rule_failures.into_iter().next()
        && ical.uids().len() <= 1
    {
        tracing::warn!(error = %err, "Only recurrence set of the object failed to expand");
        return Err(MatchError::Expansion(err));
    }

    Ok(match outcome {
        Some(mut instances) => {
            sort_instances(&mut instances);
            MatchResult::Match(instances)
        }
        None => MatchResult::NoMatch,
    })
}

/// ## Summary
/// Expands every recurrence set of an object without a window.
///
/// Used when expanded calendar data is requested but the filter carries no
/// time-range. Sets that fail to expand are skipped; each set yields at most
/// `options.max_instances` occurrences.
#[must_use]
pub fn expand_object(
    ical: &ICalendar,
    ctx: &TimeContext<'_>,
    options: ExpansionOptions,
) -> Vec<Occurrence> {
    let components: Vec<(usize, &Component)> = ical
        .root
        .children
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind != ComponentKind::Timezone)
        .collect();

    let mut instances = Vec::new();
    for group in group_by_uid(&components) {
        match RecurrenceSet::new(&group, ctx) {
            Ok(set) => {
                let expansion = set.expand(TimeRange::unbounded(), options);
                if expansion.truncated() {
                    tracing::warn!(uid = %set.uid(), limit = options.max_instances, "Expansion truncated");
                }
                instances.extend(expansion.occurrences);
            }
            Err(err) => tracing::warn!(error = %err, "Skipping recurrence set"),
        }
    }
    sort_instances(&mut instances);
    instances
}

fn sort_instances(instances: &mut Vec<Occurrence>) {
    instances.sort_by(|a, b| {
        a.interval
            .start
            .cmp(&b.interval.start)
            .then_with(|| a.uid.cmp(&b.uid))
            .then_with(|| a.recurrence_id.cmp(&b.recurrence_id))
    });
    instances.dedup();
}

/// Groups components by UID, keeping first-seen order. Components without
/// a UID each form their own group.
fn group_by_uid<'c>(components: &[(usize, &'c Component)]) -> Vec<Vec<(usize, &'c Component)>> {
    let mut groups: Vec<(Option<&str>, Vec<(usize, &Component)>)> = Vec::new();
    for &(index, component) in components {
        let uid = component.uid();
        let existing = uid.and_then(|uid| groups.iter_mut().find(|(key, _)| *key == Some(uid)));
        match existing {
            Some((_, group)) => group.push((index, component)),
            None => groups.push((uid, vec![(index, component)])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

struct Evaluator<'a> {
    ical: &'a ICalendar,
    ctx: TimeContext<'a>,
    options: ExpansionOptions,
    rule_failures: Vec<ExpansionError>,
    /// Verdicts of instance components against the current comp-filter,
    /// keyed by their index in the VCALENDAR.
    verdicts: HashMap<usize, bool>,
}

impl<'a> Evaluator<'a> {
    fn new(ical: &'a ICalendar, ctx: TimeContext<'a>, options: ExpansionOptions) -> Self {
        Self {
            ical,
            ctx,
            options,
            rule_failures: Vec::new(),
            verdicts: HashMap::new(),
        }
    }

    /// Evaluates every child of `filter` against `component`. Returns the
    /// union of instances, or `None` if any child fails.
    ///
    /// Time-range children are evaluated by the enclosing comp-filter.
    fn children(
        &mut self,
        filter: &ComponentFilter,
        component: &Component,
    ) -> Result<Option<Vec<Occurrence>>, MatchError> {
        let mut instances = Vec::new();
        for node in &filter.children {
            match node {
                FilterNode::Property(prop_filter) => {
                    if !self.property_matches(prop_filter, component)? {
                        return Ok(None);
                    }
                }
                FilterNode::Component(comp_filter) => {
                    match self.component_filter(comp_filter, component)? {
                        Some(found) => instances.extend(found),
                        None => return Ok(None),
                    }
                }
                FilterNode::TimeRange(_) => {}
            }
        }
        Ok(Some(instances))
    }

    fn component_filter(
        &mut self,
        filter: &ComponentFilter,
        parent: &Component,
    ) -> Result<Option<Vec<Occurrence>>, MatchError> {
        let candidates: Vec<(usize, &Component)> = parent
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_named(&filter.name))
            .collect();

        if filter.is_not_defined {
            return Ok(candidates.is_empty().then(Vec::new));
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        match filter.time_range() {
            Some(range) if std::ptr::eq(parent, &self.ical.root) => {
                self.instances_in_range(filter, *range, &candidates)
            }
            Some(_) => {
                tracing::debug!(component = %filter.name, "Time-range below the top level");
                Ok(None)
            }
            None => {
                let mut matched: Option<Vec<Occurrence>> = None;
                for (_, candidate) in &candidates {
                    if let Some(found) = self.children(filter, candidate)? {
                        matched.get_or_insert_with(Vec::new).extend(found);
                    }
                }
                Ok(matched)
            }
        }
    }

    /// Expands each UID group and keeps the occurrences whose instance
    /// component satisfies the other children of `filter`.
    fn instances_in_range(
        &mut self,
        filter: &ComponentFilter,
        range: TimeRange,
        candidates: &[(usize, &Component)],
    ) -> Result<Option<Vec<Occurrence>>, MatchError> {
        self.verdicts.clear();
        let mut found = Vec::new();

        for group in group_by_uid(candidates) {
            let set = match RecurrenceSet::new(&group, &self.ctx) {
                Ok(set) => set,
                Err(ExpansionError::MissingStart(uid)) => {
                    tracing::debug!(uid = %uid, "Component without DTSTART never matches a time-range");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Excluding component with invalid recurrence rule");
                    self.rule_failures.push(err);
                    continue;
                }
            };

            let mut occurrences = set.occurrences(range, self.options);
            for occurrence in occurrences.by_ref() {
                if self.instance_matches(filter, occurrence.source)? {
                    tracing::trace!(uid = %occurrence.uid, start = %occurrence.interval.start, "Instance matches");
                    found.push(occurrence);
                }
            }
            if occurrences.truncated() {
                tracing::warn!(uid = %set.uid(), limit = self.options.max_instances, "Expansion truncated");
            }
        }

        Ok((!found.is_empty()).then_some(found))
    }

    fn instance_matches(&mut self, filter: &ComponentFilter, source: usize) -> Result<bool, MatchError> {
        if let Some(&verdict) = self.verdicts.get(&source) {
            return Ok(verdict);
        }
        let ical = self.ical;
        let verdict = match ical.root.children.get(source) {
            Some(component) => self.children(filter, component)?.is_some(),
            None => false,
        };
        self.verdicts.insert(source, verdict);
        Ok(verdict)
    }

    fn property_matches(
        &self,
        filter: &PropertyFilter,
        component: &Component,
    ) -> Result<bool, MatchError> {
        let name = filter.property_name();
        let mut properties = component.properties_named(&name).peekable();

        if filter.is_not_defined {
            return Ok(properties.peek().is_none());
        }
        for property in properties {
            if self.property_instance_matches(filter, property)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn property_instance_matches(
        &self,
        filter: &PropertyFilter,
        property: &Property,
    ) -> Result<bool, MatchError> {
        if let Some(text_match) = &filter.text_match
            && !text_match.matches(property.match_text())?
        {
            return Ok(false);
        }
        if let Some(range) = &filter.time_range
            && !self.property_in_range(property, range)
        {
            return Ok(false);
        }
        for param_filter in &filter.param_filters {
            if !param_matches(param_filter, property)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn property_in_range(&self, property: &Property, range: &TimeRange) -> bool {
        let Some(resolved) = self.ctx.resolve_value(property) else {
            tracing::trace!(property = %property.name, "Property has no date value");
            return false;
        };
        let interval = if resolved.all_day {
            self.ctx.day_interval(resolved.wall.date())
        } else {
            Interval::instant(resolved.utc)
        };
        interval.overlaps(range)
    }
}

fn param_matches(filter: &ParamFilter, property: &Property) -> Result<bool, MatchError> {
    let param = property.get_param(&filter.name);
    if filter.is_not_defined {
        return Ok(param.is_none());
    }
    let Some(param) = param else {
        return Ok(false);
    };
    let Some(text_match) = &filter.text_match else {
        return Ok(true);
    };
    for value in &param.values {
        if text_match.matches(value)? {
            return Ok(true);
        }
    }
    Ok(false)
}

//! Calendar-data payloads for matching objects.

use std::collections::BTreeSet;

use almanac_rfc::rfc::dav::core::{CalendarDataRequest, ComponentSelection, ReportProperties};
use almanac_rfc::rfc::ical::build::{serialize, serialize_component};
use almanac_rfc::rfc::ical::core::{
    Component, ComponentKind, DateTime as IcalDateTime, ICalendar, Property, PropertyName,
};
use almanac_rfc::rfc::ical::expand::{Occurrence, ZoneRef};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Properties kept on a projected VCALENDAR regardless of selection.
const REQUIRED_CALENDAR_PROPERTIES: &[PropertyName] = &[PropertyName::Version, PropertyName::Prodid];

/// Recurrence properties dropped from standalone instance copies.
const RECURRENCE_PROPERTIES: &[PropertyName] = &[
    PropertyName::Rrule,
    PropertyName::Rdate,
    PropertyName::Exdate,
    PropertyName::Exrule,
];

/// ## Summary
/// Generates an `ETag` from the stored bytes using SHA256.
///
/// The `ETag` is the hex-encoded SHA256 hash of the content, wrapped in quotes.
#[must_use]
pub fn generate_etag(stored_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stored_bytes);
    let hash = hasher.finalize();
    format!("\"{}\"", hex::encode(hash))
}

/// The requested properties of one result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub etag: Option<String>,
    pub calendar_data: Option<String>,
}

/// Builds payloads for one stored object.
#[derive(Debug, Clone, Copy)]
pub struct Projector<'a> {
    raw: &'a str,
    ical: &'a ICalendar,
    floating: &'a ZoneRef,
}

impl<'a> Projector<'a> {
    /// `floating` is the zone DATE values were anchored in while matching.
    #[must_use]
    pub const fn new(raw: &'a str, ical: &'a ICalendar, floating: &'a ZoneRef) -> Self {
        Self { raw, ical, floating }
    }

    /// ## Summary
    /// Produces the requested properties.
    ///
    /// When `instance_limited` is false the stored text is returned verbatim
    /// (or the selected subset of it). Otherwise the calendar data holds only
    /// `instances`, see [`Projector::limited_calendar`].
    #[must_use]
    pub fn project(
        &self,
        instances: &[Occurrence],
        instance_limited: bool,
        properties: &ReportProperties,
    ) -> Payload {
        Payload {
            etag: properties.etag.then(|| generate_etag(self.raw.as_bytes())),
            calendar_data: properties
                .calendar_data
                .as_ref()
                .map(|request| self.calendar_data(instances, instance_limited, request)),
        }
    }

    fn calendar_data(
        &self,
        instances: &[Occurrence],
        instance_limited: bool,
        request: &CalendarDataRequest,
    ) -> String {
        match (instance_limited, &request.selection) {
            (false, None) => self.raw.to_string(),
            (false, Some(selection)) => serialize_component(&select(&self.ical.root, selection)),
            (true, None) => serialize(&self.limited_calendar(instances)),
            (true, Some(selection)) => {
                serialize_component(&select(&self.limited_calendar(instances).root, selection))
            }
        }
    }

    /// ## Summary
    /// Builds a VCALENDAR holding only the given instances.
    ///
    /// Overrides and non-recurring components are copied verbatim. Instances
    /// generated from a master become standalone copies with their own UTC
    /// DTSTART, end and RECURRENCE-ID and no recurrence properties. Every
    /// VTIMEZONE referenced by an emitted TZID is included.
    #[must_use]
    pub fn limited_calendar(&self, instances: &[Occurrence]) -> ICalendar {
        let mut components = Vec::with_capacity(instances.len());
        let mut emitted_sources = BTreeSet::new();

        for occurrence in instances {
            let Some(source) = self.ical.root.children.get(occurrence.source) else {
                tracing::warn!(uid = %occurrence.uid, source = occurrence.source, "Occurrence source out of range");
                continue;
            };
            match occurrence.recurrence_id {
                Some(recurrence_id) if !occurrence.overridden => {
                    components.push(self.standalone_instance(source, occurrence, recurrence_id));
                }
                // Each verbatim component appears once.
                _ => {
                    if emitted_sources.insert(occurrence.source) {
                        components.push(source.clone());
                    }
                }
            }
        }

        let mut tzids = BTreeSet::new();
        for component in &components {
            collect_tzids(component, &mut tzids);
        }

        let mut root = Component::named(&self.ical.root.name);
        root.properties = self.ical.root.properties.clone();
        root.children = self
            .ical
            .timezones()
            .filter(|tz| {
                tz.property(&PropertyName::Tzid)
                    .is_some_and(|tzid| tzids.contains(tzid.raw_value.as_str()))
            })
            .cloned()
            .collect();
        root.children.extend(components);
        ICalendar { root }
    }

    fn standalone_instance(
        &self,
        master: &Component,
        occurrence: &Occurrence,
        recurrence_id: DateTime<Utc>,
    ) -> Component {
        let mut instance = master.clone();
        for name in RECURRENCE_PROPERTIES {
            instance.remove_properties(name);
        }

        let end_name = if instance.has_property(&PropertyName::Due) {
            Some(PropertyName::Due)
        } else if instance.has_property(&PropertyName::Duration) {
            None
        } else {
            Some(PropertyName::Dtend)
        };
        instance.remove_properties(&PropertyName::Dtend);
        instance.remove_properties(&PropertyName::Due);

        instance.replace_property(self.time_property(
            PropertyName::Dtstart,
            occurrence.interval.start,
            occurrence.all_day,
        ));
        if let (Some(name), Some(end)) = (end_name, occurrence.interval.end) {
            instance.replace_property(self.time_property(name, end, occurrence.all_day));
        }
        instance.replace_property(self.time_property(
            PropertyName::RecurrenceId,
            recurrence_id,
            occurrence.all_day,
        ));
        instance
    }

    fn time_property(&self, name: PropertyName, instant: DateTime<Utc>, all_day: bool) -> Property {
        if all_day {
            Property::date(name, self.floating.from_utc(instant).date())
        } else {
            Property::datetime(name, IcalDateTime::utc(instant.naive_utc()))
        }
    }
}

/// ## Summary
/// Applies a partial-retrieval selection to a component tree.
///
/// Properties not selected are dropped, except VERSION and PRODID on a
/// VCALENDAR. When the selection lists components, unlisted children are
/// dropped.
#[must_use]
pub fn select(component: &Component, selection: &ComponentSelection) -> Component {
    let is_calendar = component.kind == ComponentKind::Calendar;
    let mut selected = Component::named(&component.name);
    selected.properties = component
        .properties
        .iter()
        .filter(|p| {
            selection.includes_prop(p.name.as_str())
                || (is_calendar && REQUIRED_CALENDAR_PROPERTIES.contains(&p.name))
        })
        .cloned()
        .collect();

    selected.children = if selection.restricts_comps() {
        component
            .children
            .iter()
            .filter_map(|child| selection.child(&child.name).map(|sel| select(child, sel)))
            .collect()
    } else {
        component.children.clone()
    };
    selected
}

fn collect_tzids<'c>(component: &'c Component, tzids: &mut BTreeSet<&'c str>) {
    for property in &component.properties {
        if let Some(tzid) = property.get_param_value("TZID") {
            tzids.insert(tzid);
        }
    }
    for child in &component.children {
        collect_tzids(child, tzids);
    }
}

#[cfg(test)]
mod tests {
    use almanac_rfc::rfc::ical::expand::{ExpansionOptions, TimeContext, TimeRange, TimeZoneResolver};
    use almanac_rfc::rfc::ical::parse::parse;
    use chrono::TimeZone;

    use super::*;
    use crate::caldav::matcher::expand_object;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    const NY_TZ: &str = "BEGIN:VTIMEZONE\r\nTZID:America/New_York\r\n\
BEGIN:STANDARD\r\nDTSTART:19701101T020000\r\nTZOFFSETFROM:-0400\r\nTZOFFSETTO:-0500\r\n\
RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU\r\nEND:STANDARD\r\n\
BEGIN:DAYLIGHT\r\nDTSTART:19700308T020000\r\nTZOFFSETFROM:-0500\r\nTZOFFSETTO:-0400\r\n\
RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU\r\nEND:DAYLIGHT\r\nEND:VTIMEZONE\r\n";

    fn stored(body: &str) -> String {
        format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n{body}END:VCALENDAR\r\n")
    }

    fn instances_in(ical: &ICalendar, range: TimeRange) -> Vec<Occurrence> {
        let resolver = TimeZoneResolver::for_calendar(ical);
        let ctx = TimeContext::new(&resolver, &ZoneRef::Utc);
        expand_object(ical, &ctx, ExpansionOptions::default())
            .into_iter()
            .filter(|o| o.interval.overlaps(&range))
            .collect()
    }

    #[test]
    fn etag_is_deterministic_and_quoted() {
        let etag = generate_etag(b"BEGIN:VCALENDAR");
        assert_eq!(etag, generate_etag(b"BEGIN:VCALENDAR"), "ETag should be deterministic");
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag.len(), 66);
        assert_ne!(etag, generate_etag(b"BEGIN:VCALENDAR\r\n"));
    }

    #[test]
    fn full_data_is_verbatim() {
        let raw = stored("BEGIN:VEVENT\r\nUID:a\r\nDTSTART:20241005T090000Z\r\nSUMMARY:Lunch\\, then nap\r\nEND:VEVENT\r\n");
        let ical = parse(&raw).unwrap();
        let payload = Projector::new(&raw, &ical, &ZoneRef::Utc).project(&[], false, &ReportProperties::with_data());
        assert_eq!(payload.calendar_data.as_deref(), Some(raw.as_str()));
        assert_eq!(payload.etag, Some(generate_etag(raw.as_bytes())));
    }

    #[test]
    fn etag_only_omits_data() {
        let raw = stored("BEGIN:VEVENT\r\nUID:a\r\nDTSTART:20241005T090000Z\r\nEND:VEVENT\r\n");
        let ical = parse(&raw).unwrap();
        let payload = Projector::new(&raw, &ical, &ZoneRef::Utc).project(&[], false, &ReportProperties::etag_only());
        assert!(payload.calendar_data.is_none());
        assert!(payload.etag.is_some());
    }

    #[test]
    fn limited_calendar_emits_standalone_instances() {
        let raw = stored(&format!(
            "{NY_TZ}BEGIN:VEVENT\r\nUID:w\r\nDTSTART;TZID=America/New_York:20241001T090000\r\n\
DTEND;TZID=America/New_York:20241001T100000\r\nRRULE:FREQ=WEEKLY\r\nEXDATE;TZID=America/New_York:20241015T090000\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:w\r\nRECURRENCE-ID;TZID=America/New_York:20241008T090000\r\n\
DTSTART;TZID=America/New_York:20241008T110000\r\nDTEND;TZID=America/New_York:20241008T120000\r\n\
SUMMARY:Moved\r\nEND:VEVENT\r\n"
        ));
        let ical = parse(&raw).unwrap();
        let instances = instances_in(&ical, TimeRange::between(utc(2024, 10, 1, 0), utc(2024, 10, 23, 0)));
        assert_eq!(instances.len(), 3);

        let limited = Projector::new(&raw, &ical, &ZoneRef::Utc).limited_calendar(&instances);
        let events: Vec<&Component> = limited.components().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(limited.timezones().count(), 1, "override keeps its TZID, so the VTIMEZONE is carried");

        let first = events[0];
        assert!(!first.has_property(&PropertyName::Rrule));
        assert!(!first.has_property(&PropertyName::Exdate));
        assert_eq!(first.property(&PropertyName::Dtstart).unwrap().raw_value, "20241001T130000Z");
        assert_eq!(first.property(&PropertyName::Dtend).unwrap().raw_value, "20241001T140000Z");
        assert_eq!(first.property(&PropertyName::RecurrenceId).unwrap().raw_value, "20241001T130000Z");

        assert_eq!(events[1].property(&PropertyName::Summary).unwrap().as_text(), Some("Moved"));
        assert_eq!(events[2].property(&PropertyName::Dtstart).unwrap().raw_value, "20241022T130000Z");
    }

    #[test]
    fn standalone_copies_drop_unreferenced_timezones() {
        let raw = stored(&format!(
            "{NY_TZ}BEGIN:VEVENT\r\nUID:d\r\nDTSTART;TZID=America/New_York:20241001T090000\r\n\
RRULE:FREQ=DAILY;COUNT=3\r\nEND:VEVENT\r\n"
        ));
        let ical = parse(&raw).unwrap();
        let instances = instances_in(&ical, TimeRange::between(utc(2024, 10, 2, 0), utc(2024, 10, 3, 0)));
        let limited = Projector::new(&raw, &ical, &ZoneRef::Utc).limited_calendar(&instances);
        assert_eq!(limited.components().count(), 1);
        assert_eq!(limited.timezones().count(), 0);
    }

    #[test]
    fn all_day_instances_stay_dates() {
        let raw = stored("BEGIN:VEVENT\r\nUID:ad\r\nDTSTART;VALUE=DATE:20241001\r\nRRULE:FREQ=DAILY;COUNT=2\r\nEND:VEVENT\r\n");
        let ical = parse(&raw).unwrap();
        let instances = instances_in(&ical, TimeRange::between(utc(2024, 10, 2, 0), utc(2024, 10, 3, 0)));
        let limited = Projector::new(&raw, &ical, &ZoneRef::Utc).limited_calendar(&instances);
        let event = limited.components().next().unwrap();
        let dtstart = event.property(&PropertyName::Dtstart).unwrap();
        assert_eq!(dtstart.raw_value, "20241002");
        assert_eq!(dtstart.get_param_value("VALUE"), Some("DATE"));
        assert_eq!(event.property(&PropertyName::RecurrenceId).unwrap().raw_value, "20241002");
    }

    #[test]
    fn selection_keeps_required_calendar_properties() {
        let raw = stored(
            "BEGIN:VEVENT\r\nUID:s\r\nDTSTART:20241005T090000Z\r\nSUMMARY:Secret\r\nBEGIN:VALARM\r\n\
ACTION:DISPLAY\r\nTRIGGER:-PT5M\r\nEND:VALARM\r\nEND:VEVENT\r\n",
        );
        let ical = parse(&raw).unwrap();
        let selection = ComponentSelection::new("VCALENDAR")
            .with_prop("X-NOTHING")
            .with_comp(ComponentSelection::new("VEVENT").with_prop("UID").with_prop("DTSTART").with_comp(ComponentSelection::new("X-NONE")));
        let properties = ReportProperties::etag_only()
            .with_calendar_data(CalendarDataRequest::with_selection(selection));
        let payload = Projector::new(&raw, &ical, &ZoneRef::Utc).project(&[], false, &properties);
        let data = payload.calendar_data.unwrap();

        assert!(data.contains("VERSION:2.0"));
        assert!(data.contains("PRODID:-//test//EN"));
        assert!(data.contains("UID:s"));
        assert!(!data.contains("SUMMARY"));
        assert!(!data.contains("VALARM"));
    }
}

//! RRULE handling on top of the `rrule` crate.
//!
//! Rules are evaluated on wall-clock time: DTSTART's local fields are fed to
//! `rrule` in its UTC zone, and the generated wall times are converted to
//! instants by the caller through the component's zone. That keeps the local
//! time-of-day stable across DST transitions. UNTIL is removed from the rule
//! text and applied here, because its form (DATE, floating, UTC) decides how
//! it compares against wall times.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use rrule::{Frequency, RRule, RRuleSet, Tz, Unvalidated};

use super::expander::ExpansionError;

/// The UNTIL bound of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntilBound {
    /// DATE form: inclusive through the end of that calendar day (wall clock).
    Date(NaiveDate),
    /// Floating DATE-TIME form: compared against wall-clock candidates.
    Wall(NaiveDateTime),
    /// UTC DATE-TIME form: compared against the candidate's instant.
    Instant(chrono::DateTime<Utc>),
}

/// A parsed recurrence rule, ready to be anchored at a DTSTART.
#[derive(Debug, Clone)]
pub struct RecurrenceRule {
    text: String,
    rule: String,
    until: Option<UntilBound>,
    count: Option<usize>,
    /// Wall-clock length of one INTERVAL, for frequencies where it is fixed.
    period: Option<TimeDelta>,
}

impl RecurrenceRule {
    /// ## Summary
    /// Parses RRULE text (`FREQ=...;...`), separating out UNTIL.
    ///
    /// ## Errors
    /// Returns `ExpansionError::InvalidRecurrenceRule` if UNTIL is malformed
    /// or the remaining rule is rejected by the recurrence engine.
    pub fn parse(text: &str) -> Result<Self, ExpansionError> {
        let text = text.trim();
        let text = text
            .strip_prefix("RRULE:")
            .or_else(|| text.strip_prefix("rrule:"))
            .unwrap_or(text);

        let mut until = None;
        let mut parts = Vec::new();
        for part in text.split(';').filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                    until = Some(parse_until(value).ok_or_else(|| invalid(text, "malformed UNTIL"))?);
                }
                _ => parts.push(part),
            }
        }

        let rule = parts.join(";");
        // Validate syntax early so a bad rule is reported once per component.
        let parsed = rule
            .parse::<RRule<Unvalidated>>()
            .map_err(|err| invalid(text, &err.to_string()))?;

        let unit = match parsed.get_freq() {
            Frequency::Weekly => Some(TimeDelta::weeks(1)),
            Frequency::Daily => Some(TimeDelta::days(1)),
            Frequency::Hourly => Some(TimeDelta::hours(1)),
            Frequency::Minutely => Some(TimeDelta::minutes(1)),
            Frequency::Secondly => Some(TimeDelta::seconds(1)),
            Frequency::Yearly | Frequency::Monthly => None,
        };

        Ok(Self {
            text: text.to_string(),
            until,
            count: parsed.get_count().and_then(|n| usize::try_from(n).ok()),
            period: unit.map(|unit| unit * i32::from(parsed.get_interval().max(1))),
            rule,
        })
    }

    /// Returns the rule text as written (without an `RRULE:` prefix).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns the UNTIL bound, if any.
    #[must_use]
    pub const fn until(&self) -> Option<UntilBound> {
        self.until
    }

    /// Returns the COUNT limit, if any.
    #[must_use]
    pub const fn count(&self) -> Option<usize> {
        self.count
    }

    /// ## Summary
    /// Returns a later anchor that generates the same instances as `dtstart`
    /// from `target` onwards.
    ///
    /// The anchor moves by whole INTERVAL periods and stays at least one
    /// period before `target`, so the period holding it is fully before
    /// `target`. Only frequencies with a fixed wall-clock period qualify, and
    /// never a rule with COUNT, whose numbering starts at DTSTART.
    #[must_use]
    pub fn seek(&self, dtstart: NaiveDateTime, target: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.count.is_some() {
            return None;
        }
        let period = self.period?.num_seconds();
        let gap = (target - dtstart).num_seconds();
        if period <= 0 {
            return None;
        }
        let periods = gap / period - 1;
        if periods < 1 {
            return None;
        }
        dtstart.checked_add_signed(TimeDelta::try_seconds(periods.checked_mul(period)?)?)
    }

    /// ## Summary
    /// Anchors the rule at a wall-clock DTSTART.
    ///
    /// ## Errors
    /// Returns `ExpansionError::InvalidRecurrenceRule` if the rule fails
    /// validation against this start (e.g. `INTERVAL=0`).
    pub fn anchor(&self, dtstart: NaiveDateTime) -> Result<RRuleSet, ExpansionError> {
        let start = Utc.from_utc_datetime(&dtstart).with_timezone(&Tz::UTC);
        self.rule
            .parse::<RRule<Unvalidated>>()
            .and_then(|rule| rule.build(start))
            .map_err(|err| invalid(&self.text, &err.to_string()))
    }

    /// ## Summary
    /// Returns whether a candidate is still within UNTIL.
    ///
    /// `wall` is the candidate's wall-clock time and `instant` its absolute
    /// time.
    #[must_use]
    pub fn allows(&self, wall: NaiveDateTime, instant: chrono::DateTime<Utc>) -> bool {
        match self.until {
            None => true,
            Some(UntilBound::Date(date)) => wall.date() <= date,
            Some(UntilBound::Wall(limit)) => wall <= limit,
            Some(UntilBound::Instant(limit)) => instant <= limit,
        }
    }
}

/// Iterates the wall-clock times an anchored rule generates.
pub(crate) fn wall_times(set: &RRuleSet) -> impl Iterator<Item = NaiveDateTime> + use<> {
    set.into_iter().map(|dt| dt.naive_utc())
}

fn parse_until(value: &str) -> Option<UntilBound> {
    let value = value.trim();
    if value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .map(UntilBound::Date);
    }
    let (body, utc) = match value.strip_suffix(['Z', 'z']) {
        Some(body) => (body, true),
        None => (value, false),
    };
    let wall = NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M%S").ok()?;
    Some(if utc {
        UntilBound::Instant(Utc.from_utc_datetime(&wall))
    } else {
        UntilBound::Wall(wall)
    })
}

fn invalid(rule: &str, reason: &str) -> ExpansionError {
    ExpansionError::InvalidRecurrenceRule {
        rule: rule.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    #[test]
    fn until_forms_are_separated() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;UNTIL=20241010").unwrap();
        assert_eq!(
            rule.until(),
            Some(UntilBound::Date(NaiveDate::from_ymd_opt(2024, 10, 10).unwrap()))
        );
        assert!(rule.allows(wall(2024, 10, 10, 23), Utc::now()));
        assert!(!rule.allows(wall(2024, 10, 11, 0), Utc::now()));

        let rule = RecurrenceRule::parse("RRULE:FREQ=DAILY;UNTIL=20241010T090000Z").unwrap();
        assert!(matches!(rule.until(), Some(UntilBound::Instant(_))));
        assert_eq!(rule.as_str(), "FREQ=DAILY;UNTIL=20241010T090000Z");
    }

    #[test]
    fn anchored_rule_yields_wall_times() {
        let rule = RecurrenceRule::parse("FREQ=WEEKLY;COUNT=3").unwrap();
        let set = rule.anchor(wall(2024, 10, 1, 9)).unwrap();
        let times: Vec<_> = wall_times(&set).collect();
        assert_eq!(
            times,
            vec![wall(2024, 10, 1, 9), wall(2024, 10, 8, 9), wall(2024, 10, 15, 9)]
        );
    }

    #[test]
    fn seeking_preserves_the_instance_grid() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;INTERVAL=3;BYHOUR=9,17").unwrap();
        let start = wall(2020, 1, 1, 9);
        let target = wall(2024, 6, 1, 0);
        let anchor = rule.seek(start, target).unwrap();
        assert!(anchor < target);
        assert_eq!((anchor - start).num_days() % 3, 0);

        let from_start: Vec<_> = wall_times(&rule.anchor(start).unwrap())
            .skip_while(|w| *w < target)
            .take(6)
            .collect();
        let from_anchor: Vec<_> = wall_times(&rule.anchor(anchor).unwrap())
            .skip_while(|w| *w < target)
            .take(6)
            .collect();
        assert_eq!(from_start, from_anchor);

        assert_eq!(rule.seek(start, wall(2020, 1, 4, 9)), None);
        let counted = RecurrenceRule::parse("FREQ=DAILY;COUNT=5000").unwrap();
        assert_eq!(counted.count(), Some(5000));
        assert_eq!(counted.seek(start, target), None);
        let monthly = RecurrenceRule::parse("FREQ=MONTHLY").unwrap();
        assert_eq!(monthly.seek(start, target), None);
    }

    #[test]
    fn malformed_rules_are_rejected() {
        assert!(matches!(
            RecurrenceRule::parse("FREQ=SOMETIMES"),
            Err(ExpansionError::InvalidRecurrenceRule { .. })
        ));
        assert!(RecurrenceRule::parse("FREQ=DAILY;UNTIL=tomorrow").is_err());
        let zero_interval = RecurrenceRule::parse("FREQ=DAILY;INTERVAL=0");
        assert!(
            zero_interval.is_err()
                || zero_interval
                    .and_then(|r| r.anchor(wall(2024, 1, 1, 0)))
                    .is_err()
        );
    }
}

//! iCalendar DURATION value type (RFC 5545 §3.3.6).

use std::fmt;

/// Duration value (RFC 5545 §3.3.6).
///
/// Week and day components are nominal (they follow the wall clock across
/// DST transitions); hour, minute and second components are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Duration {
    /// Whether this duration is negative.
    pub negative: bool,
    /// Number of weeks.
    pub weeks: u32,
    /// Number of days.
    pub days: u32,
    /// Number of hours.
    pub hours: u32,
    /// Number of minutes.
    pub minutes: u32,
    /// Number of seconds.
    pub seconds: u32,
}

impl Duration {
    /// Creates a new zero duration.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            negative: false,
            weeks: 0,
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }

    /// Creates a duration from days.
    #[must_use]
    pub const fn days(days: u32) -> Self {
        Self {
            days,
            ..Self::zero()
        }
    }

    /// Creates a duration from hours.
    #[must_use]
    pub const fn hours(hours: u32) -> Self {
        Self {
            hours,
            ..Self::zero()
        }
    }

    /// Returns the signed nominal part (weeks and days) in days.
    #[must_use]
    pub const fn nominal_days(&self) -> i64 {
        let days = self.weeks as i64 * 7 + self.days as i64;
        if self.negative { -days } else { days }
    }

    /// Returns the signed exact part (hours, minutes, seconds) in seconds.
    #[must_use]
    pub const fn exact_seconds(&self) -> i64 {
        let secs = self.hours as i64 * 3600 + self.minutes as i64 * 60 + self.seconds as i64;
        if self.negative { -secs } else { secs }
    }

    /// Returns the total duration as seconds, counting a day as 86400 seconds.
    #[must_use]
    pub const fn as_seconds(&self) -> i64 {
        self.nominal_days() * 86_400 + self.exact_seconds()
    }

    /// Returns whether this duration is zero length.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.as_seconds() == 0
    }

    /// Builds a duration from a signed number of seconds, using whole days
    /// where possible.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "Components are reduced by modulo before narrowing and days are clamped"
    )]
    pub fn from_seconds(total: i64) -> Self {
        let negative = total < 0;
        let abs = total.unsigned_abs();
        Self {
            negative,
            weeks: 0,
            days: (abs / 86_400).min(u64::from(u32::MAX)) as u32,
            hours: ((abs % 86_400) / 3600) as u32,
            minutes: ((abs % 3600) / 60) as u32,
            seconds: (abs % 60) as u32,
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;

        if self.weeks > 0 && self.days == 0 && self.exact_seconds() == 0 {
            return write!(f, "{}W", self.weeks);
        }

        let days = self.weeks * 7 + self.days;
        if days > 0 {
            write!(f, "{days}D")?;
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            write!(f, "T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds > 0 {
                write!(f, "{}S", self.seconds)?;
            }
        } else if days == 0 {
            write!(f, "T0S")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Duration::hours(1).to_string(), "PT1H");
        assert_eq!(Duration::days(2).to_string(), "P2D");
        assert_eq!(Duration::zero().to_string(), "PT0S");
        let weeks = Duration {
            weeks: 3,
            ..Duration::zero()
        };
        assert_eq!(weeks.to_string(), "P3W");
    }

    #[test]
    fn split_nominal_and_exact() {
        let d = Duration {
            negative: true,
            days: 1,
            hours: 2,
            ..Duration::zero()
        };
        assert_eq!(d.nominal_days(), -1);
        assert_eq!(d.exact_seconds(), -7200);
        assert_eq!(d.as_seconds(), -93_600);
    }

    #[test]
    fn from_seconds_uses_days() {
        let d = Duration::from_seconds(90_061);
        assert_eq!(d.to_string(), "P1DT1H1M1S");
        assert_eq!(Duration::from_seconds(-3600).to_string(), "-PT1H");
    }
}

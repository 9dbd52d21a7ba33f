//! Timezone-aware clock for the suspension triggers
//!
//! The daily suspension time is a wall-clock hour and minute compared in
//! the configured timezone; the extension expiry is an absolute RFC 2822
//! timestamp. The timezone is loaded once at startup and is process-wide.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Kitchen time format, e.g. `9:00PM`. Hour may be one or two digits.
const KITCHEN: &str = "%I:%M%p";

#[derive(Debug, Clone)]
pub struct Clock {
    tz: Tz,
}

impl Clock {
    pub fn new(timezone: &str) -> Result<Self> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| Error::UnknownTimezone(timezone.to_string()))?;
        Ok(Self { tz })
    }

    /// Current time in the configured timezone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Minute-of-day of `now` and of `suspend_at` (kitchen format).
    ///
    /// The daily trigger fires when the first value is >= the second.
    pub fn minutes_of_day(
        now: DateTime<Tz>,
        suspend_at: &str,
    ) -> Result<(u32, u32)> {
        let at = NaiveTime::parse_from_str(suspend_at, KITCHEN).map_err(|source| {
            Error::TimeParseError {
                value: suspend_at.to_string(),
                source,
            }
        })?;
        let now_mins = now.hour() * 60 + now.minute();
        let at_mins = at.hour() * 60 + at.minute();
        Ok((now_mins, at_mins))
    }

    /// Absolute expiry of a running-duration extension granted at `from`.
    pub fn next_suspend_time(from: DateTime<Tz>, extension: Duration) -> String {
        (from + extension).to_rfc2822()
    }

    /// Parse a `nextSuspendTime` annotation value.
    pub fn parse_next_suspend(value: &str) -> Result<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc2822(value).map_err(|source| Error::TimeParseError {
            value: value.to_string(),
            source,
        })
    }
}

//! Session time handling.
//!
//! A timetable session describes one operating day, but jobs may run past
//! midnight. `SessionTime` is therefore a minute-resolution instant measured
//! from the start of the session day, with an explicit day offset for times
//! after midnight.

use std::fmt;
use std::ops::{Add, Sub};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Error returned when parsing or building an invalid time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time: {reason}")]
pub struct TimeError {
    reason: &'static str,
}

impl TimeError {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// Anchor date for day 0 of a session. Only differences matter.
fn session_epoch() -> NaiveDateTime {
    NaiveDate::default().and_time(NaiveTime::MIN)
}

/// An instant within a timetable session.
///
/// # Examples
///
/// ```
/// use timetable_engine::domain::SessionTime;
/// use chrono::Duration;
///
/// let dep = SessionTime::parse_hhmm("23:50").unwrap();
/// let arr = dep + Duration::minutes(15);
/// assert_eq!(arr.day(), 1);
/// assert_eq!(arr.to_string(), "00:05+1");
/// assert_eq!(arr - dep, Duration::minutes(15));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTime(NaiveDateTime);

impl SessionTime {
    /// Build a time on the given session day.
    pub fn new(day: u32, hour: u32, minute: u32) -> Result<Self, TimeError> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| TimeError::new("hour must be 0-23 and minute 0-59"))?;
        let midnight = session_epoch()
            .checked_add_signed(Duration::days(i64::from(day)))
            .ok_or_else(|| TimeError::new("day offset out of range"))?;
        Ok(Self(midnight.date().and_time(time)))
    }

    /// Parse an "HH:MM" string on session day 0.
    pub fn parse_hhmm(s: &str) -> Result<Self, TimeError> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| TimeError::new("expected HH:MM"))?;
        if h.len() != 2 || m.len() != 2 {
            return Err(TimeError::new("expected two-digit hour and minute"));
        }
        let hour: u32 = h.parse().map_err(|_| TimeError::new("invalid hour digits"))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| TimeError::new("invalid minute digits"))?;
        Self::new(0, hour, minute)
    }

    /// Session day this time falls on (0 for the first day).
    pub fn day(&self) -> u32 {
        let days = self.0.date().signed_duration_since(session_epoch().date());
        u32::try_from(days.num_days()).unwrap_or(0)
    }

    /// Returns the hour (0-23).
    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    /// Returns the minute (0-59).
    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    /// Minutes elapsed since the start of session day 0.
    pub fn minutes_from_start(&self) -> i64 {
        self.0.signed_duration_since(session_epoch()).num_minutes()
    }

    /// Add a duration, returning `None` on overflow.
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        self.0.checked_add_signed(duration).map(Self)
    }

    /// Returns the duration between two times.
    ///
    /// Negative if `other` is later than `self`.
    pub fn signed_duration_since(&self, other: Self) -> Duration {
        self.0.signed_duration_since(other.0)
    }
}

impl Add<Duration> for SessionTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<Duration> for SessionTime {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl Sub<SessionTime> for SessionTime {
    type Output = Duration;

    fn sub(self, rhs: SessionTime) -> Self::Output {
        self.signed_duration_since(rhs)
    }
}

impl fmt::Debug for SessionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionTime({self})")
    }
}

impl fmt::Display for SessionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())?;
        match self.day() {
            0 => Ok(()),
            day => write!(f, "+{day}"),
        }
    }
}

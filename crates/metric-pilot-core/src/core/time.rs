// crates/metric-pilot-core/src/core/time.rs
// ============================================================================
// Module: Metric Pilot Time Model
// Description: Canonical timestamp and calendar-date representations.
// Purpose: Provide deterministic, replayable time values across core records.
// Dependencies: serde, time, thiserror
// ============================================================================

//! ## Overview
//! Metric Pilot uses explicit time values passed into core operations to keep
//! behavior deterministic. The core never reads wall-clock time directly;
//! hosts (the REST adapter, the scheduler driver, tests) supply a
//! [`Timestamp`] with every call that needs one. Calendar dates carry the ISO
//! `yyyy-mm-dd` string form on the wire and convert to [`time::Date`] for
//! bucketing arithmetic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::Duration;
use time::Month;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp advanced by whole minutes.
    #[must_use]
    pub const fn plus_minutes(self, minutes: i64) -> Self {
        Self(self.0.saturating_add(minutes.saturating_mul(60_000)))
    }

    /// Returns this timestamp advanced by whole seconds.
    #[must_use]
    pub const fn plus_seconds(self, seconds: i64) -> Self {
        Self(self.0.saturating_add(seconds.saturating_mul(1_000)))
    }

    /// Returns the age of this timestamp relative to `now` in whole hours.
    ///
    /// Future timestamps report an age of zero.
    #[must_use]
    pub const fn age_hours(self, now: Self) -> i64 {
        let delta = now.0.saturating_sub(self.0);
        if delta <= 0 { 0 } else { delta / 3_600_000 }
    }

    /// Converts this timestamp to the UTC calendar date it falls on.
    #[must_use]
    pub fn to_date(self) -> IsoDate {
        let seconds = self.0.div_euclid(1_000);
        let datetime = OffsetDateTime::from_unix_timestamp(seconds)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        IsoDate::from_date(datetime.date())
    }
}

// ============================================================================
// SECTION: Calendar Dates
// ============================================================================

/// Errors raised when parsing calendar dates.
#[derive(Debug, Error)]
pub enum DateError {
    /// Date string is not `yyyy-mm-dd`.
    #[error("invalid iso date: {0}")]
    Invalid(String),
}

/// ISO calendar date (`yyyy-mm-dd`) with a stable string form.
///
/// # Invariants
/// - The inner string is always a valid calendar date in canonical form.
/// - Ordering matches chronological order because the form is zero-padded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IsoDate(String);

impl IsoDate {
    /// Parses an ISO `yyyy-mm-dd` date string.
    ///
    /// # Errors
    ///
    /// Returns [`DateError::Invalid`] when the string is not a calendar date.
    pub fn parse(value: &str) -> Result<Self, DateError> {
        let date = parse_calendar_date(value).ok_or_else(|| DateError::Invalid(value.into()))?;
        Ok(Self::from_date(date))
    }

    /// Builds an ISO date from a calendar date.
    #[must_use]
    pub fn from_date(date: Date) -> Self {
        Self(format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day()))
    }

    /// Returns the date as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts to a [`time::Date`] for calendar arithmetic.
    #[must_use]
    pub fn to_date(&self) -> Date {
        parse_calendar_date(&self.0).unwrap_or(Date::MIN)
    }

    /// Returns this date shifted backward by whole days.
    #[must_use]
    pub fn minus_days(&self, days: i64) -> Self {
        Self::from_date(self.to_date().saturating_sub(Duration::days(days)))
    }

    /// Returns the Monday of this date's ISO week.
    #[must_use]
    pub fn week_monday(&self) -> Self {
        let date = self.to_date();
        let offset = i64::from(date.weekday().number_days_from_monday());
        Self::from_date(date.saturating_sub(Duration::days(offset)))
    }

    /// Returns the `yyyy-mm` month bucket for this date.
    #[must_use]
    pub fn month_bucket(&self) -> String {
        self.0.chars().take(7).collect()
    }
}

impl fmt::Display for IsoDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Parses a `yyyy-mm-dd` string into a calendar date.
fn parse_calendar_date(value: &str) -> Option<Date> {
    let mut parts = value.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

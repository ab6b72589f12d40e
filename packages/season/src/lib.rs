#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Winter season calendar.
//!
//! A season starting in year `Y` runs from 1 December `Y` through the last
//! day of February `Y + 1`, sampled at a fixed period. Track files index
//! their points into this sequence, so every consumer must agree on its
//! exact length, which depends on whether the data source keeps leap days.

use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

/// First run of eight consecutive digits (a `YYYYMMDD`-like stamp).
static DATE_STAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{8}").expect("valid regex"));

/// Days in December and January combined.
const DEC_JAN_DAYS: u32 = 62;

/// Errors raised while deriving a season calendar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeasonError {
    /// The identifier carries no eight-digit date stamp.
    #[error("Parse error: no 8-digit date stamp in {identifier:?}")]
    Parse {
        /// The identifier that was searched.
        identifier: String,
    },

    /// The sampling period does not evenly divide a day.
    #[error("Invalid sampling period: {period_hours}h does not divide 24h")]
    InvalidPeriod {
        /// The rejected period.
        period_hours: u32,
    },

    /// The start year cannot be represented as a calendar date.
    #[error("Invalid season start year: {year}")]
    InvalidYear {
        /// The rejected year.
        year: i32,
    },
}

/// Extracts the season start year from an opaque identifier such as a
/// track file name.
///
/// The first run of eight consecutive digits is located and its leading
/// four digits are taken as the year.
///
/// # Errors
///
/// Returns [`SeasonError::Parse`] if no eight-digit run exists.
pub fn start_year(identifier: &str) -> Result<i32, SeasonError> {
    DATE_STAMP_RE
        .find(identifier)
        .and_then(|stamp| stamp.as_str()[..4].parse().ok())
        .ok_or_else(|| SeasonError::Parse {
            identifier: identifier.to_string(),
        })
}

/// Gregorian leap year rule.
#[must_use]
pub const fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in the season starting in `start_year`.
#[must_use]
pub const fn season_days(start_year: i32, leap_days_enabled: bool) -> u32 {
    let february = if leap_days_enabled && is_leap_year(start_year + 1) {
        29
    } else {
        28
    };
    DEC_JAN_DAYS + february
}

/// Builds the regular timestamp sequence of the season starting in
/// `start_year`.
///
/// The sequence begins at `start_year`-12-01T00:00 and holds
/// `season_days * 24 / period_hours` samples. February has 29 days only
/// when `leap_days_enabled` is set and `start_year + 1` is a leap year;
/// some model calendars drop the leap day regardless of the civil calendar.
///
/// # Errors
///
/// Returns [`SeasonError::InvalidPeriod`] if `period_hours` is zero or does
/// not divide 24, or [`SeasonError::InvalidYear`] if the start date is out
/// of range.
pub fn season_range(
    start_year: i32,
    period_hours: u32,
    leap_days_enabled: bool,
) -> Result<Vec<NaiveDateTime>, SeasonError> {
    if period_hours == 0 || 24 % period_hours != 0 {
        return Err(SeasonError::InvalidPeriod { period_hours });
    }

    let start = NaiveDate::from_ymd_opt(start_year, 12, 1)
        .ok_or(SeasonError::InvalidYear { year: start_year })?
        .and_time(NaiveTime::MIN);

    let count = season_days(start_year, leap_days_enabled) * (24 / period_hours);
    let step = Duration::hours(i64::from(period_hours));

    Ok((0..count)
        .map(|k| start + step * i32::try_from(k).unwrap_or(i32::MAX))
        .collect())
}

/// Symmetric window `(centre - half_width, centre + half_width)`.
#[must_use]
pub fn shifted_window(centre: NaiveDateTime, half_width_hours: u32) -> (NaiveDateTime, NaiveDateTime) {
    let shift = Duration::hours(i64::from(half_width_hours));
    (centre - shift, centre + shift)
}

/// A winter season and its timestamp sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Season {
    start_year: i32,
    timestamps: Vec<NaiveDateTime>,
}

impl Season {
    /// Builds the season starting in `start_year`.
    ///
    /// # Errors
    ///
    /// See [`season_range`].
    pub fn new(
        start_year: i32,
        period_hours: u32,
        leap_days_enabled: bool,
    ) -> Result<Self, SeasonError> {
        let timestamps = season_range(start_year, period_hours, leap_days_enabled)?;
        log::trace!(
            "Season {start_year}: {} samples at {period_hours}h (leap days {})",
            timestamps.len(),
            if leap_days_enabled { "on" } else { "off" },
        );
        Ok(Self {
            start_year,
            timestamps,
        })
    }

    /// Builds the season whose start year is embedded in `identifier`.
    ///
    /// # Errors
    ///
    /// See [`start_year`] and [`season_range`].
    pub fn from_identifier(
        identifier: &str,
        period_hours: u32,
        leap_days_enabled: bool,
    ) -> Result<Self, SeasonError> {
        Self::new(start_year(identifier)?, period_hours, leap_days_enabled)
    }

    /// Calendar year in which the season starts.
    #[must_use]
    pub const fn start_year(&self) -> i32 {
        self.start_year
    }

    /// All timestamps of the season, in order.
    #[must_use]
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Number of samples in the season.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Always `false` for a valid season; present for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Timestamp at zero-based `offset`, if in range.
    #[must_use]
    pub fn timestamp_at(&self, offset: i64) -> Option<NaiveDateTime> {
        usize::try_from(offset)
            .ok()
            .and_then(|offset| self.timestamps.get(offset))
            .copied()
    }

    /// Timestamp of a raw provider index counted from `origin`.
    #[must_use]
    pub fn resolve(&self, raw_index: i64, origin: i64) -> Option<NaiveDateTime> {
        raw_index
            .checked_sub(origin)
            .and_then(|offset| self.timestamp_at(offset))
    }

    /// Label spanning both calendar years, e.g. `"20212022"`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}{}", self.start_year, self.start_year + 1)
    }
}

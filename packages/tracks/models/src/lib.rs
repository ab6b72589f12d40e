#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cyclone track types.
//!
//! A season's track file is split into [`Track`]s of raw [`TrackPoint`]s.
//! Once a track is resolved against its season calendar every point becomes
//! a [`TimedPoint`] carrying a real timestamp.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Origin of the raw time indices written by a track data provider.
///
/// Some providers count season samples from 0, others from 1. The origin is
/// subtracted from every raw index before it is looked up in the season.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum IndexOrigin {
    /// The first season sample is index 0.
    #[strum(serialize = "0-based")]
    Zero = 0,
    /// The first season sample is index 1.
    #[default]
    #[strum(serialize = "1-based")]
    One = 1,
}

impl IndexOrigin {
    /// The value subtracted from a raw index to get a zero-based offset.
    #[must_use]
    pub const fn offset(self) -> i64 {
        self as i64
    }

    /// Creates an origin from its numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither 0 nor 1.
    pub const fn from_value(value: u8) -> Result<Self, InvalidIndexOriginError> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            _ => Err(InvalidIndexOriginError { value }),
        }
    }
}

impl TryFrom<u8> for IndexOrigin {
    type Error = InvalidIndexOriginError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<IndexOrigin> for u8 {
    fn from(origin: IndexOrigin) -> Self {
        origin as Self
    }
}

/// Error returned when an index origin is not 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidIndexOriginError {
    /// The rejected value.
    pub value: u8,
}

impl std::fmt::Display for InvalidIndexOriginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid track index origin {}: expected 0 or 1", self.value)
    }
}

impl std::error::Error for InvalidIndexOriginError {}

/// Layout of a season track file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackFormat {
    /// Rows at the top of the file that carry no track data.
    pub header_rows: usize,
    /// Token in the time column that starts a new track.
    pub marker: String,
    /// Rows following each marker that hold per-track metadata.
    ///
    /// TRACK output carries a single `POINT_NUM` row after `TRACK_ID`, so
    /// such files are read with `metadata_rows = 1`. The default of 2 suits
    /// producers that add a start-time row as well.
    pub metadata_rows: usize,
}

impl Default for TrackFormat {
    fn default() -> Self {
        Self {
            header_rows: 3,
            marker: "TRACK_ID".to_string(),
            metadata_rows: 2,
        }
    }
}

/// A raw sample as written in the track file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Offset into the season's timestamp sequence (provider origin).
    pub time_index: i64,
    /// Longitude, normalized to `[-180, 180)`.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
}

/// One cyclone track within a season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// 1-based position of the track in its season file.
    pub index: usize,
    /// Samples in file order.
    pub points: Vec<TrackPoint>,
}

impl Track {
    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the track holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A track sample resolved to an absolute timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedPoint {
    /// Timestamp of the sample.
    pub time: NaiveDateTime,
    /// Longitude, normalized to `[-180, 180)`.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_origin_round_trips_through_u8() {
        assert_eq!(IndexOrigin::try_from(0), Ok(IndexOrigin::Zero));
        assert_eq!(IndexOrigin::try_from(1), Ok(IndexOrigin::One));
        assert_eq!(u8::from(IndexOrigin::One), 1);
        assert_eq!(IndexOrigin::One.offset(), 1);
        assert_eq!(IndexOrigin::Zero.offset(), 0);
    }

    #[test]
    fn index_origin_rejects_other_values() {
        let err = IndexOrigin::from_value(2).unwrap_err();
        assert_eq!(err.value, 2);
        assert_eq!(err.to_string(), "invalid track index origin 2: expected 0 or 1");
    }

    #[test]
    fn index_origin_displays_convention() {
        assert_eq!(IndexOrigin::Zero.to_string(), "0-based");
        assert_eq!(IndexOrigin::One.as_ref(), "1-based");
    }

    #[test]
    fn default_format_matches_track_files() {
        let format = TrackFormat::default();
        assert_eq!(format.header_rows, 3);
        assert_eq!(format.marker, "TRACK_ID");
        assert_eq!(format.metadata_rows, 2);
    }
}

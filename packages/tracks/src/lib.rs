#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parser for season track files.
//!
//! A track file holds every cyclone of one winter season:
//!
//! ```text
//! 0
//! 0 0
//! TRACK_NUM  2 ADD_FLD  0  0 &
//! TRACK_ID  1
//! POINT_NUM  3
//! ...
//! 12 355.5 51.2 ...
//! 13 358.0 52.0 ...
//! ```
//!
//! After a fixed header, a row whose time column holds the marker token
//! opens a new track. The rows directly after a marker carry per-track
//! metadata and are dropped (one `POINT_NUM` row in plain TRACK output, as
//! above; see [`TrackFormat::metadata_rows`]). The remaining
//! `TIME LON LAT [...]` rows up to the next marker (or the end of the file)
//! are the track's samples.

use std::path::Path;

use storm_footprints_season::{Season, SeasonError};
use storm_footprints_track_models::{IndexOrigin, TimedPoint, Track, TrackFormat, TrackPoint};

/// Errors that can occur while reading or resolving tracks.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// The file holds no marker rows, so track boundaries are unknown.
    #[error("Parse error: no {marker:?} marker rows found")]
    NoMarkers {
        /// The marker token that was searched for.
        marker: String,
    },

    /// A sample row has fewer than three columns.
    #[error("Parse error on line {line}: missing {field} column")]
    MissingField {
        /// 1-based line number in the file.
        line: usize,
        /// Name of the missing column.
        field: &'static str,
    },

    /// A sample column is not a number.
    #[error("Parse error on line {line}: invalid {field} value {value:?}")]
    InvalidField {
        /// 1-based line number in the file.
        line: usize,
        /// Name of the offending column.
        field: &'static str,
        /// The raw text that failed to parse.
        value: String,
    },

    /// A raw time index falls outside the season.
    #[error(
        "Track {track}: time index {time_index} ({origin}) is outside a season of {samples} samples"
    )]
    TimeIndexOutOfRange {
        /// 1-based track index.
        track: usize,
        /// The raw time index.
        time_index: i64,
        /// Index convention in effect.
        origin: IndexOrigin,
        /// Number of samples in the season.
        samples: usize,
    },

    /// The season calendar could not be derived.
    #[error("Season error: {0}")]
    Season(#[from] SeasonError),

    /// The track file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path of the track file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Remaps a longitude onto `[-180, 180)`.
///
/// Values already in range are returned untouched, which keeps the mapping
/// exactly idempotent under floating point.
#[must_use]
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) || lon.is_nan() {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid may round up to the modulus for inputs just below a multiple
    if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
}

/// Splits a season's raw track text into tracks.
///
/// Rows before the first marker are ignored, as are blank lines. Only the
/// first three columns of a sample row are read; longitudes are normalized
/// with [`normalize_longitude`].
///
/// # Errors
///
/// Returns [`TrackError::NoMarkers`] if the text holds no marker rows, or
/// [`TrackError::MissingField`] / [`TrackError::InvalidField`] for a
/// malformed sample row.
pub fn parse_season(raw_text: &str, format: &TrackFormat) -> Result<Vec<Track>, TrackError> {
    let mut tracks: Vec<Track> = Vec::new();
    // The open track and the number of metadata rows still to drop.
    let mut current: Option<(Track, usize)> = None;

    for (offset, line) in raw_text.lines().enumerate().skip(format.header_rows) {
        let line_no = offset + 1;
        let mut columns = line.split_whitespace();
        let Some(first) = columns.next() else {
            continue;
        };

        if first == format.marker {
            if let Some((track, _)) = current.take() {
                tracks.push(track);
            }
            let track = Track {
                index: tracks.len() + 1,
                points: Vec::new(),
            };
            current = Some((track, format.metadata_rows));
            continue;
        }

        let Some((track, metadata_left)) = current.as_mut() else {
            log::trace!("Skipping line {line_no} before the first track marker");
            continue;
        };

        if *metadata_left > 0 {
            *metadata_left -= 1;
            continue;
        }

        track.points.push(parse_point(line_no, first, &mut columns)?);
    }

    if let Some((track, _)) = current {
        tracks.push(track);
    }

    if tracks.is_empty() {
        return Err(TrackError::NoMarkers {
            marker: format.marker.clone(),
        });
    }

    log::debug!("Parsed {} tracks", tracks.len());
    Ok(tracks)
}

fn parse_point<'a>(
    line: usize,
    time: &str,
    columns: &mut impl Iterator<Item = &'a str>,
) -> Result<TrackPoint, TrackError> {
    let time_index = time.parse::<i64>().map_err(|_| TrackError::InvalidField {
        line,
        field: "time",
        value: time.to_string(),
    })?;
    let lon = parse_coordinate(line, "lon", columns.next())?;
    let lat = parse_coordinate(line, "lat", columns.next())?;

    Ok(TrackPoint {
        time_index,
        lon: normalize_longitude(lon),
        lat,
    })
}

fn parse_coordinate(line: usize, field: &'static str, raw: Option<&str>) -> Result<f64, TrackError> {
    let raw = raw.ok_or(TrackError::MissingField { line, field })?;
    raw.parse::<f64>().map_err(|_| TrackError::InvalidField {
        line,
        field,
        value: raw.to_string(),
    })
}

/// Reads and parses a season track file.
///
/// # Errors
///
/// Returns [`TrackError::Io`] if the file cannot be read, otherwise see
/// [`parse_season`].
pub fn parse_season_file(path: &Path, format: &TrackFormat) -> Result<Vec<Track>, TrackError> {
    let raw_text = std::fs::read_to_string(path).map_err(|source| TrackError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_season(&raw_text, format)
}

/// Resolves every raw time index of a track to its season timestamp.
///
/// The provider's `origin` is subtracted from each index before lookup.
///
/// # Errors
///
/// Returns [`TrackError::TimeIndexOutOfRange`] if any index falls outside
/// the season.
pub fn resolve_track(
    track: &Track,
    season: &Season,
    origin: IndexOrigin,
) -> Result<Vec<TimedPoint>, TrackError> {
    track
        .points
        .iter()
        .map(|point| {
            season
                .resolve(point.time_index, origin.offset())
                .map(|time| TimedPoint {
                    time,
                    lon: point.lon,
                    lat: point.lat,
                })
                .ok_or(TrackError::TimeIndexOutOfRange {
                    track: track.index,
                    time_index: point.time_index,
                    origin,
                    samples: season.len(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEASON: &str = "0
0 0
TRACK_NUM  2 ADD_FLD  0  0 &
TRACK_ID  1
POINT_NUM  2
START_TIME 2021120100
1 355.5 51.2 1.0e+00 &
2 358.0 52.0 1.2e+00 &
TRACK_ID  2
POINT_NUM  3
START_TIME 2021120500

17 10.0 60.0 2.0e+00 &
18 12.5 61.5
19 190.0 -10.0
";

    fn points(track: &Track) -> Vec<(i64, f64, f64)> {
        track
            .points
            .iter()
            .map(|p| (p.time_index, p.lon, p.lat))
            .collect()
    }

    #[test]
    fn splits_tracks_on_markers_and_drops_metadata() {
        let tracks = parse_season(SEASON, &TrackFormat::default()).unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].index, 1);
        assert_eq!(points(&tracks[0]), vec![(1, -4.5, 51.2), (2, -2.0, 52.0)]);
        assert_eq!(tracks[1].index, 2);
        assert_eq!(
            points(&tracks[1]),
            vec![(17, 10.0, 60.0), (18, 12.5, 61.5), (19, -170.0, -10.0)]
        );
    }

    #[test]
    fn last_track_runs_to_final_row() {
        let text = "h\nh\nh\nTRACK_ID 1\nmeta\nmeta\n5 1.0 2.0";
        let tracks = parse_season(text, &TrackFormat::default()).unwrap();
        assert_eq!(points(&tracks[0]), vec![(5, 1.0, 2.0)]);
    }

    #[test]
    fn marker_without_samples_yields_empty_track() {
        let text = "h\nh\nh\nTRACK_ID 1\nmeta\nmeta\nTRACK_ID 2\nmeta\nmeta\n3 0.0 0.0\n";
        let tracks = parse_season(text, &TrackFormat::default()).unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].is_empty());
        assert_eq!(tracks[1].len(), 1);
    }

    #[test]
    fn metadata_row_count_is_configurable() {
        let format = TrackFormat {
            metadata_rows: 1,
            ..TrackFormat::default()
        };
        let text = "h\nh\nh\nTRACK_ID 1\nPOINT_NUM 2\n1 0.0 50.0\n2 1.0 51.0\n";
        let tracks = parse_season(text, &format).unwrap();
        assert_eq!(tracks[0].len(), 2);

        // The default expects a second metadata row and drops the first sample.
        let tracks = parse_season(text, &TrackFormat::default()).unwrap();
        assert_eq!(tracks[0].len(), 1);
        assert_eq!(tracks[0].points[0].time_index, 2);
    }

    #[test]
    fn fails_without_markers() {
        let text = "h\nh\nh\n1 0.0 50.0\n2 1.0 51.0\n";
        assert!(matches!(
            parse_season(text, &TrackFormat::default()),
            Err(TrackError::NoMarkers { .. })
        ));
    }

    #[test]
    fn fails_on_non_numeric_fields() {
        let text = "h\nh\nh\nTRACK_ID 1\nm\nm\n1 east 50.0\n";
        let err = parse_season(text, &TrackFormat::default()).unwrap_err();
        assert!(matches!(
            err,
            TrackError::InvalidField {
                line: 7,
                field: "lon",
                ..
            }
        ));

        let text = "h\nh\nh\nTRACK_ID 1\nm\nm\n1.5 0.0 50.0\n";
        assert!(matches!(
            parse_season(text, &TrackFormat::default()),
            Err(TrackError::InvalidField { field: "time", .. })
        ));
    }

    #[test]
    fn fails_on_short_rows() {
        let text = "h\nh\nh\nTRACK_ID 1\nm\nm\n1 0.0\n";
        assert!(matches!(
            parse_season(text, &TrackFormat::default()),
            Err(TrackError::MissingField { field: "lat", .. })
        ));
    }

    #[test]
    fn normalize_longitude_wraps_into_range() {
        assert!((normalize_longitude(355.5) - -4.5).abs() < 1e-12);
        assert!((normalize_longitude(180.0) - -180.0).abs() < f64::EPSILON);
        assert!((normalize_longitude(-180.0) - -180.0).abs() < f64::EPSILON);
        assert!((normalize_longitude(540.0) - -180.0).abs() < f64::EPSILON);
        assert!((normalize_longitude(-190.0) - 170.0).abs() < 1e-12);
        assert!((normalize_longitude(0.1) - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn normalize_longitude_is_idempotent_and_bounded() {
        let mut x = -1000.0;
        while x < 1000.0 {
            let once = normalize_longitude(x);
            assert!((-180.0..180.0).contains(&once), "{x} -> {once}");
            assert_eq!(normalize_longitude(once).to_bits(), once.to_bits(), "{x}");
            x += 0.37;
        }
        for x in [-1e-20, 359.999_999_999_999_94, 180.0, -180.0, 720.0] {
            let once = normalize_longitude(x);
            assert!((-180.0..180.0).contains(&once), "{x} -> {once}");
            assert_eq!(normalize_longitude(once).to_bits(), once.to_bits());
        }
    }

    #[test]
    fn resolves_indices_with_provider_origin() {
        let tracks = parse_season(SEASON, &TrackFormat::default()).unwrap();
        let season = Season::new(2021, 6, true).unwrap();

        let one_based = resolve_track(&tracks[0], &season, IndexOrigin::One).unwrap();
        assert_eq!(one_based[0].time, season.timestamps()[0]);
        assert_eq!(one_based[1].time, season.timestamps()[1]);

        let zero_based = resolve_track(&tracks[0], &season, IndexOrigin::Zero).unwrap();
        assert_eq!(zero_based[0].time, season.timestamps()[1]);
        assert!((zero_based[0].lon - -4.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_indices_outside_the_season() {
        let text = "h\nh\nh\nTRACK_ID 1\nm\nm\n0 0.0 50.0\n";
        let tracks = parse_season(text, &TrackFormat::default()).unwrap();
        let season = Season::new(2021, 6, true).unwrap();

        assert!(matches!(
            resolve_track(&tracks[0], &season, IndexOrigin::One),
            Err(TrackError::TimeIndexOutOfRange { time_index: 0, .. })
        ));

        let text = "h\nh\nh\nTRACK_ID 1\nm\nm\n360 0.0 50.0\n";
        let tracks = parse_season(text, &TrackFormat::default()).unwrap();
        assert!(resolve_track(&tracks[0], &season, IndexOrigin::One).is_ok());
        assert!(resolve_track(&tracks[0], &season, IndexOrigin::Zero).is_err());
    }
}

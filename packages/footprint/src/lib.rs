#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cyclone wind footprints.
//!
//! For every in-domain point of a resolved track, a snapshot is taken: the
//! highest wind speed in each grid cell over a time window centred on the
//! point, kept only inside a circle around the cyclone centre. Stacking the
//! snapshots of a track in point order gives its footprint, a
//! `(time, latitude, longitude)` series with one slice per retained point.

use chrono::NaiveDateTime;
use ndarray::{Array2, Array3, Zip};
use rayon::prelude::*;
use storm_footprints_dataset::{DatasetError, GriddedSeries};
use storm_footprints_grid::Domain;
use storm_footprints_season::shifted_window;
use storm_footprints_track_models::TimedPoint;

/// Largest coordinate difference, as a fraction of the grid resolution,
/// still treated as the same grid line.
const ALIGNMENT_TOLERANCE: f64 = 1e-6;

/// Errors that can occur while building a footprint.
#[derive(Debug, thiserror::Error)]
pub enum FootprintError {
    /// The wind field is not on the domain grid.
    #[error("Grid mismatch on {axis}: {reason}")]
    GridMismatch {
        /// `"latitude"` or `"longitude"`.
        axis: &'static str,
        /// What differs.
        reason: String,
    },

    /// The stacked footprint could not be assembled.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

/// Spatial and temporal reach of a cyclone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactParams {
    /// Radius around the cyclone centre, in degrees.
    pub radius: f64,
    /// Hours before and after each track point.
    pub duration_hours: u32,
}

/// Masked wind maximum around one track point.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Time of the track point.
    pub time: NaiveDateTime,
    /// `[latitude, longitude]` wind maxima; `NaN` outside the mask.
    pub values: Array2<f32>,
}

fn check_axis(
    axis: &'static str,
    field: &[f64],
    domain: &[f64],
    resolution: f64,
) -> Result<(), FootprintError> {
    if field.len() != domain.len() {
        return Err(FootprintError::GridMismatch {
            axis,
            reason: format!(
                "wind field has {} points, domain has {}",
                field.len(),
                domain.len()
            ),
        });
    }

    let tolerance = ALIGNMENT_TOLERANCE * resolution;
    if let Some((position, (a, b))) = field
        .iter()
        .zip(domain)
        .enumerate()
        .find(|(_, (a, b))| (*a - *b).abs() > tolerance || a.is_nan())
    {
        return Err(FootprintError::GridMismatch {
            axis,
            reason: format!("point {position} is {a} in the wind field but {b} in the domain"),
        });
    }

    Ok(())
}

/// Checks that the wind field's coordinates are exactly the domain grid.
///
/// # Errors
///
/// Returns [`FootprintError::GridMismatch`] if either coordinate vector
/// differs in length or in any value.
pub fn check_alignment(wind_field: &GriddedSeries, domain: &Domain) -> Result<(), FootprintError> {
    check_axis(
        "latitude",
        wind_field.latitudes(),
        domain.latitudes(),
        domain.resolution(),
    )?;
    check_axis(
        "longitude",
        wind_field.longitudes(),
        domain.longitudes(),
        domain.resolution(),
    )
}

/// `NaN`-skipping per-cell maximum of the wind field over the closed range
/// `[earlier, later]`.
#[must_use]
pub fn max_over_window(
    wind_field: &GriddedSeries,
    earlier: NaiveDateTime,
    later: NaiveDateTime,
) -> Array2<f32> {
    wind_field.max_between(earlier, later)
}

/// Computes the snapshot of a single track point.
///
/// Returns `None` when the point lies outside the domain. When the wind
/// field has no samples inside the window the snapshot is entirely `NaN`.
#[must_use]
pub fn compute_point_snapshot(
    point: &TimedPoint,
    wind_field: &GriddedSeries,
    domain: &Domain,
    impact: &ImpactParams,
) -> Option<Snapshot> {
    let Some(mask) = domain.impact_mask(point.lon, point.lat, impact.radius) else {
        log::trace!(
            "Point ({}, {}) at {} lies outside the domain",
            point.lon,
            point.lat,
            point.time,
        );
        return None;
    };

    let (earlier, later) = shifted_window(point.time, impact.duration_hours);
    let mut values = max_over_window(wind_field, earlier, later);
    Zip::from(&mut values).and(&mask).for_each(|value, &inside| {
        if !inside {
            *value = f32::NAN;
        }
    });

    Some(Snapshot {
        time: point.time,
        values,
    })
}

/// Builds the footprint of one resolved track.
///
/// Snapshots are computed in parallel and stacked along time in point
/// order. Returns `Ok(None)` when no point of the track lies inside the
/// domain.
///
/// # Errors
///
/// Returns [`FootprintError::GridMismatch`] if the wind field is not on the
/// domain grid.
pub fn build_track_footprint(
    points: &[TimedPoint],
    wind_field: &GriddedSeries,
    domain: &Domain,
    impact: &ImpactParams,
) -> Result<Option<GriddedSeries>, FootprintError> {
    check_alignment(wind_field, domain)?;

    let snapshots: Vec<Snapshot> = points
        .par_iter()
        .filter_map(|point| compute_point_snapshot(point, wind_field, domain, impact))
        .collect();

    if snapshots.is_empty() {
        return Ok(None);
    }

    let (n_lat, n_lon) = domain.shape();
    let mut values = Array3::from_elem((snapshots.len(), n_lat, n_lon), f32::NAN);
    for (mut slice, snapshot) in values.outer_iter_mut().zip(&snapshots) {
        slice.assign(&snapshot.values);
    }
    let times = snapshots.iter().map(|snapshot| snapshot.time).collect();

    let footprint = GriddedSeries::new(
        wind_field.variable(),
        wind_field.units(),
        times,
        domain.latitudes().to_vec(),
        domain.longitudes().to_vec(),
        values,
    )?;

    log::trace!(
        "Built footprint with {} of {} points inside the domain",
        snapshots.len(),
        points.len(),
    );
    Ok(Some(footprint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use storm_footprints_grid::Bounds;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 12, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn domain() -> Domain {
        Domain::new(
            Bounds {
                west: 0.0,
                east: 4.0,
                south: 50.0,
                north: 54.0,
            },
            1.0,
        )
        .unwrap()
    }

    /// Eight 6-hourly slices where slice `t` holds `t + 1` everywhere.
    fn wind_field(domain: &Domain) -> GriddedSeries {
        let (n_lat, n_lon) = domain.shape();
        let times = (0..8).map(|k| start() + Duration::hours(6 * k)).collect();
        #[allow(clippy::cast_precision_loss)]
        let values = Array3::from_shape_fn((8, n_lat, n_lon), |(t, _, _)| (t + 1) as f32);
        GriddedSeries::new(
            "sfcWind",
            "m s-1",
            times,
            domain.latitudes().to_vec(),
            domain.longitudes().to_vec(),
            values,
        )
        .unwrap()
    }

    fn point(hours: i64, lon: f64, lat: f64) -> TimedPoint {
        TimedPoint {
            time: start() + Duration::hours(hours),
            lon,
            lat,
        }
    }

    const IMPACT: ImpactParams = ImpactParams {
        radius: 1.0,
        duration_hours: 6,
    };

    #[test]
    fn snapshot_masks_outside_circle_and_takes_window_max() {
        let domain = domain();
        let wind = wind_field(&domain);

        let snapshot = compute_point_snapshot(&point(12, 2.0, 52.0), &wind, &domain, &IMPACT)
            .unwrap();
        assert_eq!(snapshot.time, start() + Duration::hours(12));

        let kept: Vec<(usize, usize)> = snapshot
            .values
            .indexed_iter()
            .filter(|(_, v)| !v.is_nan())
            .map(|(ij, _)| ij)
            .collect();
        assert_eq!(kept, vec![(1, 2), (2, 1), (2, 2), (2, 3), (3, 2)]);
        assert!(
            kept.iter()
                .all(|&ij| (snapshot.values[ij] - 4.0).abs() < f32::EPSILON)
        );
    }

    #[test]
    fn snapshot_outside_domain_is_none() {
        let domain = domain();
        let wind = wind_field(&domain);
        assert!(compute_point_snapshot(&point(0, 10.0, 52.0), &wind, &domain, &IMPACT).is_none());
    }

    #[test]
    fn snapshot_without_samples_in_window_is_all_missing() {
        let domain = domain();
        let wind = wind_field(&domain);
        let snapshot =
            compute_point_snapshot(&point(24 * 30, 2.0, 52.0), &wind, &domain, &IMPACT).unwrap();
        assert!(snapshot.values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn all_outside_track_has_no_footprint() {
        let domain = domain();
        let wind = wind_field(&domain);
        let points = [point(0, -30.0, 52.0), point(6, 2.0, 80.0)];
        assert!(
            build_track_footprint(&points, &wind, &domain, &IMPACT)
                .unwrap()
                .is_none()
        );
        assert!(
            build_track_footprint(&[], &wind, &domain, &IMPACT)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn footprint_keeps_in_domain_points_in_order() {
        let domain = domain();
        let wind = wind_field(&domain);
        let points = [
            point(30, 1.0, 51.0),
            point(36, 9.0, 51.0),
            point(0, 3.0, 53.0),
        ];

        let footprint = build_track_footprint(&points, &wind, &domain, &IMPACT)
            .unwrap()
            .unwrap();
        assert_eq!(footprint.shape(), (2, 5, 5));
        assert_eq!(
            footprint.times(),
            &[start() + Duration::hours(30), start()]
        );
        assert!((footprint.values()[[0, 1, 1]] - 7.0).abs() < f32::EPSILON);
        assert!((footprint.values()[[1, 3, 3]] - 2.0).abs() < f32::EPSILON);
        assert!(footprint.values()[[1, 1, 1]].is_nan());
        assert_eq!(footprint.variable(), "sfcWind");
    }

    #[test]
    fn misaligned_wind_field_is_rejected() {
        let domain = domain();
        let other = Domain::new(
            Bounds {
                west: 0.5,
                east: 4.5,
                south: 50.0,
                north: 54.0,
            },
            1.0,
        )
        .unwrap();
        let wind = wind_field(&other);

        assert!(matches!(
            check_alignment(&wind, &domain),
            Err(FootprintError::GridMismatch {
                axis: "longitude",
                ..
            })
        ));
        assert!(matches!(
            build_track_footprint(&[point(0, 2.0, 52.0)], &wind, &domain, &IMPACT),
            Err(FootprintError::GridMismatch { .. })
        ));
    }
}

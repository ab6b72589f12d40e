#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fixed-resolution rectilinear domain grid.
//!
//! Builds the longitude/latitude coordinate vectors and 2-D coordinate grids
//! for a bounded region, answers point-in-domain and nearest-grid-cell
//! queries, and produces circular impact masks around a grid cell.
//!
//! All 2-D arrays are shaped `[latitude, longitude]`, matching the layout of
//! the gridded wind and population datasets.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Maximum deviation (in units of the resolution) for a span to still count
/// as an exact multiple of the resolution.
const MULTIPLE_TOLERANCE: f64 = 1e-9;

/// Errors raised when a domain definition is not a valid grid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    /// The grid step is zero, negative or not finite.
    #[error("Invalid domain: resolution must be positive and finite, got {resolution}")]
    InvalidResolution {
        /// The rejected resolution.
        resolution: f64,
    },

    /// The lower bound lies above the upper bound.
    #[error("Invalid domain: lower bound {min} lies above upper bound {max}")]
    InvertedBounds {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// The span between two bounds is not a whole number of grid steps.
    #[error("Invalid domain: span {span} is not a multiple of resolution {resolution}")]
    NotMultiple {
        /// Distance between the bounds.
        span: f64,
        /// The grid step.
        resolution: f64,
    },
}

/// Geographic bounds of a rectilinear domain, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Western (minimum longitude) bound.
    pub west: f64,
    /// Eastern (maximum longitude) bound.
    pub east: f64,
    /// Southern (minimum latitude) bound.
    pub south: f64,
    /// Northern (maximum latitude) bound.
    pub north: f64,
}

impl Bounds {
    /// Returns `true` if the point lies inside the closed bounds.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        contains_point(lon, lat, self)
    }
}

/// Number of whole steps between `min` and `max`.
fn step_count(min: f64, max: f64, step: f64) -> Result<usize, GridError> {
    if !step.is_finite() || step <= 0.0 {
        return Err(GridError::InvalidResolution { resolution: step });
    }

    let span = max - min;
    if !span.is_finite() || span < 0.0 {
        return Err(GridError::InvertedBounds { min, max });
    }

    let ratio = span / step;
    let steps = ratio.round();
    if (ratio - steps).abs() > MULTIPLE_TOLERANCE {
        return Err(GridError::NotMultiple {
            span,
            resolution: step,
        });
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(steps as usize)
}

/// Returns every value `min + k * step` up to and including `max`.
///
/// The upper bound is always part of the result (an exclusive range would
/// need to be extended by one step to reach it). The final element is
/// pinned to `max` exactly so accumulated rounding never drops it.
///
/// # Errors
///
/// Returns [`GridError`] if `step` is not positive, `max < min`, or the
/// span is not a whole number of steps.
pub fn build_vector(min: f64, max: f64, step: f64) -> Result<Vec<f64>, GridError> {
    let steps = step_count(min, max, step)?;

    #[allow(clippy::cast_precision_loss)]
    Ok((0..=steps)
        .map(|k| if k == steps { max } else { min + k as f64 * step })
        .collect())
}

/// Builds the 2-D longitude and latitude coordinate grids of a domain.
///
/// Returns `(lon_grid, lat_grid)`, both shaped `[n_lat, n_lon]`, where
/// `lon_grid[[i, j]]` is the `j`-th longitude and `lat_grid[[i, j]]` is the
/// `i`-th latitude.
///
/// # Errors
///
/// Returns [`GridError`] if either axis fails [`build_vector`].
pub fn build_grid(bounds: &Bounds, step: f64) -> Result<(Array2<f64>, Array2<f64>), GridError> {
    let longitudes = build_vector(bounds.west, bounds.east, step)?;
    let latitudes = build_vector(bounds.south, bounds.north, step)?;
    Ok(coordinate_grids(&longitudes, &latitudes))
}

fn coordinate_grids(longitudes: &[f64], latitudes: &[f64]) -> (Array2<f64>, Array2<f64>) {
    let shape = (latitudes.len(), longitudes.len());
    let lon_grid = Array2::from_shape_fn(shape, |(_, j)| longitudes[j]);
    let lat_grid = Array2::from_shape_fn(shape, |(i, _)| latitudes[i]);
    (lon_grid, lat_grid)
}

/// Returns `true` iff both coordinates lie within their closed intervals.
#[must_use]
pub fn contains_point(lon: f64, lat: f64, bounds: &Bounds) -> bool {
    (bounds.west..=bounds.east).contains(&lon) && (bounds.south..=bounds.north).contains(&lat)
}

/// Returns the position of the element closest to `target`.
///
/// Ties resolve to the first minimal element. `NaN` elements never win.
#[must_use]
pub fn nearest_position(values: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (position, value) in values.iter().enumerate() {
        let distance = (value - target).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance || distance.is_nan() => {}
            None if distance.is_nan() => {}
            _ => best = Some((position, distance)),
        }
    }

    best.map(|(position, _)| position)
}

/// Returns the element of `values` closest to `target`.
///
/// Distance is measured to the target value; ties resolve to the first
/// minimal element.
#[must_use]
pub fn nearest_index(values: &[f64], target: f64) -> Option<f64> {
    nearest_position(values, target).map(|position| values[position])
}

/// Builds a circular mask centred on `(centre_lon, centre_lat)`.
///
/// A cell is inside the mask when its Euclidean distance from the centre,
/// measured in grid-index units (degrees divided by `resolution`), is at
/// most `radius / resolution`.
///
/// This is a planar approximation: degrees of longitude and latitude are
/// treated as equal lengths. It only holds up while radius and resolution
/// stay small relative to the domain.
#[must_use]
pub fn circle_mask(
    centre_lon: f64,
    centre_lat: f64,
    lon_grid: &Array2<f64>,
    lat_grid: &Array2<f64>,
    radius: f64,
    resolution: f64,
) -> Array2<bool> {
    let grid_radius = radius / resolution;

    Zip::from(lon_grid)
        .and(lat_grid)
        .map_collect(|&lon, &lat| {
            let dx = (lon - centre_lon) / resolution;
            let dy = (lat - centre_lat) / resolution;
            dx.hypot(dy) <= grid_radius
        })
}

/// An immutable rectilinear domain with its derived coordinates.
///
/// Built once per run and shared read-only by every consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    bounds: Bounds,
    resolution: f64,
    longitudes: Vec<f64>,
    latitudes: Vec<f64>,
    lon_grid: Array2<f64>,
    lat_grid: Array2<f64>,
}

impl Domain {
    /// Validates the bounds against the resolution and derives the grid.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] if the longitude or latitude span is not a
    /// non-negative multiple of `resolution`.
    pub fn new(bounds: Bounds, resolution: f64) -> Result<Self, GridError> {
        let longitudes = build_vector(bounds.west, bounds.east, resolution)?;
        let latitudes = build_vector(bounds.south, bounds.north, resolution)?;
        let (lon_grid, lat_grid) = coordinate_grids(&longitudes, &latitudes);

        log::debug!(
            "Built {}x{} domain grid at {resolution} deg resolution",
            latitudes.len(),
            longitudes.len(),
        );

        Ok(Self {
            bounds,
            resolution,
            longitudes,
            latitudes,
            lon_grid,
            lat_grid,
        })
    }

    /// The domain bounds.
    #[must_use]
    pub const fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// The grid step in degrees.
    #[must_use]
    pub const fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Ascending longitude vector.
    #[must_use]
    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    /// Ascending latitude vector.
    #[must_use]
    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    /// 2-D longitude grid, shaped `[n_lat, n_lon]`.
    #[must_use]
    pub const fn lon_grid(&self) -> &Array2<f64> {
        &self.lon_grid
    }

    /// 2-D latitude grid, shaped `[n_lat, n_lon]`.
    #[must_use]
    pub const fn lat_grid(&self) -> &Array2<f64> {
        &self.lat_grid
    }

    /// `(n_lat, n_lon)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.latitudes.len(), self.longitudes.len())
    }

    /// Returns `true` if the point lies inside the closed domain bounds.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.bounds.contains(lon, lat)
    }

    /// Snaps a point to the nearest grid longitude and latitude.
    ///
    /// Returns `None` when the point lies outside the domain.
    #[must_use]
    pub fn snap(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !self.contains(lon, lat) {
            return None;
        }
        let grid_lon = nearest_index(&self.longitudes, lon)?;
        let grid_lat = nearest_index(&self.latitudes, lat)?;
        Some((grid_lon, grid_lat))
    }

    /// Circular mask of `radius` degrees around the grid cell nearest to the
    /// point, or `None` when the point lies outside the domain.
    #[must_use]
    pub fn impact_mask(&self, lon: f64, lat: f64, radius: f64) -> Option<Array2<bool>> {
        let (centre_lon, centre_lat) = self.snap(lon, lat)?;
        Some(circle_mask(
            centre_lon,
            centre_lat,
            &self.lon_grid,
            &self.lat_grid,
            radius,
            self.resolution,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn europe() -> Bounds {
        Bounds {
            west: -23.4375,
            east: 30.9375,
            south: 35.0625,
            north: 70.6875,
        }
    }

    #[test]
    fn build_vector_includes_both_bounds() {
        let cases = [(0.0, 10.0, 1.0), (-23.4375, 30.9375, 1.875), (0.1, 0.7, 0.1), (5.0, 5.0, 0.5)];

        for (min, max, step) in cases {
            let vector = build_vector(min, max, step).unwrap();
            let expected_len = ((max - min) / step).round() as usize + 1;
            assert_eq!(vector.len(), expected_len, "len for {min}..{max} by {step}");
            assert!((vector[0] - min).abs() < f64::EPSILON);
            assert!((vector[vector.len() - 1] - max).abs() < f64::EPSILON);
            assert!(vector.windows(2).all(|w| w[0] < w[1]), "not ascending");
        }
    }

    #[test]
    fn build_vector_rejects_non_multiple_span() {
        assert!(matches!(
            build_vector(0.0, 10.0, 3.0),
            Err(GridError::NotMultiple { .. })
        ));
    }

    #[test]
    fn build_vector_rejects_bad_step_and_inverted_bounds() {
        assert!(matches!(
            build_vector(0.0, 1.0, 0.0),
            Err(GridError::InvalidResolution { .. })
        ));
        assert!(matches!(
            build_vector(0.0, 1.0, -0.5),
            Err(GridError::InvalidResolution { .. })
        ));
        assert!(matches!(
            build_vector(1.0, 0.0, 0.5),
            Err(GridError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn build_grid_is_cartesian_product() {
        let bounds = Bounds {
            west: 0.0,
            east: 2.0,
            south: 10.0,
            north: 11.0,
        };
        let (lon_grid, lat_grid) = build_grid(&bounds, 1.0).unwrap();

        assert_eq!(lon_grid.dim(), (2, 3));
        assert_eq!(lat_grid.dim(), (2, 3));
        assert!((lon_grid[[1, 2]] - 2.0).abs() < f64::EPSILON);
        assert!((lat_grid[[1, 2]] - 11.0).abs() < f64::EPSILON);
        assert!((lon_grid[[0, 0]] - 0.0).abs() < f64::EPSILON);
        assert!((lat_grid[[0, 0]] - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn contains_point_is_boundary_inclusive() {
        let bounds = europe();
        assert!(contains_point(bounds.west, 50.0, &bounds));
        assert!(contains_point(bounds.east, bounds.north, &bounds));
        assert!(contains_point(0.0, bounds.south, &bounds));
        assert!(!contains_point(bounds.west - 0.01, 50.0, &bounds));
        assert!(!contains_point(0.0, bounds.north + 0.01, &bounds));
    }

    #[test]
    fn nearest_index_picks_closest_value() {
        let values = [1.0, 2.0, 3.0, 10.0];
        assert_eq!(nearest_index(&values, 2.6), Some(3.0));
        assert_eq!(nearest_index(&values, 2.4), Some(2.0));
        assert_eq!(nearest_index(&values, 100.0), Some(10.0));
        assert_eq!(nearest_index(&values, -4.0), Some(1.0));
    }

    #[test]
    fn nearest_index_breaks_ties_on_first_element() {
        assert_eq!(nearest_index(&[1.0, 5.0], 3.0), Some(1.0));
        assert_eq!(nearest_position(&[1.0, 5.0], 3.0), Some(0));
    }

    #[test]
    fn nearest_index_of_empty_is_none() {
        assert_eq!(nearest_index(&[], 3.0), None);
    }

    #[test]
    fn circle_mask_with_zero_radius_marks_only_centre() {
        let bounds = Bounds {
            west: 0.0,
            east: 4.0,
            south: 0.0,
            north: 4.0,
        };
        let (lon_grid, lat_grid) = build_grid(&bounds, 1.0).unwrap();
        let mask = circle_mask(0.0, 0.0, &lon_grid, &lat_grid, 0.0, 1.0);

        assert!(mask[[0, 0]]);
        assert_eq!(mask.iter().filter(|&&inside| inside).count(), 1);
    }

    #[test]
    fn circle_mask_radius_is_measured_in_grid_units() {
        let bounds = Bounds {
            west: 0.0,
            east: 10.0,
            south: 0.0,
            north: 10.0,
        };
        let (lon_grid, lat_grid) = build_grid(&bounds, 2.0).unwrap();
        // 4 degrees at 2 degree resolution reaches exactly two cells away.
        let mask = circle_mask(4.0, 4.0, &lon_grid, &lat_grid, 4.0, 2.0);

        assert!(mask[[2, 2]]);
        assert!(mask[[2, 4]]);
        assert!(mask[[0, 2]]);
        assert!(!mask[[0, 0]]);
        assert!(!mask[[2, 5]]);
        assert_eq!(mask.iter().filter(|&&inside| inside).count(), 13);
    }

    #[test]
    fn domain_snaps_to_nearest_cell() {
        let domain = Domain::new(europe(), 1.875).unwrap();
        assert_eq!(domain.shape(), (20, 30));

        let (lon, lat) = domain.snap(0.5, 50.1).unwrap();
        assert!((lon - 0.9375).abs() < 1e-12);
        assert!((lat - 50.0625).abs() < 1e-12);

        assert!(domain.snap(-40.0, 50.0).is_none());
    }

    #[test]
    fn domain_rejects_misaligned_bounds() {
        let mut bounds = europe();
        bounds.east += 0.5;
        assert!(matches!(
            Domain::new(bounds, 1.875),
            Err(GridError::NotMultiple { .. })
        ));
    }

    #[test]
    fn impact_mask_is_centred_on_snapped_cell() {
        let domain = Domain::new(europe(), 1.875).unwrap();
        let mask = domain.impact_mask(0.5, 50.1, 0.0).unwrap();
        let (n_lat, n_lon) = domain.shape();

        let mut hits = Vec::new();
        for i in 0..n_lat {
            for j in 0..n_lon {
                if mask[[i, j]] {
                    hits.push((i, j));
                }
            }
        }
        assert_eq!(hits, vec![(8, 13)]);
    }
}

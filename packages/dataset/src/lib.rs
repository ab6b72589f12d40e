#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Gridded dataset types and their on-disk format.
//!
//! Two shapes cover every dataset in the pipeline:
//!
//! - [`GriddedSeries`], `(time, latitude, longitude)`: wind fields and
//!   cyclone footprints.
//! - [`GriddedField`], `(latitude, longitude)`: population, climatology and
//!   severity fields.
//!
//! Missing data is `NaN`. Datasets are persisted as self-describing
//! `MessagePack` documents (named dimensions, coordinates, values) and are
//! always written atomically.

pub mod io;

use chrono::NaiveDateTime;
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

pub use io::{Dataset, read_dataset, write_atomic, write_dataset};

/// Dimension names of a [`GriddedSeries`].
pub const SERIES_DIMS: [&str; 3] = ["time", "latitude", "longitude"];

/// Dimension names of a [`GriddedField`].
pub const FIELD_DIMS: [&str; 2] = ["latitude", "longitude"];

/// Errors that can occur while building, reading or writing datasets.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// I/O error on a dataset file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization failed.
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A file could not be decoded as the expected dataset.
    #[error("Decode error at {path}: {source}")]
    Decode {
        /// Path that caused the error.
        path: String,
        /// Underlying decode error.
        source: rmp_serde::decode::Error,
    },

    /// Coordinate lengths disagree with the value array.
    #[error("Shape mismatch: coordinates describe {expected:?} but values are {actual:?}")]
    Shape {
        /// Shape implied by the coordinates.
        expected: Vec<usize>,
        /// Shape of the value array.
        actual: Vec<usize>,
    },

    /// The stored dimension names are not the expected ones.
    #[error("Unexpected dimensions {actual:?}, expected {expected:?}")]
    Dimensions {
        /// Expected dimension names.
        expected: Vec<String>,
        /// Stored dimension names.
        actual: Vec<String>,
    },
}

fn dims(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

/// `NaN`-skipping maximum of two values.
#[must_use]
pub fn nan_max(a: f32, b: f32) -> f32 {
    match (a.is_nan(), b.is_nan()) {
        (true, _) => b,
        (_, true) => a,
        _ => a.max(b),
    }
}

/// A `(time, latitude, longitude)` dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GriddedSeries {
    variable: String,
    units: String,
    dims: Vec<String>,
    times: Vec<NaiveDateTime>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    values: Array3<f32>,
}

impl GriddedSeries {
    /// Builds a series, checking the coordinates against the value shape.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Shape`] if `values` is not shaped
    /// `[times, latitudes, longitudes]`.
    pub fn new(
        variable: impl Into<String>,
        units: impl Into<String>,
        times: Vec<NaiveDateTime>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        values: Array3<f32>,
    ) -> Result<Self, DatasetError> {
        let series = Self {
            variable: variable.into(),
            units: units.into(),
            dims: dims(&SERIES_DIMS),
            times,
            latitudes,
            longitudes,
            values,
        };
        series.check()?;
        Ok(series)
    }

    fn check(&self) -> Result<(), DatasetError> {
        if self.dims != dims(&SERIES_DIMS) {
            return Err(DatasetError::Dimensions {
                expected: dims(&SERIES_DIMS),
                actual: self.dims.clone(),
            });
        }
        let expected = vec![self.times.len(), self.latitudes.len(), self.longitudes.len()];
        if self.values.shape() != expected.as_slice() {
            return Err(DatasetError::Shape {
                expected,
                actual: self.values.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Name of the stored variable (e.g. `sfcWind`).
    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Units of the stored variable.
    #[must_use]
    pub fn units(&self) -> &str {
        &self.units
    }

    /// Timestamps along the time axis.
    #[must_use]
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    /// Latitude coordinates.
    #[must_use]
    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    /// Longitude coordinates.
    #[must_use]
    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    /// The `[time, latitude, longitude]` value array.
    #[must_use]
    pub const fn values(&self) -> &Array3<f32> {
        &self.values
    }

    /// `(n_time, n_lat, n_lon)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        self.values.dim()
    }

    /// Spatial slice at time position `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t` is out of bounds.
    #[must_use]
    pub fn slice(&self, t: usize) -> ArrayView2<'_, f32> {
        self.values.index_axis(Axis(0), t)
    }

    /// `NaN`-skipping maximum over the closed time range `[earlier, later]`.
    ///
    /// Cells with no valid sample in range (including the case of no
    /// timestamps in range at all) are `NaN`.
    #[must_use]
    pub fn max_between(&self, earlier: NaiveDateTime, later: NaiveDateTime) -> Array2<f32> {
        let (_, n_lat, n_lon) = self.shape();
        let mut result = Array2::from_elem((n_lat, n_lon), f32::NAN);

        for (t, time) in self.times.iter().enumerate() {
            if *time < earlier || *time > later {
                continue;
            }
            Zip::from(&mut result)
                .and(self.slice(t))
                .for_each(|acc, &value| *acc = nan_max(*acc, value));
        }

        result
    }

    /// `NaN`-skipping maximum over the whole time axis.
    #[must_use]
    pub fn max_over_time(&self) -> Array2<f32> {
        self.values
            .fold_axis(Axis(0), f32::NAN, |&acc, &value| nan_max(acc, value))
    }

    /// Bitwise equality, treating identical `NaN` payloads as equal.
    #[must_use]
    pub fn same_bits(&self, other: &Self) -> bool {
        self.variable == other.variable
            && self.units == other.units
            && self.times == other.times
            && coords_same_bits(&self.latitudes, &other.latitudes)
            && coords_same_bits(&self.longitudes, &other.longitudes)
            && self.values.shape() == other.values.shape()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// A `(latitude, longitude)` dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GriddedField {
    variable: String,
    units: String,
    dims: Vec<String>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    values: Array2<f32>,
}

impl GriddedField {
    /// Builds a field, checking the coordinates against the value shape.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Shape`] if `values` is not shaped
    /// `[latitudes, longitudes]`.
    pub fn new(
        variable: impl Into<String>,
        units: impl Into<String>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        values: Array2<f32>,
    ) -> Result<Self, DatasetError> {
        let field = Self {
            variable: variable.into(),
            units: units.into(),
            dims: dims(&FIELD_DIMS),
            latitudes,
            longitudes,
            values,
        };
        field.check()?;
        Ok(field)
    }

    fn check(&self) -> Result<(), DatasetError> {
        if self.dims != dims(&FIELD_DIMS) {
            return Err(DatasetError::Dimensions {
                expected: dims(&FIELD_DIMS),
                actual: self.dims.clone(),
            });
        }
        let expected = vec![self.latitudes.len(), self.longitudes.len()];
        if self.values.shape() != expected.as_slice() {
            return Err(DatasetError::Shape {
                expected,
                actual: self.values.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Name of the stored variable.
    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Units of the stored variable.
    #[must_use]
    pub fn units(&self) -> &str {
        &self.units
    }

    /// Latitude coordinates.
    #[must_use]
    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    /// Longitude coordinates.
    #[must_use]
    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    /// The `[latitude, longitude]` value array.
    #[must_use]
    pub const fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// `(n_lat, n_lon)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Returns a copy carrying new values on the same coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Shape`] if `values` does not match the grid.
    pub fn with_values(
        &self,
        variable: impl Into<String>,
        units: impl Into<String>,
        values: Array2<f32>,
    ) -> Result<Self, DatasetError> {
        Self::new(
            variable,
            units,
            self.latitudes.clone(),
            self.longitudes.clone(),
            values,
        )
    }

    /// Bitwise equality, treating identical `NaN` payloads as equal.
    #[must_use]
    pub fn same_bits(&self, other: &Self) -> bool {
        self.variable == other.variable
            && self.units == other.units
            && coords_same_bits(&self.latitudes, &other.latitudes)
            && coords_same_bits(&self.longitudes, &other.longitudes)
            && self.values.shape() == other.values.shape()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

fn coords_same_bits(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hour(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 12, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn series() -> GriddedSeries {
        let values = Array3::from_shape_vec(
            (3, 1, 2),
            vec![1.0, f32::NAN, 5.0, f32::NAN, 2.0, 7.0],
        )
        .unwrap();
        GriddedSeries::new(
            "sfcWind",
            "m s-1",
            vec![hour(0), hour(6), hour(12)],
            vec![50.0],
            vec![0.0, 1.0],
            values,
        )
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let err = GriddedSeries::new(
            "sfcWind",
            "m s-1",
            vec![hour(0)],
            vec![50.0, 51.0],
            vec![0.0],
            Array3::zeros((1, 1, 1)),
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::Shape { .. }));

        let err = GriddedField::new("population", "1", vec![50.0], vec![], Array2::zeros((1, 1)))
            .unwrap_err();
        assert!(matches!(err, DatasetError::Shape { .. }));
    }

    #[test]
    fn max_between_skips_nan_and_respects_closed_window() {
        let s = series();
        let max = s.max_between(hour(0), hour(6));
        assert!((max[[0, 0]] - 5.0).abs() < f32::EPSILON);
        assert!(max[[0, 1]].is_nan());

        let max = s.max_between(hour(6), hour(12));
        assert!((max[[0, 0]] - 5.0).abs() < f32::EPSILON);
        assert!((max[[0, 1]] - 7.0).abs() < f32::EPSILON);
    }

    #[test]
    fn max_between_without_samples_is_all_missing() {
        let s = series();
        let max = s.max_between(hour(13), hour(18));
        assert!(max.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn max_over_time_skips_nan() {
        let max = series().max_over_time();
        assert_eq!(max.dim(), (1, 2));
        assert!((max[[0, 0]] - 5.0).abs() < f32::EPSILON);
        assert!((max[[0, 1]] - 7.0).abs() < f32::EPSILON);
    }

    #[test]
    fn nan_max_prefers_numbers() {
        assert!((nan_max(f32::NAN, 1.0) - 1.0).abs() < f32::EPSILON);
        assert!((nan_max(2.0, f32::NAN) - 2.0).abs() < f32::EPSILON);
        assert!(nan_max(f32::NAN, f32::NAN).is_nan());
        assert!((nan_max(2.0, 3.0) - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn same_bits_treats_nan_as_equal() {
        let a = series();
        let b = series();
        assert!(a.same_bits(&b));

        let mut values = a.values().clone();
        values[[0, 0, 0]] = 1.5;
        let c = GriddedSeries::new(
            "sfcWind",
            "m s-1",
            a.times().to_vec(),
            a.latitudes().to_vec(),
            a.longitudes().to_vec(),
            values,
        )
        .unwrap();
        assert!(!a.same_bits(&c));
    }
}

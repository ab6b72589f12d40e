#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Storm severity index (SSI).
//!
//! A cell contributes to a storm's severity only where the storm's peak wind
//! reaches the local climatological extreme, a high quantile of the wind
//! field over time, floored at a damage threshold. The contribution is the
//! cubed relative exceedance `(peak / extreme - 1)^3`; weighting it by
//! population and summing gives a loss estimate.

use ndarray::{Axis, Zip};
use serde::{Deserialize, Serialize};
use storm_footprints_dataset::{Dataset, DatasetError, GriddedField, GriddedSeries};

/// Errors that can occur while computing severity indices.
#[derive(Debug, thiserror::Error)]
pub enum SeverityError {
    /// Two fields that must share a grid have different shapes.
    #[error("Shape mismatch: {what} is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        /// The input with the unexpected shape.
        what: &'static str,
        /// `(n_lat, n_lon)` of the reference grid.
        expected: (usize, usize),
        /// `(n_lat, n_lon)` of the input.
        actual: (usize, usize),
    },

    /// Two fields of the same shape sit on different coordinates.
    #[error("Grid mismatch: {what} {axis} {reason}")]
    GridMismatch {
        /// The input whose coordinates differ.
        what: &'static str,
        /// `"latitude"` or `"longitude"`.
        axis: &'static str,
        /// What differs.
        reason: String,
    },

    /// The requested quantile is outside `[0, 1]`.
    #[error("Invalid quantile {quantile}: expected a value in [0, 1]")]
    InvalidQuantile {
        /// The rejected quantile.
        quantile: f64,
    },

    /// A result could not be assembled as a dataset.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

const fn check_shape(
    what: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> Result<(), SeverityError> {
    if expected.0 == actual.0 && expected.1 == actual.1 {
        Ok(())
    } else {
        Err(SeverityError::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}

/// Largest coordinate difference, as a fraction of the reference grid
/// spacing, still treated as the same grid line.
const ALIGNMENT_TOLERANCE: f64 = 1e-6;

fn check_axis(
    what: &'static str,
    axis: &'static str,
    reference: &[f64],
    actual: &[f64],
) -> Result<(), SeverityError> {
    let spacing = match reference {
        [first, second, ..] => (second - first).abs(),
        _ => 1.0,
    };
    let tolerance = ALIGNMENT_TOLERANCE * spacing;

    if let Some((position, (expected, found))) = reference
        .iter()
        .zip(actual)
        .enumerate()
        .find(|(_, (a, b))| (*a - *b).abs() > tolerance || b.is_nan())
    {
        return Err(SeverityError::GridMismatch {
            what,
            axis,
            reason: format!("point {position} is {found}, expected {expected}"),
        });
    }

    Ok(())
}

/// Checks that coordinates `latitudes` x `longitudes` describe exactly the
/// grid of `reference`, cell for cell.
///
/// Fields are combined by array position, so a grid with the same shape
/// but shifted or reversed coordinates must be rejected rather than
/// multiplied against the wrong cells.
///
/// # Errors
///
/// Returns [`SeverityError::ShapeMismatch`] if the shapes differ, or
/// [`SeverityError::GridMismatch`] if any coordinate differs.
pub fn check_same_grid(
    what: &'static str,
    reference: &GriddedField,
    latitudes: &[f64],
    longitudes: &[f64],
) -> Result<(), SeverityError> {
    check_shape(what, reference.shape(), (latitudes.len(), longitudes.len()))?;
    check_axis(what, "latitude", reference.latitudes(), latitudes)?;
    check_axis(what, "longitude", reference.longitudes(), longitudes)
}

/// Quantile of the non-`NaN` values, interpolating linearly between order
/// statistics. `NaN` if no value is valid.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn nan_quantile(values: impl Iterator<Item = f32>, quantile: f64) -> f32 {
    let mut valid: Vec<f64> = values.filter(|v| !v.is_nan()).map(f64::from).collect();
    if valid.is_empty() {
        return f32::NAN;
    }
    valid.sort_by(f64::total_cmp);

    let position = quantile * (valid.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    (valid[lower] + (valid[upper] - valid[lower]) * fraction) as f32
}

/// Per-cell climatological wind extreme.
///
/// The `quantile` of each cell's time series (ignoring `NaN`), raised to
/// `threshold` wherever it falls below. Cells with no valid sample stay
/// `NaN`.
///
/// # Errors
///
/// Returns [`SeverityError::InvalidQuantile`] if `quantile` is outside
/// `[0, 1]`.
#[allow(clippy::cast_possible_truncation)]
pub fn climatology(
    wind_field: &GriddedSeries,
    quantile: f64,
    threshold: f64,
) -> Result<GriddedField, SeverityError> {
    if !(0.0..=1.0).contains(&quantile) {
        return Err(SeverityError::InvalidQuantile { quantile });
    }

    let threshold = threshold as f32;
    let values = Zip::from(wind_field.values().lanes(Axis(0))).map_collect(|series| {
        let extreme = nan_quantile(series.iter().copied(), quantile);
        if extreme.is_nan() {
            extreme
        } else {
            extreme.max(threshold)
        }
    });

    log::debug!(
        "Computed {quantile} quantile climatology over {} samples",
        wind_field.times().len()
    );

    Ok(GriddedField::new(
        wind_field.variable(),
        wind_field.units(),
        wind_field.latitudes().to_vec(),
        wind_field.longitudes().to_vec(),
        values,
    )?)
}

/// Unweighted severity of a footprint.
///
/// `((max / clim) - 1)^3` where the footprint's peak `max` reaches the
/// climatological extreme `clim`, `NaN` elsewhere.
///
/// # Errors
///
/// Returns [`SeverityError::ShapeMismatch`] or
/// [`SeverityError::GridMismatch`] if the footprint and the climatology are
/// on different grids.
pub fn severity(
    footprint: &GriddedSeries,
    climatology: &GriddedField,
) -> Result<GriddedField, SeverityError> {
    check_same_grid(
        "footprint",
        climatology,
        footprint.latitudes(),
        footprint.longitudes(),
    )?;

    let peak = footprint.max_over_time();
    let values = Zip::from(&peak)
        .and(climatology.values())
        .map_collect(|&max, &clim| {
            if max >= clim {
                (max / clim - 1.0).powi(3)
            } else {
                f32::NAN
            }
        });

    Ok(climatology.with_values("ssi", "1", values)?)
}

/// Elementwise product of a severity field and a population field.
///
/// # Errors
///
/// Returns [`SeverityError::ShapeMismatch`] or
/// [`SeverityError::GridMismatch`] if the two fields are on different
/// grids.
pub fn weighted(
    severity: &GriddedField,
    population: &GriddedField,
) -> Result<GriddedField, SeverityError> {
    check_same_grid(
        "population",
        severity,
        population.latitudes(),
        population.longitudes(),
    )?;
    let values = severity.values() * population.values();
    Ok(severity.with_values("ssi_pop", population.units(), values)?)
}

/// `NaN`-skipping sum of a field.
#[must_use]
pub fn total(field: &GriddedField) -> f64 {
    field
        .values()
        .iter()
        .filter(|v| !v.is_nan())
        .map(|&v| f64::from(v))
        .sum()
}

/// Severity of one footprint, unweighted and population-weighted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsiRecord {
    /// Unweighted severity index.
    pub ssi: GriddedField,
    /// Population-weighted severity index.
    pub ssi_pop: GriddedField,
}

impl SsiRecord {
    /// Computes both severity fields of a footprint.
    ///
    /// # Errors
    ///
    /// Returns [`SeverityError::ShapeMismatch`] or
    /// [`SeverityError::GridMismatch`] if any input is on a different grid.
    pub fn compute(
        footprint: &GriddedSeries,
        climatology: &GriddedField,
        population: &GriddedField,
    ) -> Result<Self, SeverityError> {
        let ssi = severity(footprint, climatology)?;
        let ssi_pop = weighted(&ssi, population)?;
        Ok(Self { ssi, ssi_pop })
    }

    /// Population-weighted loss of the footprint.
    #[must_use]
    pub fn loss(&self) -> f64 {
        total(&self.ssi_pop)
    }
}

impl Dataset for SsiRecord {
    fn validate(&self) -> Result<(), DatasetError> {
        self.ssi.validate()?;
        self.ssi_pop.validate()?;
        if self.ssi.shape() != self.ssi_pop.shape() {
            let (lat, lon) = self.ssi.shape();
            let (pop_lat, pop_lon) = self.ssi_pop.shape();
            return Err(DatasetError::Shape {
                expected: vec![lat, lon],
                actual: vec![pop_lat, pop_lon],
            });
        }
        Ok(())
    }
}

/// Running loss total of one experiment/model pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossAccumulator {
    total: f64,
    count: usize,
}

impl LossAccumulator {
    /// An empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total: 0.0,
            count: 0,
        }
    }

    /// Adds one footprint's loss.
    pub fn add(&mut self, loss: f64) {
        self.total += loss;
        self.count += 1;
    }

    /// Adds the loss of a severity record and returns it.
    pub fn add_record(&mut self, record: &SsiRecord) -> f64 {
        let loss = record.loss();
        self.add(loss);
        loss
    }

    /// Accumulated loss.
    #[must_use]
    pub const fn total(&self) -> f64 {
        self.total
    }

    /// Number of footprints added.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }
}

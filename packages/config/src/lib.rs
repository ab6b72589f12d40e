#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Run configuration.
//!
//! A run is described by a single TOML document: the domain grid, the
//! impact parameters, the season sampling period, the track file layout and
//! the experiments and models to process. A default configuration is
//! embedded at compile time and returned by [`RunConfig::default_config`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use storm_footprints_grid::{Bounds, Domain, GridError};
use storm_footprints_track_models::{IndexOrigin, TrackFormat};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Errors that can occur while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the schema.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The domain bounds do not form a valid grid.
    #[error("Domain error: {0}")]
    Domain(#[from] GridError),

    /// A value is outside its allowed range.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// `[domain]`: bounds and resolution of the analysis grid, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Western bound.
    pub west: f64,
    /// Eastern bound.
    pub east: f64,
    /// Southern bound.
    pub south: f64,
    /// Northern bound.
    pub north: f64,
    /// Grid step.
    pub resolution: f64,
}

impl DomainConfig {
    /// The configured bounds.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        Bounds {
            west: self.west,
            east: self.east,
            south: self.south,
            north: self.north,
        }
    }

    /// Builds the domain grid.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] if the spans are not multiples of the
    /// resolution.
    pub fn build(&self) -> Result<Domain, GridError> {
        Domain::new(self.bounds(), self.resolution)
    }
}

/// `[impact]`: extent of a cyclone's influence and the damage threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    /// Radius around the cyclone centre, in degrees.
    pub radius: f64,
    /// Hours before and after each track point.
    pub duration_hours: u32,
    /// Lowest wind speed that can cause damage, in m s-1.
    pub threshold: f64,
    /// Quantile of the wind climatology used as the local extreme.
    pub quantile: f64,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            radius: 5.0,
            duration_hours: 12,
            threshold: 9.0,
            quantile: 0.98,
        }
    }
}

/// `[season]`: sampling of the winter calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonConfig {
    /// Hours between consecutive samples.
    pub period_hours: u32,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self { period_hours: 6 }
    }
}

/// `[tracks]`: layout of the track files and the time index convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracksConfig {
    /// Rows at the top of each file without track data.
    pub header_rows: usize,
    /// Token that starts a new track.
    pub marker: String,
    /// Rows after each marker holding per-track metadata.
    pub metadata_rows: usize,
    /// Index origin used by every model without an override.
    pub index_origin: IndexOrigin,
    /// Per-model index origin.
    pub index_origin_overrides: BTreeMap<String, IndexOrigin>,
}

impl Default for TracksConfig {
    fn default() -> Self {
        let format = TrackFormat::default();
        Self {
            header_rows: format.header_rows,
            marker: format.marker,
            metadata_rows: format.metadata_rows,
            index_origin: IndexOrigin::default(),
            index_origin_overrides: BTreeMap::new(),
        }
    }
}

impl TracksConfig {
    /// The track file layout.
    #[must_use]
    pub fn format(&self) -> TrackFormat {
        TrackFormat {
            header_rows: self.header_rows,
            marker: self.marker.clone(),
            metadata_rows: self.metadata_rows,
        }
    }
}

/// `[paths]`: input and output roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the wind, track and population inputs.
    pub data_dir: PathBuf,
    /// Root of the footprint, SSI and report outputs.
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

/// One experiment/model combination to process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pair {
    /// Climate scenario, e.g. `historical`.
    pub experiment: String,
    /// Data source, e.g. `ERA5`.
    pub model: String,
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.experiment, self.model)
    }
}

fn default_historical() -> String {
    "historical".to_string()
}

fn default_reanalysis() -> String {
    "ERA5".to_string()
}

fn default_no_leap_day_models() -> Vec<String> {
    vec!["BCC-CSM2-MR".to_string()]
}

/// Complete configuration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Climate scenarios to process.
    pub experiments: Vec<String>,
    /// Models (and the reanalysis) to process.
    pub models: Vec<String>,
    /// The experiment every model supplies.
    #[serde(default = "default_historical")]
    pub historical_experiment: String,
    /// The model that only supplies the historical experiment.
    #[serde(default = "default_reanalysis")]
    pub reanalysis_model: String,
    /// Models whose calendars have no 29 February.
    #[serde(default = "default_no_leap_day_models")]
    pub no_leap_day_models: Vec<String>,
    /// Analysis grid.
    pub domain: DomainConfig,
    /// Impact parameters.
    #[serde(default)]
    pub impact: ImpactConfig,
    /// Season sampling.
    #[serde(default)]
    pub season: SeasonConfig,
    /// Track file layout.
    #[serde(default)]
    pub tracks: TracksConfig,
    /// Input and output roots.
    #[serde(default)]
    pub paths: PathsConfig,
}

impl RunConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents, otherwise see
    /// [`RunConfig::validate`].
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise see
    /// [`RunConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&toml_str)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// The embedded default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (a compile-time guarantee
    /// since the file ships with the crate).
    #[must_use]
    pub fn default_config() -> Self {
        Self::from_toml_str(DEFAULT_CONFIG)
            .unwrap_or_else(|e| panic!("Failed to parse embedded default configuration: {e}"))
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Domain`] if the grid is invalid, or
    /// [`ConfigError::Invalid`] for any other out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.domain.build()?;

        let impact = &self.impact;
        if !impact.radius.is_finite() || impact.radius <= 0.0 {
            return Err(invalid(format!(
                "impact radius must be positive, got {}",
                impact.radius
            )));
        }
        if !impact.threshold.is_finite() || impact.threshold < 0.0 {
            return Err(invalid(format!(
                "impact threshold must be non-negative, got {}",
                impact.threshold
            )));
        }
        if !(0.0..=1.0).contains(&impact.quantile) {
            return Err(invalid(format!(
                "quantile must lie in [0, 1], got {}",
                impact.quantile
            )));
        }

        let period = self.season.period_hours;
        if period == 0 || 24 % period != 0 {
            return Err(invalid(format!(
                "season period must divide 24 hours, got {period}"
            )));
        }

        if self.tracks.marker.trim().is_empty() {
            return Err(invalid("track marker must not be empty"));
        }

        if self.experiments.is_empty() {
            return Err(invalid("no experiments configured"));
        }
        if self.models.is_empty() {
            return Err(invalid("no models configured"));
        }
        if !self.experiments.contains(&self.historical_experiment) {
            return Err(invalid(format!(
                "historical experiment {:?} is not among the experiments",
                self.historical_experiment
            )));
        }
        if !self.models.contains(&self.reanalysis_model) {
            return Err(invalid(format!(
                "reanalysis model {:?} is not among the models",
                self.reanalysis_model
            )));
        }
        if let Some(model) = self
            .tracks
            .index_origin_overrides
            .keys()
            .find(|model| !self.models.contains(model))
        {
            return Err(invalid(format!(
                "index origin override for unknown model {model:?}"
            )));
        }

        Ok(())
    }

    /// Every experiment/model pair to process, sorted by experiment then
    /// model.
    ///
    /// The reanalysis model only supplies the historical experiment, so its
    /// pairings with other experiments are left out.
    #[must_use]
    pub fn pairs(&self) -> Vec<Pair> {
        let experiments: BTreeSet<&String> = self.experiments.iter().collect();
        let models: BTreeSet<&String> = self.models.iter().collect();

        experiments
            .iter()
            .flat_map(|experiment| {
                models.iter().filter_map(move |model| {
                    if **experiment != self.historical_experiment
                        && **model == self.reanalysis_model
                    {
                        return None;
                    }
                    Some(Pair {
                        experiment: (*experiment).clone(),
                        model: (*model).clone(),
                    })
                })
            })
            .collect()
    }

    /// [`RunConfig::pairs`] restricted to an experiment and/or a model.
    #[must_use]
    pub fn pairs_matching(&self, experiment: Option<&str>, model: Option<&str>) -> Vec<Pair> {
        self.pairs()
            .into_iter()
            .filter(|pair| experiment.is_none_or(|e| pair.experiment == e))
            .filter(|pair| model.is_none_or(|m| pair.model == m))
            .collect()
    }

    /// Whether the model's calendar includes 29 February.
    #[must_use]
    pub fn leap_days_enabled(&self, model: &str) -> bool {
        !self.no_leap_day_models.iter().any(|m| m == model)
    }

    /// Origin of the raw time indices in the model's track files.
    #[must_use]
    pub fn index_origin(&self, model: &str) -> IndexOrigin {
        self.tracks
            .index_origin_overrides
            .get(model)
            .copied()
            .unwrap_or(self.tracks.index_origin)
    }
}

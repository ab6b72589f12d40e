#![allow(clippy::module_name_repetitions)]
//! Canonical input and output paths of a run.
//!
//! Inputs live under the configured data directory:
//!
//! ```text
//! sfcWind/{experiment}/sfcWind_{experiment}_{model}.msgpack
//! tracks/{experiment}/{model}/<one file per season>
//! population/population_{experiment}.msgpack
//! ```
//!
//! Outputs live under the configured output directory, managed by
//! [`FootprintStore`], plus the run report `losses.json`.

use std::path::{Path, PathBuf};

use storm_footprints_config::{Pair, RunConfig};
use storm_footprints_store::FootprintStore;

use crate::PipelineError;

/// File extension of gridded datasets.
const EXTENSION: &str = "msgpack";

/// Directory layout of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    data_dir: PathBuf,
    output_dir: PathBuf,
}

impl DataLayout {
    /// Layout rooted at explicit directories.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Layout described by the `[paths]` section of a configuration.
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(&config.paths.data_dir, &config.paths.output_dir)
    }

    /// Root of all inputs.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Root of all outputs.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Wind speed time series of a pair.
    #[must_use]
    pub fn wind_field_path(&self, pair: &Pair) -> PathBuf {
        self.data_dir
            .join("sfcWind")
            .join(&pair.experiment)
            .join(format!(
                "sfcWind_{}_{}.{EXTENSION}",
                pair.experiment, pair.model
            ))
    }

    /// Directory of a pair's season track files.
    #[must_use]
    pub fn tracks_dir(&self, pair: &Pair) -> PathBuf {
        self.data_dir
            .join("tracks")
            .join(&pair.experiment)
            .join(&pair.model)
    }

    /// Population field of an experiment.
    #[must_use]
    pub fn population_path(&self, experiment: &str) -> PathBuf {
        self.data_dir
            .join("population")
            .join(format!("population_{experiment}.{EXTENSION}"))
    }

    /// The run report.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("losses.json")
    }

    /// Footprint and SSI store of a pair.
    #[must_use]
    pub fn store(&self, pair: &Pair) -> FootprintStore {
        FootprintStore::new(&self.output_dir, &pair.experiment, &pair.model)
    }

    /// Season track files of a pair, sorted by name, hidden files skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingInput`] if the directory does not
    /// exist, or [`PipelineError::Io`] if it cannot be read.
    pub fn track_files(&self, pair: &Pair) -> Result<Vec<PathBuf>, PipelineError> {
        let dir = self.tracks_dir(pair);
        if !dir.is_dir() {
            return Err(PipelineError::MissingInput {
                what: "track directory",
                path: dir.display().to_string(),
            });
        }

        let io_error = |source| PipelineError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            let hidden = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if !hidden && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        Ok(files)
    }
}

/// Fails with [`PipelineError::MissingInput`] unless `path` is a file.
///
/// # Errors
///
/// See above.
pub fn require_file(what: &'static str, path: &Path) -> Result<(), PipelineError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::MissingInput {
            what,
            path: path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Pair {
        Pair {
            experiment: "ssp245".to_string(),
            model: "MIROC6".to_string(),
        }
    }

    #[test]
    fn input_paths_follow_the_layout() {
        let layout = DataLayout::new("data", "outputs");
        assert_eq!(
            layout.wind_field_path(&pair()),
            Path::new("data/sfcWind/ssp245/sfcWind_ssp245_MIROC6.msgpack")
        );
        assert_eq!(
            layout.tracks_dir(&pair()),
            Path::new("data/tracks/ssp245/MIROC6")
        );
        assert_eq!(
            layout.population_path("ssp245"),
            Path::new("data/population/population_ssp245.msgpack")
        );
        assert_eq!(layout.report_path(), Path::new("outputs/losses.json"));
    }

    #[test]
    fn layout_comes_from_config_paths() {
        let config = RunConfig::default_config();
        let layout = DataLayout::from_config(&config);
        assert_eq!(layout.data_dir(), Path::new("data"));
        assert_eq!(layout.output_dir(), Path::new("outputs"));
    }

    #[test]
    fn track_files_are_sorted_and_skip_hidden() {
        let tmp = std::env::temp_dir().join("storm_footprints_pipeline_track_files");
        let _ = std::fs::remove_dir_all(&tmp);
        let layout = DataLayout::new(&tmp, tmp.join("out"));

        assert!(matches!(
            layout.track_files(&pair()),
            Err(PipelineError::MissingInput { .. })
        ));

        let dir = layout.tracks_dir(&pair());
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b_1980120100", "a_1979120100", ".DS_Store"] {
            std::fs::write(dir.join(name), "").unwrap();
        }

        let names: Vec<String> = layout
            .track_files(&pair())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_1979120100", "b_1980120100"]);

        let _ = std::fs::remove_dir_all(&tmp);
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Footprint and severity record storage.
//!
//! Layout under the output root, per experiment and model:
//!
//! ```text
//! footprints/{experiment}/{model}/footprints_{experiment}_{model}_{id}.msgpack
//! ssis/{experiment}/{model}/ssi_{experiment}_{model}_{id}.msgpack
//! ```
//!
//! where `{id}` is a [`FootprintId`] such as `20212022_007`. Every file is
//! written atomically, so an interrupted run leaves only complete files and
//! a restart can skip ids that already exist.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use storm_footprints_dataset::{Dataset, DatasetError, GriddedSeries, read_dataset, write_dataset};

const FOOTPRINT_PREFIX: &str = "footprints";
const SSI_PREFIX: &str = "ssi";
const EXTENSION: &str = "msgpack";

/// Errors that can occur while storing or loading footprints.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing a dataset failed.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// A store directory could not be listed.
    #[error("I/O error listing {path}: {source}")]
    Io {
        /// Directory that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A file or identifier does not follow the store's naming scheme.
    #[error("Invalid footprint name: {name:?}")]
    InvalidName {
        /// The offending name.
        name: String,
    },
}

/// Identity of one track's footprint: the season and the track's position
/// in the season file.
///
/// Every parsed track holds its number, including tracks that never enter
/// the domain and so have no footprint. The stored ids of a season can
/// therefore have gaps (`_001`, `_004`, ...) instead of running 1..N over
/// the written footprints, and a rerun assigns each track the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FootprintId {
    /// Calendar year in which the season starts.
    pub season_start: i32,
    /// 1-based position of the track in the season file.
    pub track_index: usize,
}

impl FootprintId {
    /// Creates an identifier.
    #[must_use]
    pub const fn new(season_start: i32, track_index: usize) -> Self {
        Self {
            season_start,
            track_index,
        }
    }
}

impl fmt::Display for FootprintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}_{:03}",
            self.season_start,
            self.season_start + 1,
            self.track_index
        )
    }
}

impl FromStr for FootprintId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidName {
            name: s.to_string(),
        };

        let (season, index) = s.split_once('_').ok_or_else(invalid)?;
        if season.len() != 8 || !season.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let start: i32 = season[..4].parse().map_err(|_| invalid())?;
        let end: i32 = season[4..].parse().map_err(|_| invalid())?;
        if end != start + 1 {
            return Err(invalid());
        }
        let track_index = index.parse().map_err(|_| invalid())?;

        // Rejects padded or signed spellings such as `0012` and `+12`
        let id = Self::new(start, track_index);
        if id.to_string() != s {
            return Err(invalid());
        }
        Ok(id)
    }
}

/// Footprint and SSI files of one experiment/model pair.
#[derive(Debug, Clone)]
pub struct FootprintStore {
    root: PathBuf,
    experiment: String,
    model: String,
}

impl FootprintStore {
    /// Opens the store for a pair under the output `root`. Nothing is
    /// created until the first write.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        experiment: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            experiment: experiment.into(),
            model: model.into(),
        }
    }

    /// `{root}/footprints/{experiment}/{model}`.
    #[must_use]
    pub fn footprint_dir(&self) -> PathBuf {
        self.root
            .join(FOOTPRINT_PREFIX)
            .join(&self.experiment)
            .join(&self.model)
    }

    /// `{root}/ssis/{experiment}/{model}`.
    #[must_use]
    pub fn ssi_dir(&self) -> PathBuf {
        self.root
            .join("ssis")
            .join(&self.experiment)
            .join(&self.model)
    }

    fn file_name(&self, prefix: &str, id: &str) -> String {
        format!(
            "{prefix}_{}_{}_{id}.{EXTENSION}",
            self.experiment, self.model
        )
    }

    /// Path of the footprint file for `id`.
    #[must_use]
    pub fn path_for(&self, id: &FootprintId) -> PathBuf {
        self.footprint_dir()
            .join(self.file_name(FOOTPRINT_PREFIX, &id.to_string()))
    }

    /// Atomically writes a footprint and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dataset`] if encoding or writing fails.
    pub fn save(&self, footprint: &GriddedSeries, id: &FootprintId) -> Result<PathBuf, StoreError> {
        let path = self.path_for(id);
        write_dataset(&path, footprint)?;
        log::debug!("Saved footprint {id} to {}", path.display());
        Ok(path)
    }

    /// Loads the footprint for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dataset`] if the file is missing or invalid.
    pub fn load(&self, id: &FootprintId) -> Result<GriddedSeries, StoreError> {
        self.load_path(&self.path_for(id))
    }

    /// Loads a footprint from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dataset`] if the file is missing or invalid.
    pub fn load_path(&self, path: &Path) -> Result<GriddedSeries, StoreError> {
        Ok(read_dataset(path)?)
    }

    /// Whether the footprint for `id` has already been written.
    #[must_use]
    pub fn exists(&self, id: &FootprintId) -> bool {
        self.path_for(id).is_file()
    }

    /// All footprint files of the pair, sorted by path.
    ///
    /// Hidden files (including in-progress writes) are skipped. A missing
    /// directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.footprint_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let io_error = |source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            let hidden = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if !hidden && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(paths)
    }

    /// Identifier encoded in a footprint file name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] if the name does not belong to
    /// this pair's footprints.
    pub fn id_of(&self, footprint_path: &Path) -> Result<FootprintId, StoreError> {
        let name = footprint_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = format!("{FOOTPRINT_PREFIX}_{}_{}_", self.experiment, self.model);

        name.strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&format!(".{EXTENSION}")))
            .ok_or_else(|| StoreError::InvalidName { name: name.clone() })?
            .parse()
    }

    /// Path of the severity record that belongs to a footprint file.
    ///
    /// # Errors
    ///
    /// See [`FootprintStore::id_of`].
    pub fn ssi_path_for(&self, footprint_path: &Path) -> Result<PathBuf, StoreError> {
        let id = self.id_of(footprint_path)?;
        Ok(self
            .ssi_dir()
            .join(self.file_name(SSI_PREFIX, &id.to_string())))
    }

    /// Atomically writes the severity record of a footprint file and returns
    /// its path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for a foreign footprint path or
    /// [`StoreError::Dataset`] if writing fails.
    pub fn save_ssi<T: Dataset>(
        &self,
        record: &T,
        footprint_path: &Path,
    ) -> Result<PathBuf, StoreError> {
        let path = self.ssi_path_for(footprint_path)?;
        write_dataset(&path, record)?;
        log::debug!("Saved severity record to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::Array3;

    fn footprint() -> GriddedSeries {
        let time = NaiveDate::from_ymd_opt(2021, 12, 3)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        let mut values = Array3::from_elem((1, 2, 3), f32::NAN);
        values[[0, 0, 1]] = 21.25;
        values[[0, 1, 1]] = 17.5;
        GriddedSeries::new(
            "sfcWind",
            "m s-1",
            vec![time],
            vec![50.0, 51.875],
            vec![0.0, 1.875, 3.75],
            values,
        )
        .unwrap()
    }

    fn clean(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&tmp);
        tmp
    }

    #[test]
    fn id_formats_with_both_years_and_padded_index() {
        assert_eq!(FootprintId::new(2021, 7).to_string(), "20212022_007");
        assert_eq!(FootprintId::new(1999, 123).to_string(), "19992000_123");
        assert_eq!(FootprintId::new(2021, 1234).to_string(), "20212022_1234");
    }

    #[test]
    fn ids_are_distinct_within_a_season() {
        let names: std::collections::BTreeSet<String> = (1..=2000)
            .map(|index| FootprintId::new(2021, index).to_string())
            .collect();
        assert_eq!(names.len(), 2000);
    }

    #[test]
    fn id_parses_back() {
        let id: FootprintId = "20212022_042".parse().unwrap();
        assert_eq!(id, FootprintId::new(2021, 42));
        assert!("20212023_042".parse::<FootprintId>().is_err());
        assert!("2021_042".parse::<FootprintId>().is_err());
        assert!("20212022_42".parse::<FootprintId>().is_err());
        assert_eq!(
            "20212022_1234".parse::<FootprintId>().unwrap(),
            FootprintId::new(2021, 1234)
        );
    }

    #[test]
    fn non_canonical_indices_are_rejected() {
        for name in ["20212022_0012", "20212022_+12", "20212022_+012", "20212022_0000"] {
            assert!(name.parse::<FootprintId>().is_err(), "{name}");
        }

        let store = FootprintStore::new("o", "historical", "ERA5");
        let canonical = store.path_for(&FootprintId::new(2021, 12));
        assert!(store.ssi_path_for(&canonical).is_ok());
        for stray in [
            "o/footprints/historical/ERA5/footprints_historical_ERA5_20212022_0012.msgpack",
            "o/footprints/historical/ERA5/footprints_historical_ERA5_20212022_+12.msgpack",
        ] {
            assert!(matches!(
                store.ssi_path_for(Path::new(stray)),
                Err(StoreError::InvalidName { .. })
            ));
        }
    }

    #[test]
    fn paths_follow_the_layout() {
        let store = FootprintStore::new("outputs", "historical", "ERA5");
        let id = FootprintId::new(1979, 1);
        let path = store.path_for(&id);
        assert_eq!(
            path,
            Path::new("outputs/footprints/historical/ERA5/footprints_historical_ERA5_19791980_001.msgpack")
        );
        assert_eq!(
            store.ssi_path_for(&path).unwrap(),
            Path::new("outputs/ssis/historical/ERA5/ssi_historical_ERA5_19791980_001.msgpack")
        );
        assert_eq!(store.id_of(&path).unwrap(), id);
    }

    #[test]
    fn foreign_files_have_no_ssi_path() {
        let store = FootprintStore::new("outputs", "historical", "ERA5");
        assert!(matches!(
            store.ssi_path_for(Path::new("outputs/notes.txt")),
            Err(StoreError::InvalidName { .. })
        ));
        let other = FootprintStore::new("outputs", "ssp245", "ERA5")
            .path_for(&FootprintId::new(1979, 1));
        assert!(store.ssi_path_for(&other).is_err());
    }

    #[test]
    fn save_then_load_is_bit_exact() {
        let tmp = clean("storm_footprints_store_round_trip");
        let store = FootprintStore::new(&tmp, "ssp585", "MIROC6");
        let id = FootprintId::new(2050, 3);

        assert!(!store.exists(&id));
        let original = footprint();
        let path = store.save(&original, &id).unwrap();
        assert_eq!(path, store.path_for(&id));
        assert!(store.exists(&id));

        let loaded = store.load(&id).unwrap();
        assert!(original.same_bits(&loaded));
        assert!(original.same_bits(&store.load_path(&path).unwrap()));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn list_is_sorted_and_skips_hidden_files() {
        let tmp = clean("storm_footprints_store_list");
        let store = FootprintStore::new(&tmp, "historical", "EC-Earth3");
        assert!(store.list().unwrap().is_empty());

        for index in [12, 2, 7] {
            store.save(&footprint(), &FootprintId::new(1990, index)).unwrap();
        }
        std::fs::write(store.footprint_dir().join(".partial.tmp"), b"x").unwrap();

        let listed = store.list().unwrap();
        let ids: Vec<FootprintId> = listed.iter().map(|p| store.id_of(p).unwrap()).collect();
        assert_eq!(
            ids,
            vec![
                FootprintId::new(1990, 2),
                FootprintId::new(1990, 7),
                FootprintId::new(1990, 12),
            ]
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ssi_records_land_next_to_their_footprint_id() {
        let tmp = clean("storm_footprints_store_ssi");
        let store = FootprintStore::new(&tmp, "historical", "ERA5");
        let path = store.save(&footprint(), &FootprintId::new(2000, 5)).unwrap();

        let written = store.save_ssi(&footprint(), &path).unwrap();
        assert!(written.is_file());
        assert!(written.starts_with(store.ssi_dir()));
        assert!(
            written
                .file_name()
                .unwrap()
                .to_string_lossy()
                .ends_with("20002001_005.msgpack")
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }
}

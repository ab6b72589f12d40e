//! Reading and writing datasets.
//!
//! Documents are encoded with `rmp-serde` using named fields, so every file
//! carries its variable name, units, dimension names and coordinates
//! alongside the values. `f32` values are stored as raw 32-bit floats, which
//! keeps `NaN` missing-data markers bit-for-bit.
//!
//! Writes go to a hidden temporary file next to the target and are renamed
//! into place once complete, so a reader never observes a partial file.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{DatasetError, GriddedField, GriddedSeries};

/// A dataset that can be persisted with [`write_dataset`] and restored with
/// [`read_dataset`].
pub trait Dataset: Serialize + DeserializeOwned {
    /// Checks the structural invariants of a decoded document.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the document is inconsistent.
    fn validate(&self) -> Result<(), DatasetError>;
}

impl Dataset for GriddedSeries {
    fn validate(&self) -> Result<(), DatasetError> {
        self.check()
    }
}

impl Dataset for GriddedField {
    fn validate(&self) -> Result<(), DatasetError> {
        self.check()
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DatasetError + '_ {
    move |source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Reads and validates a dataset.
///
/// # Errors
///
/// Returns [`DatasetError`] if the file cannot be read, decoded, or fails
/// validation.
pub fn read_dataset<T: Dataset>(path: &Path) -> Result<T, DatasetError> {
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    let dataset: T = rmp_serde::from_slice(&bytes).map_err(|source| DatasetError::Decode {
        path: path.display().to_string(),
        source,
    })?;
    dataset.validate()?;
    Ok(dataset)
}

/// Encodes and atomically writes a dataset, creating parent directories.
///
/// # Errors
///
/// Returns [`DatasetError`] if encoding or any filesystem step fails.
pub fn write_dataset<T: Dataset>(path: &Path, dataset: &T) -> Result<(), DatasetError> {
    let bytes = rmp_serde::to_vec_named(dataset)?;
    write_atomic(path, &bytes)?;
    log::trace!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Hidden sibling used while a file is being written.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Writes `bytes` to `path` through a temporary file and a rename.
///
/// # Errors
///
/// Returns [`DatasetError::Io`] if the directory, the temporary file or the
/// rename cannot be created. The temporary file is removed on failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
    }

    let tmp = temp_path(path);
    if let Err(source) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_error(&tmp)(source));
    }

    if let Err(source) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_error(path)(source));
    }

    Ok(())
}

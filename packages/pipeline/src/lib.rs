#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch orchestration.
//!
//! A run walks every selected experiment/model pair in order and applies
//! the selected [`Stage`]s:
//!
//! 1. [`Stage::Footprints`]: parse each season's track file, build one
//!    footprint per track from the pair's wind field, store it.
//! 2. [`Stage::Ssi`]: turn each stored footprint into a severity record
//!    against the wind climatology and the experiment's population, and
//!    accumulate the pair's loss.
//!
//! A pair that cannot be processed (for example because its wind field is
//! missing) is logged and recorded in the [`RunReport`]; the run moves on
//! to the next pair. The report is written to `losses.json` in the output
//! directory.

pub mod footprints;
pub mod paths;
pub mod progress;
pub mod ssi;

use std::path::Path;

use serde::{Deserialize, Serialize};
use storm_footprints_config::{ConfigError, Pair, RunConfig};
use storm_footprints_dataset::{DatasetError, write_atomic};
use storm_footprints_footprint::FootprintError;
use storm_footprints_grid::GridError;
use storm_footprints_severity::SeverityError;
use storm_footprints_store::StoreError;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub use footprints::{FootprintSummary, generate_footprints};
pub use paths::DataLayout;
pub use progress::{NullProgress, ProgressCallback, RunProgress, null_progress};
pub use ssi::{SsiSummary, generate_ssis};

/// Errors that can abort a stage for one pair, or the whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The configured domain is not a valid grid.
    #[error("Domain error: {0}")]
    Grid(#[from] GridError),

    /// An input dataset could not be read.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// A footprint could not be built.
    #[error("Footprint error: {0}")]
    Footprint(#[from] FootprintError),

    /// A footprint or severity record could not be stored.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Severity indices could not be computed.
    #[error("Severity error: {0}")]
    Severity(#[from] SeverityError),

    /// A required input does not exist.
    #[error("Missing {what}: {path}")]
    MissingInput {
        /// Kind of input.
        what: &'static str,
        /// Expected location.
        path: String,
    },

    /// An input directory could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The run report could not be encoded.
    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),
}

/// A step of the pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Build and store per-track footprints.
    Footprints,
    /// Compute severity records and losses from stored footprints.
    Ssi,
}

/// Outcome of one experiment/model pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    /// Climate scenario.
    pub experiment: String,
    /// Data source.
    pub model: String,
    /// Footprint stage results, if the stage ran to completion.
    pub footprints: Option<FootprintSummary>,
    /// SSI stage results, if the stage ran to completion.
    pub ssi: Option<SsiSummary>,
    /// Accumulated population-weighted loss.
    pub accumulated_loss: Option<f64>,
    /// Why the pair was abandoned, if it was.
    pub error: Option<String>,
}

impl PairReport {
    fn new(pair: &Pair) -> Self {
        Self {
            experiment: pair.experiment.clone(),
            model: pair.model.clone(),
            footprints: None,
            ssi: None,
            accumulated_loss: None,
            error: None,
        }
    }
}

/// Outcome of a whole run, written as `losses.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Stages that were requested.
    pub stages: Vec<Stage>,
    /// One entry per processed pair, in processing order.
    pub pairs: Vec<PairReport>,
}

impl RunReport {
    /// Pairs that were abandoned.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.pairs.iter().filter(|pair| pair.error.is_some()).count()
    }

    /// Atomically writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Report`] if encoding fails or
    /// [`PipelineError::Dataset`] if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())?;
        Ok(())
    }
}

fn run_pair(
    config: &RunConfig,
    stages: &[Stage],
    pair: &Pair,
    progress: &RunProgress,
    entry: &mut PairReport,
) -> Result<(), PipelineError> {
    if stages.contains(&Stage::Footprints) {
        entry.footprints = Some(generate_footprints(config, pair, &progress.items)?);
    }
    if stages.contains(&Stage::Ssi) {
        let summary = generate_ssis(config, pair, &progress.items)?;
        entry.accumulated_loss = Some(summary.loss);
        entry.ssi = Some(summary);
    }
    Ok(())
}

/// Applies `stages` to every pair in order and writes the run report.
///
/// Failures of a single pair are logged, recorded in its [`PairReport`]
/// and do not stop the run.
///
/// # Errors
///
/// Returns [`PipelineError`] only if the report cannot be written.
pub fn run(
    config: &RunConfig,
    stages: &[Stage],
    pairs: &[Pair],
    progress: &RunProgress,
) -> Result<RunReport, PipelineError> {
    let layout = DataLayout::from_config(config);
    let mut report = RunReport {
        stages: stages.to_vec(),
        pairs: Vec::with_capacity(pairs.len()),
    };

    log::info!(
        "Running {} over {} pairs",
        stages
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(" + "),
        pairs.len()
    );
    progress.pairs.set_total(pairs.len() as u64);

    for pair in pairs {
        progress.pairs.set_message(pair.to_string());
        let mut entry = PairReport::new(pair);
        if let Err(e) = run_pair(config, stages, pair, progress, &mut entry) {
            log::error!("{pair}: {e}");
            entry.error = Some(e.to_string());
        }
        report.pairs.push(entry);
        progress.pairs.inc(1);
    }

    progress.items.finish_and_clear();
    progress.pairs.finish(format!(
        "{} pairs processed, {} failed",
        report.pairs.len(),
        report.failures()
    ));

    let report_path = layout.report_path();
    report.write(&report_path)?;
    log::info!("Run report written to {}", report_path.display());

    Ok(report)
}

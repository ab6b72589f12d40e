//! SSI stage: stored footprints in, one severity record per footprint and
//! a loss total per pair out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storm_footprints_config::{Pair, RunConfig};
use storm_footprints_dataset::{GriddedField, read_dataset};
use storm_footprints_severity::{LossAccumulator, SsiRecord, check_same_grid, climatology};

use crate::PipelineError;
use crate::footprints::load_wind_field;
use crate::paths::{DataLayout, require_file};
use crate::progress::ProgressCallback;

/// Outcome of the SSI stage for one pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SsiSummary {
    /// Footprint files found.
    pub footprints: usize,
    /// Severity records written by this run.
    pub written: usize,
    /// Severity records already on disk from an earlier run.
    pub existing: usize,
    /// Footprint files that could not be turned into a record.
    pub skipped: usize,
    /// Population-weighted loss summed over every record.
    pub loss: f64,
}

/// Computes the severity record of every stored footprint of a pair and
/// accumulates the pair's loss.
///
/// Records that already exist are read back rather than recomputed, so a
/// resumed run reports the same total. Footprint files that cannot be read
/// or whose coordinates differ from the climatology grid are logged and
/// skipped.
///
/// # Errors
///
/// Returns [`PipelineError`] if the wind field or population field is
/// missing or unreadable, the population field is not on the wind field's
/// grid, the climatology cannot be derived, or a record cannot be written.
pub fn generate_ssis(
    config: &RunConfig,
    pair: &Pair,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<SsiSummary, PipelineError> {
    let domain = config.domain.build()?;
    let layout = DataLayout::from_config(config);
    let store = layout.store(pair);

    let wind_field = load_wind_field(&layout, pair, &domain)?;
    let extremes = climatology(&wind_field, config.impact.quantile, config.impact.threshold)?;
    drop(wind_field);

    let population_path = layout.population_path(&pair.experiment);
    require_file("population field", &population_path)?;
    let population: GriddedField = read_dataset(&population_path)?;
    check_same_grid(
        "population",
        &extremes,
        population.latitudes(),
        population.longitudes(),
    )?;

    let footprint_files = store.list()?;
    log::info!(
        "{pair}: computing SSI for {} footprints",
        footprint_files.len()
    );
    progress.set_total(footprint_files.len() as u64);
    progress.set_message(format!("{pair} SSI"));

    let mut summary = SsiSummary {
        footprints: footprint_files.len(),
        ..SsiSummary::default()
    };
    let mut losses = LossAccumulator::new();

    for path in &footprint_files {
        progress.inc(1);

        let ssi_path = match store.ssi_path_for(path) {
            Ok(ssi_path) => ssi_path,
            Err(e) => {
                log::warn!("{pair}: skipping {}: {e}", path.display());
                summary.skipped += 1;
                continue;
            }
        };

        if ssi_path.is_file() {
            match read_dataset::<SsiRecord>(&ssi_path) {
                Ok(record) => {
                    losses.add_record(&record);
                    summary.existing += 1;
                    continue;
                }
                Err(e) => {
                    log::warn!(
                        "{pair}: recomputing unreadable record {}: {e}",
                        ssi_path.display()
                    );
                }
            }
        }

        let record = match store
            .load_path(path)
            .map_err(PipelineError::from)
            .and_then(|footprint| {
                SsiRecord::compute(&footprint, &extremes, &population).map_err(PipelineError::from)
            }) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("{pair}: skipping {}: {e}", path.display());
                summary.skipped += 1;
                continue;
            }
        };

        store.save_ssi(&record, path)?;
        let loss = losses.add_record(&record);
        log::trace!("{pair}: {} loss {loss}", path.display());
        summary.written += 1;
    }

    summary.loss = losses.total();
    log::info!(
        "{pair}: accumulated loss {} over {} footprints ({} written, {} already present, {} skipped)",
        summary.loss,
        losses.count(),
        summary.written,
        summary.existing,
        summary.skipped,
    );
    Ok(summary)
}

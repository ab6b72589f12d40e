//! Footprint stage: track files in, one footprint file per track out.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storm_footprints_config::{Pair, RunConfig};
use storm_footprints_dataset::{GriddedSeries, read_dataset};
use storm_footprints_footprint::{ImpactParams, build_track_footprint, check_alignment};
use storm_footprints_grid::Domain;
use storm_footprints_season::Season;
use storm_footprints_store::{FootprintId, FootprintStore};
use storm_footprints_track_models::TrackFormat;
use storm_footprints_tracks::{parse_season_file, resolve_track};

use crate::PipelineError;
use crate::paths::{DataLayout, require_file};
use crate::progress::ProgressCallback;

/// Outcome of the footprint stage for one pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootprintSummary {
    /// Season files read.
    pub seasons: usize,
    /// Season files skipped because they could not be parsed.
    pub seasons_skipped: usize,
    /// Tracks found across all parsed seasons.
    pub tracks: usize,
    /// Tracks skipped because their time indices fall outside the season.
    pub tracks_skipped: usize,
    /// Tracks with no point inside the domain.
    pub empty: usize,
    /// Footprints already on disk from an earlier run.
    pub existing: usize,
    /// Footprints written by this run.
    pub written: usize,
}

/// Everything that stays fixed while the tracks of one pair are processed.
struct PairContext<'a> {
    config: &'a RunConfig,
    pair: &'a Pair,
    domain: &'a Domain,
    wind_field: &'a GriddedSeries,
    impact: ImpactParams,
    format: TrackFormat,
    store: FootprintStore,
}

/// Loads a pair's wind field and checks it against the domain grid.
///
/// # Errors
///
/// Returns [`PipelineError::MissingInput`] if the file does not exist,
/// [`PipelineError::Dataset`] if it cannot be read, or
/// [`PipelineError::Footprint`] if it is not on the domain grid.
pub fn load_wind_field(
    layout: &DataLayout,
    pair: &Pair,
    domain: &Domain,
) -> Result<GriddedSeries, PipelineError> {
    let path = layout.wind_field_path(pair);
    require_file("wind field", &path)?;
    let wind_field: GriddedSeries = read_dataset(&path)?;
    check_alignment(&wind_field, domain)?;
    log::debug!(
        "{pair}: loaded wind field with {} time steps from {}",
        wind_field.times().len(),
        path.display(),
    );
    Ok(wind_field)
}

/// Builds and stores the footprint of every track of a pair.
///
/// Season files whose start year cannot be derived or whose text cannot be
/// parsed are logged and skipped, as are tracks with out-of-range time
/// indices. Tracks whose footprint already exists are not recomputed.
///
/// # Errors
///
/// Returns [`PipelineError`] if the wind field or track directory is
/// missing or unreadable, the wind field is not on the domain grid, or a
/// footprint cannot be written.
pub fn generate_footprints(
    config: &RunConfig,
    pair: &Pair,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<FootprintSummary, PipelineError> {
    let domain = config.domain.build()?;
    let layout = DataLayout::from_config(config);
    let wind_field = load_wind_field(&layout, pair, &domain)?;
    let track_files = layout.track_files(pair)?;

    let ctx = PairContext {
        config,
        pair,
        domain: &domain,
        wind_field: &wind_field,
        impact: ImpactParams {
            radius: config.impact.radius,
            duration_hours: config.impact.duration_hours,
        },
        format: config.tracks.format(),
        store: layout.store(pair),
    };

    log::info!(
        "{pair}: generating footprints from {} season files",
        track_files.len()
    );
    progress.set_total(track_files.len() as u64);
    progress.set_message(format!("{pair} footprints"));

    let mut summary = FootprintSummary::default();
    for path in &track_files {
        process_season(&ctx, path, &mut summary)?;
        progress.inc(1);
    }

    log::info!(
        "{pair}: {} footprints written, {} already present, {} tracks outside the domain, {} tracks and {} seasons skipped",
        summary.written,
        summary.existing,
        summary.empty,
        summary.tracks_skipped,
        summary.seasons_skipped,
    );
    Ok(summary)
}

fn process_season(
    ctx: &PairContext<'_>,
    path: &Path,
    summary: &mut FootprintSummary,
) -> Result<(), PipelineError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let season = match Season::from_identifier(
        &name,
        ctx.config.season.period_hours,
        ctx.config.leap_days_enabled(&ctx.pair.model),
    ) {
        Ok(season) => season,
        Err(e) => {
            log::warn!("{}: skipping season file {name}: {e}", ctx.pair);
            summary.seasons_skipped += 1;
            return Ok(());
        }
    };

    let tracks = match parse_season_file(path, &ctx.format) {
        Ok(tracks) => tracks,
        Err(e) => {
            log::warn!("{}: skipping season file {name}: {e}", ctx.pair);
            summary.seasons_skipped += 1;
            return Ok(());
        }
    };

    summary.seasons += 1;
    summary.tracks += tracks.len();
    log::debug!(
        "{}: season {} holds {} tracks",
        ctx.pair,
        season.label(),
        tracks.len()
    );

    let origin = ctx.config.index_origin(&ctx.pair.model);
    for track in &tracks {
        let id = FootprintId::new(season.start_year(), track.index);
        if ctx.store.exists(&id) {
            log::trace!("{}: footprint {id} already exists", ctx.pair);
            summary.existing += 1;
            continue;
        }

        let points = match resolve_track(track, &season, origin) {
            Ok(points) => points,
            Err(e) => {
                log::warn!("{}: skipping track {id}: {e}", ctx.pair);
                summary.tracks_skipped += 1;
                continue;
            }
        };

        match build_track_footprint(&points, ctx.wind_field, ctx.domain, &ctx.impact)? {
            Some(footprint) => {
                ctx.store.save(&footprint, &id)?;
                summary.written += 1;
            }
            None => {
                log::trace!("{}: track {id} never enters the domain", ctx.pair);
                summary.empty += 1;
            }
        }
    }

    Ok(())
}

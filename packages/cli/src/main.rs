#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the storm footprints toolchain.
//!
//! Runs the footprint and SSI stages over the configured experiment/model
//! pairs, lists those pairs, or checks a configuration. Without a
//! subcommand the user picks one interactively.
//!
//! Uses `indicatif-log-bridge` (via
//! [`storm_footprints_cli_utils::init_logger`]) to route `log` output
//! through `indicatif::MultiProgress` so that log lines and progress bars
//! never fight for the terminal.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dialoguer::Select;
use storm_footprints_cli_utils::run_progress;
use storm_footprints_config::{Pair, RunConfig};
use storm_footprints_pipeline::{DataLayout, Stage, run};

#[derive(Parser)]
#[command(
    name = "storm_footprints",
    about = "Cyclone wind footprints and storm severity indices"
)]
struct Cli {
    /// Run configuration (TOML); the built-in configuration when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only process this experiment
    #[arg(long, global = true)]
    experiment: Option<String>,

    /// Only process this model
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Build and store a footprint for every track
    Footprints,
    /// Compute severity indices and losses from stored footprints
    Ssi,
    /// Build footprints, then compute severity indices
    All,
    /// List the experiment/model pairs that would be processed
    Pairs,
    /// Validate the configuration and report missing inputs
    Check,
}

impl Commands {
    const ALL: &[Self] = &[
        Self::All,
        Self::Footprints,
        Self::Ssi,
        Self::Pairs,
        Self::Check,
    ];

    #[must_use]
    const fn label(self) -> &'static str {
        match self {
            Self::All => "Run footprints and SSI",
            Self::Footprints => "Generate footprints",
            Self::Ssi => "Generate SSIs",
            Self::Pairs => "List experiment/model pairs",
            Self::Check => "Check configuration",
        }
    }

    #[must_use]
    const fn stages(self) -> &'static [Stage] {
        match self {
            Self::All => &[Stage::Footprints, Stage::Ssi],
            Self::Footprints => &[Stage::Footprints],
            Self::Ssi => &[Stage::Ssi],
            Self::Pairs | Self::Check => &[],
        }
    }
}

fn select_command() -> Result<Commands, dialoguer::Error> {
    println!("Storm Footprints");
    println!();

    let labels: Vec<&str> = Commands::ALL.iter().map(|c| c.label()).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(Commands::ALL[idx])
}

/// Prints the domain and the availability of every pair's inputs.
fn check(config: &RunConfig, pairs: &[Pair]) -> Result<(), Box<dyn std::error::Error>> {
    let domain = config.domain.build()?;
    let bounds = domain.bounds();
    let (n_lat, n_lon) = domain.shape();

    println!(
        "Domain: lon {}..{}, lat {}..{} at {} deg ({n_lat} x {n_lon} cells)",
        bounds.west,
        bounds.east,
        bounds.south,
        bounds.north,
        domain.resolution(),
    );
    println!(
        "Impact: radius {} deg, +/-{}h, threshold {} m s-1, quantile {}",
        config.impact.radius,
        config.impact.duration_hours,
        config.impact.threshold,
        config.impact.quantile,
    );
    println!(
        "Seasons sampled every {}h; tracks {} with {} metadata rows",
        config.season.period_hours, config.tracks.marker, config.tracks.metadata_rows,
    );
    println!();

    let layout = DataLayout::from_config(config);
    let mut missing = 0_usize;
    for pair in pairs {
        let mut absent = Vec::new();
        if !layout.wind_field_path(pair).is_file() {
            absent.push("wind field");
        }
        if !layout.tracks_dir(pair).is_dir() {
            absent.push("tracks");
        }
        if !layout.population_path(&pair.experiment).is_file() {
            absent.push("population");
        }

        if absent.is_empty() {
            println!(
                "  {pair}: ready ({}, leap days {})",
                config.index_origin(&pair.model),
                if config.leap_days_enabled(&pair.model) {
                    "on"
                } else {
                    "off"
                },
            );
        } else {
            missing += 1;
            println!("  {pair}: missing {}", absent.join(", "));
        }
    }

    println!();
    println!(
        "{} pairs, {} with missing inputs under {}",
        pairs.len(),
        missing,
        layout.data_dir().display()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = storm_footprints_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default_config(),
    };

    let command = match cli.command {
        Some(command) => command,
        None => select_command()?,
    };

    let pairs = config.pairs_matching(cli.experiment.as_deref(), cli.model.as_deref());
    if pairs.is_empty() {
        log::warn!("No experiment/model pairs match the given filters");
    }

    match command {
        Commands::Pairs => {
            for pair in &pairs {
                println!("{pair}");
            }
        }
        Commands::Check => check(&config, &pairs)?,
        Commands::Footprints | Commands::Ssi | Commands::All => {
            let progress = run_progress(&multi, pairs.len() as u64);
            let report = run(&config, command.stages(), &pairs, &progress)?;

            for pair in &report.pairs {
                match (&pair.error, pair.accumulated_loss) {
                    (Some(e), _) => println!("{}/{}: failed: {e}", pair.experiment, pair.model),
                    (None, Some(loss)) => {
                        println!("{}/{}: accumulated loss {loss}", pair.experiment, pair.model);
                    }
                    (None, None) => {
                        let written = pair.footprints.map_or(0, |f| f.written);
                        println!(
                            "{}/{}: {written} footprints written",
                            pair.experiment, pair.model
                        );
                    }
                }
            }

            if report.failures() > 0 {
                return Err(format!(
                    "{} of {} pairs failed",
                    report.failures(),
                    report.pairs.len()
                )
                .into());
            }
        }
    }

    Ok(())
}

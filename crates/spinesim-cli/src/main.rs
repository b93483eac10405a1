//! # spinesim - cycle-accurate spike-stream accelerator simulator
//!
//! Loads a pre-packed DRAM image plus a layer configuration, runs every
//! layer through the event-driven pipeline model, and appends per-layer
//! cycle statistics to a CSV summary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod error;

use error::CliResult;
use spinesim_core::{CacheConfig, EvictionPolicy};
use spinesim_model::{append_cache_summary, append_layer_summary, parse_config, run_network, RunOptions};
use spinesim_storage::SpineDram;

/// Weight-cache eviction policy selection
#[derive(ValueEnum, Clone, Copy, Debug)]
enum CachePolicy {
    /// Bias eviction toward input channels that spiked least
    Scoreboard,
    /// Plain least-recently-used
    Lru,
}

/// spinesim - cycle-accurate simulator for a spike-stream convolution
/// accelerator
#[derive(Parser, Debug)]
#[command(
    name = "spinesim",
    version,
    about = "Cycle-accurate spike-stream accelerator simulator",
    long_about = "Replays a pre-packed DRAM image (input spines and weight tiles) \
                  through the accelerator's event-driven pipeline, layer by layer, \
                  and reports per-layer cycle statistics."
)]
struct Cli {
    /// Pre-packed DRAM image (inputs and weights)
    dram_image: PathBuf,

    /// Layer configuration JSON
    config: PathBuf,

    /// Per-layer cycle summary CSV (appended)
    #[arg(long, default_value = "cycles_layer_summary.csv")]
    summary_csv: PathBuf,

    /// Enable the weight-cache latency sweep
    #[arg(long)]
    cache_sweep: bool,

    /// Eviction policy for the cache sweep
    #[arg(long, value_enum, default_value = "scoreboard")]
    cache_policy: CachePolicy,

    /// Weight-cache summary CSV (appended, with --cache-sweep)
    #[arg(long, default_value = "cache_summary.csv")]
    cache_summary_csv: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli) -> CliResult<()> {
    // (1) parse config into layer specs
    let specs = parse_config(&cli.config)?;
    info!("parsed {} layers from {}", specs.len(), cli.config.display());

    // (2) init DRAM: load the image and build per-layer metadata
    let mut dram = SpineDram::from_files(&cli.dram_image, &cli.config)?;

    // (3) run all layers in order
    let opts = RunOptions {
        cache: cli.cache_sweep.then(|| CacheConfig {
            eviction_policy: match cli.cache_policy {
                CachePolicy::Scoreboard => EvictionPolicy::Scoreboard,
                CachePolicy::Lru => EvictionPolicy::Lru,
            },
            ..CacheConfig::default()
        }),
        ..RunOptions::default()
    };
    let reports = run_network(&specs, &mut dram, &opts)?;

    // (4) append per-layer statistics
    for report in &reports {
        append_layer_summary(&cli.summary_csv, report)?;
        if cli.cache_sweep {
            append_cache_summary(&cli.cache_summary_csv, report)?;
        }
        info!(
            "layer {} ({}): {} entries, {} step cycles",
            report.layer_id, report.name, report.drained_entries, report.stats.step_cycles_total
        );
    }

    info!("simulation completed: {} layers", reports.len());
    Ok(())
}

fn main() -> ExitCode {
    // usage errors exit with 1; help/version print normally
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(1);
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("simulation failed: {err}");
            ExitCode::from(2)
        }
    }
}

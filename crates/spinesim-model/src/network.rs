//! Network runner: drives every configured layer through the core

use spinesim_core::constants::MAX_TICKS_PER_SITE;
use spinesim_core::{CacheConfig, CacheSim, CacheStats, Core, LayerCycleStats};
use spinesim_storage::SpineDram;

use crate::config::{LayerKind, LayerSpec};
use crate::conv::ConvLayer;
use crate::error::{ModelError, Result};
use crate::fc::FcLayer;

/// Options controlling a network run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Attach the weight-cache latency model with this configuration
    pub cache: Option<CacheConfig>,
    /// Tick cap per site (defaults to [`MAX_TICKS_PER_SITE`])
    pub max_ticks_per_site: Option<u64>,
}

/// Aggregated results of one layer run
#[derive(Debug, Clone)]
pub struct LayerReport {
    /// Layer id
    pub layer_id: u32,
    /// Layer name
    pub name: String,
    /// Output height
    pub h_out: usize,
    /// Output width
    pub w_out: usize,
    /// Output tiles
    pub total_tiles: usize,
    /// Entries drained to the output spines, all sites summed
    pub drained_entries: usize,
    /// Cycle statistics, all sites summed
    pub stats: LayerCycleStats,
    /// Weight-cache statistics when the cache model was attached
    pub cache: Option<CacheStats>,
}

/// Shared per-layer site loop: prepare each site, run every tile's compute
/// loop to quiescence, then drain and store.
#[allow(clippy::too_many_arguments)]
pub(crate) fn drive_core_sites(
    core: &mut Core,
    dram: &mut SpineDram,
    spec: &LayerSpec,
    h_out: usize,
    w_out: usize,
    total_tiles: usize,
    opts: &RunOptions,
    batches_for: impl Fn(usize, usize) -> Vec<Vec<u32>>,
) -> Result<LayerReport> {
    if let Some(cache_cfg) = &opts.cache {
        core.set_cache(Some(CacheSim::new(cache_cfg.clone())));
    }
    let tick_cap = opts.max_ticks_per_site.unwrap_or(MAX_TICKS_PER_SITE);

    let mut layer_stats = LayerCycleStats::default();
    let mut drained_entries = 0usize;

    for h in 0..h_out {
        for w in 0..w_out {
            core.reset_site_stats();
            core.prepare_site(h, w, batches_for(h, w))?;

            for tile in 0..total_tiles {
                core.prepare_tile(dram, tile)?;
                let mut ticks: u64 = 0;
                while !core.compute_finished() {
                    core.step_once(dram, tile)?;
                    ticks += 1;
                    if ticks >= tick_cap {
                        return Err(ModelError::QuiescenceTimeout {
                            layer: spec.layer_id,
                            h_out: h,
                            w_out: w,
                            ticks: tick_cap,
                        });
                    }
                }
            }

            drained_entries += core.drain_and_store(dram)?;
            layer_stats.accumulate(core.site_stats());
        }
    }

    log::info!(
        "layer {} done: {} sites, {} entries drained, {} step cycles",
        spec.layer_id,
        h_out * w_out,
        drained_entries,
        layer_stats.step_cycles_total
    );

    Ok(LayerReport {
        layer_id: spec.layer_id,
        name: spec.name.clone(),
        h_out,
        w_out,
        total_tiles,
        drained_entries,
        stats: layer_stats,
        cache: core.cache().map(|c| c.stats().clone()),
    })
}

/// Run every configured layer in ascending layer-id order
pub fn run_network(
    specs: &[LayerSpec],
    dram: &mut SpineDram,
    opts: &RunOptions,
) -> Result<Vec<LayerReport>> {
    let mut reports = Vec::with_capacity(specs.len());
    for spec in specs {
        let report = match spec.kind {
            LayerKind::Conv => ConvLayer::new(spec)?.run_layer(dram, opts)?,
            LayerKind::Fc => FcLayer::new(spec)?.run_layer(dram, opts)?,
        };
        reports.push(report);
    }
    Ok(reports)
}

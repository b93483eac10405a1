//! Per-stage activity counters and per-layer cycle statistics

/// Activity counters for one pipeline stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Ticks where the stage did useful work
    pub ran: u64,
    /// Ticks where the stage's validity gate was off
    pub gated_off: u64,
    /// Ticks where the stage was eligible but stalled (e.g. downstream full)
    pub eligible_but_noop: u64,
}

impl StageStats {
    /// Accumulate another counter set into this one
    pub fn accumulate(&mut self, other: &StageStats) {
        self.ran += other.ran;
        self.gated_off += other.gated_off;
        self.eligible_but_noop += other.eligible_but_noop;
    }
}

/// Cycle breakdown for one layer (or one site before accumulation)
#[derive(Debug, Clone, Default)]
pub struct LayerCycleStats {
    /// Cycles spent preloading the first input batch of each tile
    pub preload_input_cycles: u64,
    /// Cycles spent on in-step input batch reloads
    pub load_input_cycles_in_step: u64,
    /// Cycles spent loading weight tiles
    pub weight_load_cycles: u64,
    /// Cycles spent in the final tile-sort drain
    pub output_drain_cycles: u64,
    /// Cycles spent storing the output spine to DRAM
    pub output_store_cycles: u64,

    /// Ticks executed by the compute loop
    pub step_ticks: u64,
    /// Total compute-loop cycles (ticks plus blocking memory cycles)
    pub step_cycles_total: u64,
    /// Blocking memory cycles charged inside the compute loop
    pub step_extra_memload_cycles: u64,

    /// Stage 0 (tiled output buffer) activity
    pub tob_in: StageStats,
    /// Stage 1 (PE array) activity
    pub pe: StageStats,
    /// Stage 2 (min-finder batch) activity
    pub mfb: StageStats,
    /// Input-spine batch loader activity
    pub isb_ld: StageStats,
}

impl LayerCycleStats {
    /// Reset all per-site counters
    pub fn reset_site(&mut self) {
        *self = LayerCycleStats::default();
    }

    /// Accumulate a site's statistics into a layer-wide sum
    pub fn accumulate(&mut self, site: &LayerCycleStats) {
        self.preload_input_cycles += site.preload_input_cycles;
        self.load_input_cycles_in_step += site.load_input_cycles_in_step;
        self.weight_load_cycles += site.weight_load_cycles;
        self.output_drain_cycles += site.output_drain_cycles;
        self.output_store_cycles += site.output_store_cycles;

        self.step_ticks += site.step_ticks;
        self.step_cycles_total += site.step_cycles_total;
        self.step_extra_memload_cycles += site.step_extra_memload_cycles;

        self.tob_in.accumulate(&site.tob_in);
        self.pe.accumulate(&site.pe);
        self.mfb.accumulate(&site.mfb);
        self.isb_ld.accumulate(&site.isb_ld);
    }
}

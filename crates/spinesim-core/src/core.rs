//! Per-site core controller
//!
//! Owns every pipeline component for one layer and drives the per-site state
//! machine: prepare-site, per-tile prepare, the compute loop, and the final
//! drain-and-store. Stage order within a tick is `S0` (tiled output buffer),
//! `S1` (PE pull from the global merger), `S2` (min-finder), so each stage
//! consumes what its upstream produced on the previous tick.

use crate::cache::{CacheSim, LineAddr};
use crate::constants::{MAX_BATCHES, TILES_PER_SPINE};
use crate::cost::IoShadow;
use crate::error::{CoreError, Result};
use crate::fifo::IntermediateFifo;
use crate::filter::{FilterBuffer, FilterGeometry};
use crate::input_spine::InputSpineBuffer;
use crate::merger::GlobalMerger;
use crate::min_finder::{MinFinderBatch, MinFinderOutcome};
use crate::output_spine::{OutputSorter, OutputSpine};
use crate::pe_array::PeArray;
use crate::stats::LayerCycleStats;
use crate::tiled_output::TiledOutputBuffer;
use spinesim_storage::SpineDram;

/// Immutable per-layer parameters of one core
#[derive(Debug, Clone)]
pub struct CoreParams {
    /// Layer id in the DRAM metadata
    pub layer_id: u32,
    /// Input channels
    pub c_in: usize,
    /// Output channels
    pub c_out: usize,
    /// Input height
    pub h_in: usize,
    /// Input width
    pub w_in: usize,
    /// Output height
    pub h_out: usize,
    /// Output width
    pub w_out: usize,
    /// Kernel height
    pub k_h: usize,
    /// Kernel width
    pub k_w: usize,
    /// Vertical stride
    pub s_h: usize,
    /// Horizontal stride
    pub s_w: usize,
    /// Vertical padding
    pub p_h: usize,
    /// Horizontal padding
    pub p_w: usize,
    /// PE firing threshold
    pub threshold: i8,
    /// Output tiles: `ceil(C_out / 128)`
    pub total_tiles: usize,
}

/// The core: one layer's pipeline plus per-site control state
pub struct Core {
    params: CoreParams,

    fifos: Vec<IntermediateFifo>,
    isb: InputSpineBuffer,
    fb: FilterBuffer,
    pe_array: PeArray,
    tob: TiledOutputBuffer,
    out_spine: OutputSpine,

    cache: Option<CacheSim>,
    io_shadow: IoShadow,

    h_out_cur: usize,
    w_out_cur: usize,

    v_tob_in: bool,
    v_pe: bool,
    v_mfb: bool,
    compute_finished: bool,

    batches: Vec<Vec<u32>>,
    batch_cursor: i32,
    batches_needed: usize,
    input_drained: [bool; MAX_BATCHES],
    totally_drained: [bool; MAX_BATCHES],

    stats: LayerCycleStats,
}

impl Core {
    /// Create a core for one layer
    pub fn new(params: CoreParams) -> Result<Self> {
        if params.total_tiles == 0 || params.total_tiles > TILES_PER_SPINE {
            return Err(CoreError::invalid_config(format!(
                "{} output tiles do not fit {TILES_PER_SPINE} tile buffers",
                params.total_tiles
            )));
        }
        let fb = FilterBuffer::new(FilterGeometry {
            c_in: params.c_in,
            w_in: params.w_in,
            k_h: params.k_h,
            k_w: params.k_w,
            s_h: params.s_h,
            s_w: params.s_w,
            p_h: params.p_h,
            p_w: params.p_w,
        })?;
        Ok(Self {
            params,
            fifos: vec![IntermediateFifo::new(); MAX_BATCHES],
            isb: InputSpineBuffer::new(),
            fb,
            pe_array: PeArray::new(),
            tob: TiledOutputBuffer::new(),
            out_spine: OutputSpine::default(),
            cache: None,
            io_shadow: IoShadow::new(),
            h_out_cur: 0,
            w_out_cur: 0,
            v_tob_in: false,
            v_pe: false,
            v_mfb: false,
            compute_finished: false,
            batches: Vec::new(),
            batch_cursor: -1,
            batches_needed: 0,
            input_drained: [false; MAX_BATCHES],
            totally_drained: [false; MAX_BATCHES],
            stats: LayerCycleStats::default(),
        })
    }

    /// Layer parameters
    pub fn params(&self) -> &CoreParams {
        &self.params
    }

    /// Attach (or detach) the weight-cache latency model
    pub fn set_cache(&mut self, cache: Option<CacheSim>) {
        self.cache = cache;
    }

    /// The attached cache, if any
    pub fn cache(&self) -> Option<&CacheSim> {
        self.cache.as_ref()
    }

    /// Per-site statistics gathered since the last reset
    pub fn site_stats(&self) -> &LayerCycleStats {
        &self.stats
    }

    /// Reset the per-site statistics counters
    pub fn reset_site_stats(&mut self) {
        self.stats.reset_site();
    }

    /// Whether the current tile's compute loop has quiesced
    pub fn compute_finished(&self) -> bool {
        self.compute_finished
    }

    // ---- per-site preparation ----

    /// Prepare the controller for output site `(h_out, w_out)` with its
    /// batch table (one spine-id list per batch).
    pub fn prepare_site(
        &mut self,
        h_out: usize,
        w_out: usize,
        batches: Vec<Vec<u32>>,
    ) -> Result<()> {
        if h_out >= self.params.h_out || w_out >= self.params.w_out {
            return Err(CoreError::invalid_config(format!(
                "site ({h_out}, {w_out}) outside {}x{} output",
                self.params.h_out, self.params.w_out
            )));
        }
        if batches.len() > MAX_BATCHES {
            return Err(CoreError::invalid_config(format!(
                "{} batches exceed the {MAX_BATCHES} intermediate FIFOs",
                batches.len()
            )));
        }

        self.h_out_cur = h_out;
        self.w_out_cur = w_out;
        self.fb.update(h_out, w_out);
        self.out_spine
            .set_spine_id((h_out * self.params.w_out + w_out) as u32);
        self.tob.clear_all();
        self.reset_signals();

        self.batches_needed = batches.len().max(1);
        self.batches = batches;
        self.batch_cursor = -1;
        self.input_drained = [false; MAX_BATCHES];
        self.totally_drained = [false; MAX_BATCHES];
        Ok(())
    }

    /// Prepare one output tile: PE wiring, FIFO reset, weight load, input
    /// preload.
    pub fn prepare_tile(&mut self, dram: &SpineDram, tile: usize) -> Result<()> {
        self.pe_array.init_out_neuron_ids(
            tile as u32,
            self.h_out_cur as u32,
            self.w_out_cur as u32,
            self.params.w_out as u32,
            self.params.c_out as u32,
        );
        self.pe_array.reset_membranes();
        self.pe_array.clear_outputs();
        self.reset_signals();
        for fifo in &mut self.fifos {
            fifo.clear();
        }
        self.input_drained = [false; MAX_BATCHES];
        self.totally_drained = [false; MAX_BATCHES];
        self.io_shadow.reset();

        let (_, weight_cycles) = self.fb.load_weights(
            dram,
            self.params.layer_id,
            tile as u32,
            self.params.total_tiles as u32,
        )?;
        self.stats.weight_load_cycles += weight_cycles;

        if let Some(first) = self.batches.first().cloned() {
            if let Some(cycles) =
                self.isb
                    .preload_first_batch(dram, &first, self.params.layer_id)?
            {
                self.stats.preload_input_cycles += cycles;
            }
        }
        self.batch_cursor = 0;
        Ok(())
    }

    // ---- compute loop ----

    /// One synchronous tick of the per-site pipeline.
    pub fn step_once(&mut self, dram: &SpineDram, tile: usize) -> Result<()> {
        self.stats.step_ticks += 1;
        self.stats.step_cycles_total += 1;
        self.io_shadow.on_compute_cycles(1);

        // S0: tiled output buffer consumes last tick's PE slots
        if self.v_tob_in {
            let slots = *self.pe_array.out_slots();
            let tob_tile = tile % TILES_PER_SPINE;
            let (_ingested, _emitted) = self.tob.run(tob_tile, &slots)?;
            if !self.tob.stall_next_cycle() {
                self.pe_array.clear_outputs();
            }
            self.stats.tob_in.ran += 1;
        } else {
            self.stats.tob_in.gated_off += 1;
        }

        // S1: PE array pulls the smallest live entry and integrates it
        let mut pe_produced = false;
        if self.v_pe {
            if self.pe_array.any_output() {
                // previous outputs not yet ingested downstream
                self.stats.pe.eligible_but_noop += 1;
            } else if let Some(entry) =
                GlobalMerger::pick(&mut self.fifos, &self.totally_drained, self.batches_needed)
            {
                if let Some(cache) = &mut self.cache {
                    cache.notify_spike(entry.neuron_id % self.params.c_in.max(1) as u32);
                }
                match self.fb.resolve_row(entry.neuron_id) {
                    Some(lookup) => {
                        if let Some(cache) = &mut self.cache {
                            cache.access(LineAddr::new(
                                tile as u32,
                                lookup.c_in as u32,
                                lookup.kh as u32,
                                lookup.kw as u32,
                            ));
                        }
                        let row = self.fb.active_row(lookup.row_id)?;
                        self.pe_array
                            .latch_row(entry.ts, row, self.params.threshold);
                        self.pe_array.tick();
                        pe_produced = self.pe_array.any_output();
                        self.stats.pe.ran += 1;
                    }
                    None => {
                        // padding tap: the entry is dropped before any PE
                        log::debug!(
                            "padding tap dropped: neuron {} at site ({}, {})",
                            entry.neuron_id,
                            self.h_out_cur,
                            self.w_out_cur
                        );
                        self.stats.pe.ran += 1;
                    }
                }
            } else {
                self.stats.pe.eligible_but_noop += 1;
            }
        } else {
            self.stats.pe.gated_off += 1;
        }

        // S2: min-finder drains the ISB into the current batch's FIFO
        if self.v_mfb {
            let outcome = MinFinderBatch::run(
                &mut self.isb,
                &mut self.fifos,
                &mut self.batch_cursor,
                &mut self.input_drained,
                self.batches_needed,
            )?;
            match outcome {
                MinFinderOutcome::Pushed => self.stats.mfb.ran += 1,
                MinFinderOutcome::FifoFull => self.stats.mfb.eligible_but_noop += 1,
                MinFinderOutcome::BatchDrained => {
                    self.stats.mfb.ran += 1;
                    self.reload_next_batch(dram)?;
                }
                MinFinderOutcome::PastLastBatch => self.stats.mfb.eligible_but_noop += 1,
            }
        } else {
            self.stats.mfb.gated_off += 1;
        }

        // settle drained flags before the gate is consulted next tick
        for b in 0..self.batches_needed.min(MAX_BATCHES) {
            if self.input_drained[b] && self.fifos[b].empty() {
                self.totally_drained[b] = true;
            }
        }

        // next-tick validities
        let stalled = self.tob.stall_next_cycle();
        let fifos_have_data = self.fifos_have_data();
        let pe_outputs_pending = self.pe_array.any_output();

        self.v_tob_in = pe_outputs_pending || !self.tob.pe_fifos_empty();
        self.v_pe = !stalled && (fifos_have_data || pe_outputs_pending);
        self.v_mfb = self.batch_cursor >= 0 && (self.batch_cursor as usize) < self.batches_needed;

        self.compute_finished = !stalled
            && !fifos_have_data
            && !pe_produced
            && !pe_outputs_pending
            && self.isb.all_empty()
            && self.tob.pe_fifos_empty()
            && self.batch_cursor as usize >= self.batches_needed;
        Ok(())
    }

    // ---- drain phase ----

    /// Tile-sort everything buffered for this site into the output spine and
    /// store it to DRAM.
    ///
    /// Returns the number of entries drained.
    pub fn drain_and_store(&mut self, dram: &mut SpineDram) -> Result<usize> {
        let moved = OutputSorter::drain_all(&mut self.tob, &mut self.out_spine)?;
        // the sorter moves one entry per cycle
        self.stats.output_drain_cycles += moved as u64;

        let (_, store_cycles) = self.out_spine.store(dram, self.params.layer_id)?;
        self.stats.output_store_cycles += store_cycles;
        Ok(moved)
    }

    // ---- helpers ----

    fn reset_signals(&mut self) {
        self.v_tob_in = false;
        self.v_pe = false;
        self.v_mfb = false;
        self.compute_finished = false;
    }

    fn fifos_have_data(&self) -> bool {
        self.fifos.iter().any(|f| !f.empty())
    }

    fn reload_next_batch(&mut self, dram: &SpineDram) -> Result<()> {
        let cursor = self.batch_cursor;
        if cursor < 0 || cursor as usize >= self.batches.len() {
            return Ok(());
        }
        let spine_ids = self.batches[cursor as usize].clone();
        if let Some(cycles) =
            self.isb
                .run(dram, &spine_ids, self.params.layer_id, cursor, self.batches.len())?
        {
            self.stats.load_input_cycles_in_step += cycles;
            let cost = self.io_shadow.apply_load_cycles(cycles);
            self.stats.step_extra_memload_cycles += cost.block_cycles;
            self.stats.step_cycles_total += cost.block_cycles;
            self.stats.isb_ld.ran += 1;
        } else {
            self.stats.isb_ld.eligible_but_noop += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_PE;
    use spinesim_storage::{Entry, LayerMeta, SpineDram, SpineMeta, WeightTileMeta};

    /// Minimal 1x1 conv layer: one input spine, one constant weight tile.
    fn build_dram(entries: &[Entry], weight: u8, rows_per_tile: usize, tiles: usize) -> SpineDram {
        let mut image = Vec::new();
        let mut meta = LayerMeta::default();

        let spine_bytes = Entry::encode_stream(entries);
        meta.input_spines.insert(
            0,
            SpineMeta { id: 0, addr: 0, size: spine_bytes.len() as u32 },
        );
        image.extend_from_slice(&spine_bytes);

        for tile in 0..tiles {
            let tile_bytes = vec![weight; rows_per_tile * NUM_PE];
            meta.weight_tiles.insert(
                tile as u32,
                WeightTileMeta {
                    tile: tile as u32,
                    addr: image.len() as u64,
                    size: tile_bytes.len() as u32,
                },
            );
            image.extend_from_slice(&tile_bytes);
        }

        let out_begin = image.len() as u64;
        let out_end = out_begin + 64 * 1024;
        meta.output_region_begin = out_begin;
        meta.output_region_end = out_end;
        meta.output_write_ptr = out_begin;

        let mut dram = SpineDram::new(out_end);
        dram.load_raw_image(&image).unwrap();
        dram.set_layer_meta(0, meta).unwrap();
        dram
    }

    fn unit_conv_params(c_out: usize, total_tiles: usize) -> CoreParams {
        CoreParams {
            layer_id: 0,
            c_in: 1,
            c_out,
            h_in: 1,
            w_in: 1,
            h_out: 1,
            w_out: 1,
            k_h: 1,
            k_w: 1,
            s_h: 1,
            s_w: 1,
            p_h: 0,
            p_w: 0,
            threshold: 1,
            total_tiles,
        }
    }

    fn run_site(core: &mut Core, dram: &mut SpineDram) -> usize {
        core.prepare_site(0, 0, vec![vec![0]]).unwrap();
        for tile in 0..core.params().total_tiles {
            core.prepare_tile(dram, tile).unwrap();
            let mut guard = 0;
            while !core.compute_finished() {
                core.step_once(dram, tile).unwrap();
                guard += 1;
                assert!(guard < 100_000, "no quiescence");
            }
        }
        core.drain_and_store(dram).unwrap()
    }

    #[test]
    fn test_single_entry_single_tile() {
        let mut dram = build_dram(&[Entry::new(5, 0)], 2, 1, 1);
        let mut core = Core::new(unit_conv_params(128, 1)).unwrap();
        let drained = run_site(&mut core, &mut dram);
        assert_eq!(drained, 128);

        let out = dram.output_entries(0, 0).unwrap();
        assert_eq!(out.len(), 128);
        for (lane, e) in out.iter().enumerate() {
            assert_eq!(e.ts, 5);
            assert_eq!(e.neuron_id, lane as u32);
        }
    }

    #[test]
    fn test_zero_weights_no_output() {
        let mut dram = build_dram(&[Entry::new(5, 0)], 0, 1, 1);
        let mut core = Core::new(unit_conv_params(128, 1)).unwrap();
        assert_eq!(run_site(&mut core, &mut dram), 0);
        assert!(dram.output_entries(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_two_tiles_output_ids() {
        let mut dram = build_dram(&[Entry::new(3, 0)], 2, 1, 2);
        let mut core = Core::new(unit_conv_params(256, 2)).unwrap();
        let drained = run_site(&mut core, &mut dram);
        assert_eq!(drained, 256);

        let out = dram.output_entries(0, 0).unwrap();
        // tile 0 produced ids 0..128, tile 1 produced 128..256
        let mut ids: Vec<u32> = out.iter().map(|e| e.neuron_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..256).collect::<Vec<u32>>());
    }

    #[test]
    fn test_output_is_sorted_per_site() {
        let entries = vec![Entry::new(1, 0), Entry::new(3, 0), Entry::new(7, 0)];
        let mut dram = build_dram(&entries, 2, 1, 1);
        let mut core = Core::new(unit_conv_params(128, 1)).unwrap();
        run_site(&mut core, &mut dram);

        let out = dram.output_entries(0, 0).unwrap();
        assert_eq!(out.len(), 3 * 128);
        for pair in out.windows(2) {
            assert!(pair[0] <= pair[1], "{} > {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_too_many_tiles_rejected() {
        assert!(Core::new(unit_conv_params(128 * 9, 9)).is_err());
    }

    #[test]
    fn test_conservation_with_cache_attached() {
        let entries: Vec<Entry> = (0..10).map(|i| Entry::new(i, 0)).collect();
        let mut dram = build_dram(&entries, 2, 1, 1);
        let mut core = Core::new(unit_conv_params(128, 1)).unwrap();
        core.set_cache(Some(CacheSim::new(Default::default())));
        let drained = run_site(&mut core, &mut dram);
        assert_eq!(drained, 10 * 128);

        let stats = core.cache().unwrap().stats();
        assert_eq!(stats.demand_accesses, 10);
        // same line re-demanded: one unique line, nine reuses
        assert_eq!(stats.unique_demand_lines, 1);
    }
}

//! Clocked six-stage pipeline: `S0..S5` under one synchronous tick
//!
//! Stage order is tail to head (`S0` output queue first, `S5` ISB refill
//! last) so that each stage consumes what its upstream produced on the
//! previous tick. Control flows the other way through readiness checks and
//! the one-bit `st1_st2_valid` handshake.

use crate::constants::MAX_BATCHES;
use crate::error::{CoreError, Result};
use crate::fifo::IntermediateFifo;
use crate::filter::FilterBuffer;
use crate::input_spine::InputSpineBuffer;
use crate::lut::WeightLut;
use crate::min_finder::{MinFinderBatch, MinFinderOutcome};
use crate::output_queue::{LinePacket, OutputQueue};
use crate::pe_array::PeArray;
use crate::picker::SmallestTsPicker;
use crate::provider::InputWeightProvider;
use spinesim_storage::SpineDram;

/// Shared pipeline control signals, owned by the controller and borrowed
/// mutably within a tick.
///
/// `st1_st2_valid` is written only by stage 1 and read only by stage 2.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSignals {
    /// Stage-1/stage-2 handshake: stage-2 writes are accepted while `true`
    pub st1_st2_valid: bool,
}

impl Default for PipelineSignals {
    fn default() -> Self {
        Self { st1_st2_valid: true }
    }
}

/// The clocked core: all six stages plus their shared state.
pub struct ClockCore {
    out_q: OutputQueue,
    picker: SmallestTsPicker,
    pe_array: PeArray,
    iwp: InputWeightProvider,
    isb: InputSpineBuffer,

    fifos: Vec<IntermediateFifo>,
    totally_drained: [bool; MAX_BATCHES],
    input_drained: [bool; MAX_BATCHES],
    batch_cursor: i32,
    batches_needed: usize,

    fb: FilterBuffer,
    lut: WeightLut,
    threshold: i8,

    signals: PipelineSignals,

    layer_id: u32,
    batches: Vec<Vec<u32>>,
    load_cycles: u64,
}

impl ClockCore {
    /// Create a clocked core for one layer's weight path
    pub fn new(fb: FilterBuffer, lut: WeightLut, outq_capacity: usize) -> Self {
        Self {
            out_q: OutputQueue::new(outq_capacity),
            picker: SmallestTsPicker::new(),
            pe_array: PeArray::new(),
            iwp: InputWeightProvider::new(),
            isb: InputSpineBuffer::new(),
            fifos: vec![IntermediateFifo::new(); MAX_BATCHES],
            totally_drained: [false; MAX_BATCHES],
            input_drained: [false; MAX_BATCHES],
            batch_cursor: -1,
            batches_needed: 1,
            fb,
            lut,
            threshold: 0,
            signals: PipelineSignals::default(),
            layer_id: 0,
            batches: Vec::new(),
            load_cycles: 0,
        }
    }

    /// Set the firing threshold broadcast to the PEs
    pub fn set_threshold(&mut self, threshold: i8) {
        self.threshold = threshold;
    }

    /// Tiles the stage-3 pointer advances per pick
    pub fn set_tiles_per_step(&mut self, n: u16) {
        self.iwp.set_tiles_per_step(n);
    }

    /// Install the per-site batch table and reset batch bookkeeping
    pub fn set_batches(&mut self, layer_id: u32, batches: Vec<Vec<u32>>) -> Result<()> {
        if batches.len() > MAX_BATCHES {
            return Err(CoreError::invalid_config(format!(
                "{} batches exceed the {MAX_BATCHES} intermediate FIFOs",
                batches.len()
            )));
        }
        self.batches_needed = batches.len().max(1);
        self.batches = batches;
        self.layer_id = layer_id;
        self.batch_cursor = -1;
        self.totally_drained = [false; MAX_BATCHES];
        self.input_drained = [false; MAX_BATCHES];
        for fifo in &mut self.fifos {
            fifo.clear();
        }
        self.picker.clear();
        self.pe_array.clear_outputs();
        self.pe_array.clear_latch();
        self.iwp.reset();
        self.signals = PipelineSignals::default();
        Ok(())
    }

    /// Block-load the first batch; the pipeline may tick afterwards
    pub fn preload(&mut self, dram: &SpineDram) -> Result<()> {
        if let Some(first) = self.batches.first() {
            if let Some(cycles) = self.isb.preload_first_batch(dram, first, self.layer_id)? {
                self.load_cycles += cycles;
            }
        }
        self.batch_cursor = 0;
        Ok(())
    }

    /// One synchronous tick: run `S0..S5` in order.
    ///
    /// Returns `true` while any stage made progress.
    pub fn run(&mut self, dram: &SpineDram) -> Result<bool> {
        let s0 = self.out_q.run();
        let s1 = self.picker.run(&mut self.signals, &mut self.out_q);
        let s2 = self.run_pe_stage();
        let s3 = self.iwp.run(
            &mut self.fifos,
            &self.totally_drained,
            self.batches_needed,
            &self.lut,
            &self.fb,
            &mut self.pe_array,
            self.threshold,
        )?;
        let s4 = self.run_min_finder()?;
        let s5 = self.refill_isb(dram)?;

        self.update_totally_drained();
        Ok(s0 || s1 || s2 || s3 || s4 || s5)
    }

    /// Tick until quiescent, with a tick cap. Returns ticks executed.
    pub fn run_to_quiescence(&mut self, dram: &SpineDram, max_ticks: u64) -> Result<u64> {
        let mut ticks = 0;
        while self.run(dram)? {
            ticks += 1;
            if ticks >= max_ticks {
                return Err(CoreError::invariant(
                    "clock_core",
                    format!("no quiescence after {max_ticks} ticks"),
                ));
            }
        }
        Ok(ticks)
    }

    fn run_pe_stage(&mut self) -> bool {
        if !self.pe_array.has_latch() {
            return false;
        }
        // stall stage 2 while stage 1 is draining its pool
        if !self.signals.st1_st2_valid {
            return false;
        }
        self.pe_array.tick();
        for e in self.pe_array.take_outputs() {
            let accepted = self.picker.stage2_write(&self.signals, e);
            debug_assert!(accepted, "picker rejected a write while the gate was open");
        }
        true
    }

    fn run_min_finder(&mut self) -> Result<bool> {
        if self.batch_cursor < 0 {
            return Ok(false);
        }
        let outcome = MinFinderBatch::run(
            &mut self.isb,
            &mut self.fifos,
            &mut self.batch_cursor,
            &mut self.input_drained,
            self.batches_needed,
        )?;
        Ok(matches!(
            outcome,
            MinFinderOutcome::Pushed | MinFinderOutcome::BatchDrained
        ))
    }

    fn refill_isb(&mut self, dram: &SpineDram) -> Result<bool> {
        let cursor = self.batch_cursor;
        if cursor <= 0 || (cursor as usize) >= self.batches.len() {
            return Ok(false);
        }
        let spine_ids = &self.batches[cursor as usize];
        if let Some(cycles) =
            self.isb
                .run(dram, spine_ids, self.layer_id, cursor, self.batches.len())?
        {
            self.load_cycles += cycles;
            return Ok(true);
        }
        Ok(false)
    }

    fn update_totally_drained(&mut self) {
        for b in 0..self.batches_needed.min(MAX_BATCHES) {
            if self.input_drained[b] && self.fifos[b].empty() {
                self.totally_drained[b] = true;
            }
        }
    }

    /// Current handshake state
    pub fn st1_st2_valid(&self) -> bool {
        self.signals.st1_st2_valid
    }

    /// Cycles spent on DRAM batch loads so far
    pub fn load_cycles(&self) -> u64 {
        self.load_cycles
    }

    /// The PE array, e.g. to seed output neuron ids
    pub fn pe_array_mut(&mut self) -> &mut PeArray {
        &mut self.pe_array
    }

    /// The stage-0 output queue
    pub fn output_queue_mut(&mut self) -> &mut OutputQueue {
        &mut self.out_q
    }

    /// Flush and drain every assembled output line
    pub fn drain_output_lines(&mut self) -> Vec<LinePacket> {
        self.out_q.flush_all_partial_lines();
        let mut lines = Vec::new();
        self.out_q.drain_all_ready_lines(&mut lines);
        lines
    }
}

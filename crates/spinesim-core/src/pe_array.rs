//! Bank of 128 processing elements behind a one-deep input latch

use crate::constants::NUM_PE;
use crate::filter::Row;
use crate::pe::Pe;
use spinesim_storage::Entry;

/// Latched work item: one merged entry plus its weight row
#[derive(Debug, Clone)]
struct Latch {
    ts: u8,
    row: Row,
    threshold: i8,
}

/// The PE array broadcasts a latched `(ts, row, threshold)` to all 128 PEs
/// and collects at most one produced spike per PE per tick.
pub struct PeArray {
    pes: Vec<Pe>,
    latch: Option<Latch>,
    out_slots: [Option<Entry>; NUM_PE],
}

impl Default for PeArray {
    fn default() -> Self {
        Self::new()
    }
}

impl PeArray {
    /// Create an array of idle PEs
    pub fn new() -> Self {
        Self {
            pes: vec![Pe::new(); NUM_PE],
            latch: None,
            out_slots: [None; NUM_PE],
        }
    }

    /// Whether the latch currently holds unconsumed work
    pub fn has_latch(&self) -> bool {
        self.latch.is_some()
    }

    /// Latch one work item. Returns `false` (and drops nothing) when a
    /// previous latch has not been consumed yet.
    pub fn latch_row(&mut self, ts: u8, row: Row, threshold: i8) -> bool {
        if self.latch.is_some() {
            return false;
        }
        self.latch = Some(Latch { ts, row, threshold });
        true
    }

    /// Drop any latched work item
    pub fn clear_latch(&mut self) {
        self.latch = None;
    }

    /// Assign output neuron ids for one tile at one output site:
    /// `(h * w_out + w) * c_out + (tile * 128 + lane)`.
    pub fn init_out_neuron_ids(
        &mut self,
        tile: u32,
        h_out: u32,
        w_out: u32,
        out_w: u32,
        c_out: u32,
    ) {
        let site_base = (h_out * out_w + w_out) * c_out;
        for (lane, pe) in self.pes.iter_mut().enumerate() {
            pe.set_out_neuron_id(site_base + tile * NUM_PE as u32 + lane as u32);
        }
    }

    /// Reset every PE's membrane state (tile start)
    pub fn reset_membranes(&mut self) {
        for pe in &mut self.pes {
            pe.reset();
        }
    }

    /// Drive all PEs for one tick if a latch is present.
    ///
    /// Produced spikes land in the per-PE output slots; the latch is cleared
    /// whether or not anything fired. Returns `true` when a latch was
    /// processed.
    pub fn tick(&mut self) -> bool {
        let Some(latch) = self.latch.take() else {
            return false;
        };
        for (lane, pe) in self.pes.iter_mut().enumerate() {
            self.out_slots[lane] = pe
                .process(latch.ts, latch.row[lane], latch.threshold)
                .map(|ts| Entry::new(ts, pe.out_neuron_id()));
        }
        true
    }

    /// Per-PE outputs of the last processed latch
    pub fn out_slots(&self) -> &[Option<Entry>; NUM_PE] {
        &self.out_slots
    }

    /// Whether the last tick produced any spike
    pub fn any_output(&self) -> bool {
        self.out_slots.iter().any(Option::is_some)
    }

    /// Clear the per-PE output slots after they have been consumed
    pub fn clear_outputs(&mut self) {
        self.out_slots = [None; NUM_PE];
    }

    /// Drain the output slots into a flat list, clearing them
    pub fn take_outputs(&mut self) -> Vec<Entry> {
        let out: Vec<Entry> = self.out_slots.iter().flatten().copied().collect();
        self.clear_outputs();
        out
    }
}

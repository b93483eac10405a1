//! Physical input-spine buffer: 16 FIFO lanes holding one loaded batch

use crate::constants::{ISB_ENTRIES, PHYS_LANES};
use crate::cost::MemTiming;
use crate::error::{CoreError, Result};
use spinesim_storage::{Entry, SpineDram};

#[derive(Debug, Clone, Default)]
struct Lane {
    entries: Vec<Entry>,
    read_idx: usize,
    loaded_logical_id: Option<u32>,
}

impl Lane {
    fn available(&self) -> usize {
        self.entries.len() - self.read_idx
    }

    fn head(&self) -> Option<Entry> {
        self.entries.get(self.read_idx).copied()
    }
}

/// Fixed bank of physical spine lanes, block-loaded from DRAM one batch at a
/// time.
///
/// Within a lane, entries are monotonically non-decreasing in `ts` (spines
/// are packed sorted); the pop side therefore only needs to compare lane
/// heads.
#[derive(Debug)]
pub struct InputSpineBuffer {
    lanes: Vec<Lane>,
    timing: MemTiming,
}

impl Default for InputSpineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSpineBuffer {
    /// Create an empty buffer with default timing
    pub fn new() -> Self {
        Self {
            lanes: vec![Lane::default(); PHYS_LANES],
            timing: MemTiming::default(),
        }
    }

    /// Override the DRAM load timing model
    pub fn set_timing(&mut self, timing: MemTiming) {
        self.timing = timing;
    }

    /// Number of physical lanes
    pub fn num_lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Entries one lane can hold
    pub fn entries_per_lane(&self) -> usize {
        ISB_ENTRIES
    }

    /// Empty all lanes
    pub fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.entries.clear();
            lane.read_idx = 0;
            lane.loaded_logical_id = None;
        }
    }

    /// Pre-load the first batch of a tile.
    ///
    /// Returns the load cost in cycles, or `Ok(None)` if the id list was
    /// empty. Fails when more spine ids are supplied than physical lanes.
    pub fn preload_first_batch(
        &mut self,
        dram: &SpineDram,
        spine_ids: &[u32],
        layer_id: u32,
    ) -> Result<Option<u64>> {
        if spine_ids.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.load_batch(dram, spine_ids, layer_id)?))
    }

    /// Run-time loader: loads the batch at `cursor` only when all lanes are
    /// drained and batches remain.
    ///
    /// Returns the load cost when a load happened.
    pub fn run(
        &mut self,
        dram: &SpineDram,
        spine_ids: &[u32],
        layer_id: u32,
        cursor: i32,
        total_batches: usize,
    ) -> Result<Option<u64>> {
        if cursor < 0 || cursor as usize >= total_batches {
            return Ok(None);
        }
        if !self.all_empty() {
            return Ok(None);
        }
        Ok(Some(self.load_batch(dram, spine_ids, layer_id)?))
    }

    /// Pop the entry with the globally smallest head timestamp.
    ///
    /// Ties break toward the lowest lane index. Returns `None` iff every
    /// lane is empty.
    pub fn pop_smallest(&mut self) -> Option<Entry> {
        let mut best: Option<(usize, u8)> = None;
        for (idx, lane) in self.lanes.iter().enumerate() {
            if let Some(head) = lane.head() {
                match best {
                    Some((_, best_ts)) if head.ts >= best_ts => {}
                    _ => best = Some((idx, head.ts)),
                }
            }
        }
        let (idx, _) = best?;
        let lane = &mut self.lanes[idx];
        let entry = lane.head();
        lane.read_idx += 1;
        entry
    }

    /// Whether every lane has been fully consumed
    pub fn all_empty(&self) -> bool {
        self.lanes.iter().all(|l| l.available() == 0)
    }

    fn load_batch(&mut self, dram: &SpineDram, spine_ids: &[u32], layer_id: u32) -> Result<u64> {
        if spine_ids.len() > self.lanes.len() {
            return Err(CoreError::InvalidBatch {
                spines: spine_ids.len(),
                lanes: self.lanes.len(),
            });
        }

        self.reset();

        let lane_bytes = ISB_ENTRIES * Entry::WIRE_BYTES;
        let mut scratch = vec![0u8; lane_bytes];
        let mut total_bytes: u64 = 0;

        for (lane, &spine_id) in self.lanes.iter_mut().zip(spine_ids) {
            let n = dram.load_input_spine(layer_id, spine_id, &mut scratch)?;
            lane.entries = Entry::decode_stream(&scratch[..n])?;
            lane.read_idx = 0;
            lane.loaded_logical_id = Some(spine_id);
            total_bytes += n as u64;
        }

        let cycles = self.timing.cycles_for_bytes(total_bytes);
        log::debug!(
            "ISB batch load: {} spines, {} bytes, {} cycles",
            spine_ids.len(),
            total_bytes,
            cycles
        );
        Ok(cycles)
    }
}

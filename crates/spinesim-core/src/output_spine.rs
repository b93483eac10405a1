//! Linear output spine buffer and the final tile-sort drain

use crate::constants::{OUTPUT_SPINE_MAX_ENTRIES, TILES_PER_SPINE};
use crate::cost::MemTiming;
use crate::error::{CoreError, Result};
use crate::tiled_output::TiledOutputBuffer;
use spinesim_storage::{Entry, SpineDram};

/// Growing, capacity-bounded buffer for one output site's spike stream
pub struct OutputSpine {
    spine_id: u32,
    capacity_limit: usize,
    buf: Vec<Entry>,
    timing: MemTiming,
}

impl Default for OutputSpine {
    fn default() -> Self {
        Self::new(OUTPUT_SPINE_MAX_ENTRIES)
    }
}

impl OutputSpine {
    /// Create with an explicit capacity limit
    pub fn new(capacity_limit: usize) -> Self {
        Self {
            spine_id: 0,
            capacity_limit,
            buf: Vec::new(),
            timing: MemTiming {
                bw_bytes_per_cycle: 160,
                fixed_latency: 0,
                wire_entry_bytes: Entry::WIRE_BYTES as u32,
            },
        }
    }

    /// Override the DRAM store timing model
    pub fn set_timing(&mut self, timing: MemTiming) {
        self.timing = timing;
    }

    /// Select the logical spine id this buffer stores under
    pub fn set_spine_id(&mut self, spine_id: u32) {
        self.spine_id = spine_id;
    }

    /// Append one entry; errors when the capacity bound is hit
    pub fn push(&mut self, e: Entry) -> Result<()> {
        if self.buf.len() >= self.capacity_limit {
            return Err(CoreError::OutputSpineFull {
                capacity: self.capacity_limit,
            });
        }
        self.buf.push(e);
        Ok(())
    }

    /// Buffered entries
    pub fn entries(&self) -> &[Entry] {
        &self.buf
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer holds no entries
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Store the buffered stream to DRAM and clear the buffer.
    ///
    /// Returns `(bytes_written, store_cycles)`.
    pub fn store(&mut self, dram: &mut SpineDram, layer_id: u32) -> Result<(u32, u64)> {
        let entries = self.buf.len() as u64;
        let cycles = self.timing.cycles_for_entries(entries);
        let bytes = Entry::encode_stream(&self.buf);
        let written = dram.store_output_spine(layer_id, self.spine_id, &bytes)?;
        self.buf.clear();
        log::debug!(
            "output spine {} stored: {written} bytes, {cycles} cycles",
            self.spine_id
        );
        Ok((written, cycles))
    }
}

/// Final drain-phase merger across the per-tile buffers.
///
/// Each tile buffer is already monotone in `ts`; repeatedly popping the
/// smallest head yields one globally non-decreasing stream per site.
pub struct OutputSorter;

impl OutputSorter {
    /// Move one entry from the smallest tile head into the output spine.
    ///
    /// Returns `false` when every tile buffer is empty.
    pub fn sort_one(tob: &mut TiledOutputBuffer, out_spine: &mut OutputSpine) -> Result<bool> {
        let mut best: Option<(usize, Entry)> = None;
        for tile in 0..TILES_PER_SPINE {
            if let Some(head) = tob.peek_tile_head(tile) {
                match best {
                    Some((_, best_entry)) if head >= best_entry => {}
                    _ => best = Some((tile, head)),
                }
            }
        }
        let Some((tile, _)) = best else {
            return Ok(false);
        };
        let e = tob.pop_tile_head(tile).ok_or_else(|| {
            CoreError::invariant("output_sorter", "tile head vanished between peek and pop")
        })?;
        out_spine.push(e)?;
        Ok(true)
    }

    /// Drain every tile buffer into the output spine.
    ///
    /// Returns the number of entries moved.
    pub fn drain_all(tob: &mut TiledOutputBuffer, out_spine: &mut OutputSpine) -> Result<usize> {
        let mut moved = 0;
        while Self::sort_one(tob, out_spine)? {
            moved += 1;
        }
        Ok(moved)
    }
}

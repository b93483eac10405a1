//! Tiled output buffer: per-PE smoothing FIFOs feeding per-tile buffers
//!
//! Each PE contributes at most one entry per tick into its depth-4 mini
//! FIFO. One entry per tick (the smallest timestamp across mini-FIFO heads)
//! is emitted into the tile buffer selected by the running tile id. When any
//! mini FIFO is full, the stall flag is raised for the next tick so the PE
//! stage pauses; the emit side keeps draining.

use std::collections::VecDeque;

use crate::constants::{NUM_PE, PE_FIFO_DEPTH, TILES_PER_SPINE};
use crate::error::{CoreError, Result};
use spinesim_storage::Entry;

/// Per-tile spike collector with per-PE smoothing FIFOs
pub struct TiledOutputBuffer {
    pe_fifos: Vec<VecDeque<Entry>>,
    tile_buffers: Vec<VecDeque<Entry>>,
    stall_next_cycle: bool,
}

impl Default for TiledOutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TiledOutputBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            pe_fifos: vec![VecDeque::with_capacity(PE_FIFO_DEPTH); NUM_PE],
            tile_buffers: vec![VecDeque::new(); TILES_PER_SPINE],
            stall_next_cycle: false,
        }
    }

    /// Whether the PE stage must stall on the next tick
    pub fn stall_next_cycle(&self) -> bool {
        self.stall_next_cycle
    }

    /// Whether every per-PE mini FIFO is empty
    pub fn pe_fifos_empty(&self) -> bool {
        self.pe_fifos.iter().all(VecDeque::is_empty)
    }

    /// Whether every tile buffer is empty
    pub fn tiles_empty(&self) -> bool {
        self.tile_buffers.iter().all(VecDeque::is_empty)
    }

    /// One tick: ingest per-PE slots (unless stalled), then emit at most one
    /// entry into the tile buffer for `tile_id`.
    ///
    /// Returns `(ingested, emitted)` counts.
    pub fn run(
        &mut self,
        tile_id: usize,
        slots: &[Option<Entry>; NUM_PE],
    ) -> Result<(usize, usize)> {
        if tile_id >= TILES_PER_SPINE {
            return Err(CoreError::invariant(
                "tiled_output",
                format!("tile id {tile_id} outside {TILES_PER_SPINE} tile buffers"),
            ));
        }

        let any_full = self.pe_fifos.iter().any(|q| q.len() >= PE_FIFO_DEPTH);
        self.stall_next_cycle = any_full;

        let mut ingested = 0;
        if !any_full {
            for (fifo, slot) in self.pe_fifos.iter_mut().zip(slots) {
                if let Some(e) = slot {
                    // one entry per PE per tick cannot overflow depth here
                    fifo.push_back(*e);
                    ingested += 1;
                }
            }
        }

        let mut emitted = 0;
        if let Some(best_pe) = self.smallest_head_pe() {
            let e = self.pe_fifos[best_pe].pop_front().ok_or_else(|| {
                CoreError::invariant("tiled_output", "head vanished between peek and pop")
            })?;
            self.tile_buffers[tile_id].push_back(e);
            emitted = 1;
        }

        Ok((ingested, emitted))
    }

    /// Peek the head of one tile buffer
    pub fn peek_tile_head(&self, tile_id: usize) -> Option<Entry> {
        self.tile_buffers.get(tile_id)?.front().copied()
    }

    /// Pop the head of one tile buffer
    pub fn pop_tile_head(&mut self, tile_id: usize) -> Option<Entry> {
        self.tile_buffers.get_mut(tile_id)?.pop_front()
    }

    /// Drop all buffered entries and the stall flag
    pub fn clear_all(&mut self) {
        for q in &mut self.pe_fifos {
            q.clear();
        }
        for q in &mut self.tile_buffers {
            q.clear();
        }
        self.stall_next_cycle = false;
    }

    fn smallest_head_pe(&self) -> Option<usize> {
        let mut best: Option<(usize, u8)> = None;
        for (idx, q) in self.pe_fifos.iter().enumerate() {
            if let Some(head) = q.front() {
                match best {
                    Some((_, best_ts)) if head.ts >= best_ts => {}
                    _ => best = Some((idx, head.ts)),
                }
            }
        }
        best.map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots_with(pairs: &[(usize, Entry)]) -> [Option<Entry>; NUM_PE] {
        let mut slots = [None; NUM_PE];
        for (pe, e) in pairs {
            slots[*pe] = Some(*e);
        }
        slots
    }

    #[test]
    fn test_ingest_and_single_emit() {
        let mut tob = TiledOutputBuffer::new();
        let slots = slots_with(&[(0, Entry::new(5, 0)), (3, Entry::new(2, 3))]);
        let (ingested, emitted) = tob.run(0, &slots).unwrap();
        assert_eq!((ingested, emitted), (2, 1));
        // the smaller timestamp went out first
        assert_eq!(tob.peek_tile_head(0), Some(Entry::new(2, 3)));

        let (_, emitted) = tob.run(0, &[None; NUM_PE]).unwrap();
        assert_eq!(emitted, 1);
        assert!(tob.pe_fifos_empty());
    }

    #[test]
    fn test_stall_flag_on_full_fifo() {
        let mut tob = TiledOutputBuffer::new();
        // PE 1 always carries the smaller timestamp, so the per-tick emit
        // drains PE 1 while PE 0 accumulates to depth 4.
        for i in 0..4u8 {
            let slots = slots_with(&[
                (0, Entry::new(9, 0)),
                (1, Entry::new(i, 1)),
            ]);
            tob.run(0, &slots).unwrap();
        }

        // PE 0's fifo is full: this run raises the stall flag, skips
        // ingestion, and still drains one entry.
        let slots = slots_with(&[(2, Entry::new(1, 2))]);
        let (ingested, emitted) = tob.run(0, &slots).unwrap();
        assert!(tob.stall_next_cycle());
        assert_eq!(ingested, 0);
        assert_eq!(emitted, 1);

        // with PE 0 back below depth, the next run ingests again
        let slots = slots_with(&[(2, Entry::new(1, 2))]);
        let (ingested, _) = tob.run(0, &slots).unwrap();
        assert!(!tob.stall_next_cycle());
        assert_eq!(ingested, 1);
    }

    #[test]
    fn test_bad_tile_id() {
        let mut tob = TiledOutputBuffer::new();
        assert!(tob.run(TILES_PER_SPINE, &[None; NUM_PE]).is_err());
    }

    #[test]
    fn test_clear_all() {
        let mut tob = TiledOutputBuffer::new();
        tob.run(0, &slots_with(&[(0, Entry::new(1, 0))])).unwrap();
        tob.clear_all();
        assert!(tob.pe_fifos_empty());
        assert!(tob.tiles_empty());
        assert!(!tob.stall_next_cycle());
    }
}

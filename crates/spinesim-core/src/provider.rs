//! Stage 3 of the clocked pipeline: merge, weight fetch, latch hand-off

use crate::fifo::IntermediateFifo;
use crate::filter::{FilterBuffer, Row};
use crate::lut::WeightLut;
use crate::merger::GlobalMerger;
use crate::pe_array::PeArray;
use crate::error::Result;

#[derive(Debug, Clone)]
struct PendingRow {
    ts: u8,
    row: Row,
}

/// Couples the global merger to the PE array: picks the smallest live entry,
/// resolves its weight row through the LUT, and holds it in a one-deep
/// pending latch until the PE array can accept it.
pub struct InputWeightProvider {
    pending: Option<PendingRow>,
    cur_out_tile: u16,
    tiles_per_step: u16,
}

impl Default for InputWeightProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InputWeightProvider {
    /// Create with the tile pointer at zero
    pub fn new() -> Self {
        Self {
            pending: None,
            cur_out_tile: 0,
            tiles_per_step: 1,
        }
    }

    /// Tiles the pointer advances per picked entry (min 1)
    pub fn set_tiles_per_step(&mut self, n: u16) {
        self.tiles_per_step = n.max(1);
    }

    /// Current output tile the next pick resolves against
    pub fn cur_out_tile(&self) -> u16 {
        self.cur_out_tile
    }

    /// Drop pending state and reset the tile pointer
    pub fn reset(&mut self) {
        self.pending = None;
        self.cur_out_tile = 0;
    }

    /// One stage-3 tick.
    ///
    /// Backpressure discipline: a pending row blocks new picks; an
    /// unconsumed PE-array latch blocks everything.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        fifos: &mut [IntermediateFifo],
        totally_drained: &[bool],
        batches_needed: usize,
        lut: &WeightLut,
        fb: &FilterBuffer,
        pea: &mut PeArray,
        threshold: i8,
    ) -> Result<bool> {
        // hand a previously pending row to the PE array first
        if let Some(pending) = &self.pending {
            if pea.has_latch() {
                return Ok(false);
            }
            let latched = pea.latch_row(pending.ts, pending.row, threshold);
            debug_assert!(latched);
            self.pending = None;
            return Ok(true);
        }

        if pea.has_latch() {
            return Ok(false); // backpressure from stage 2
        }

        let Some(entry) = GlobalMerger::pick(fifos, totally_drained, batches_needed) else {
            return Ok(false);
        };

        let row_id = lut.row_id_from_neuron(entry.neuron_id, self.cur_out_tile)?;
        let row = fb.row(row_id as usize)?;

        // opportunistic same-tick hand-off; otherwise keep pending
        if !pea.latch_row(entry.ts, row, threshold) {
            self.pending = Some(PendingRow { ts: entry.ts, row });
        }

        let out_tiles = lut.out_tiles();
        if out_tiles != 0 {
            self.cur_out_tile = (self.cur_out_tile + self.tiles_per_step) % out_tiles;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_PE;
    use crate::filter::FilterGeometry;
    use spinesim_storage::{Entry, LayerMeta, SpineDram, WeightTileMeta};

    fn setup() -> (Vec<IntermediateFifo>, WeightLut, FilterBuffer, PeArray) {
        let geom = FilterGeometry { c_in: 1, w_in: 1, k_h: 1, k_w: 1, s_h: 1, s_w: 1, p_h: 0, p_w: 0 };
        let mut fb = FilterBuffer::new(geom).unwrap();

        // one tile, one row of constant weight 2
        let bytes = vec![2u8; NUM_PE];
        let mut meta = LayerMeta::default();
        meta.weight_tiles.insert(0, WeightTileMeta { tile: 0, addr: 0, size: bytes.len() as u32 });
        let mut dram = SpineDram::new(bytes.len() as u64);
        dram.load_raw_image(&bytes).unwrap();
        dram.set_layer_meta(0, meta).unwrap();
        fb.load_weights(&dram, 0, 0, 1).unwrap();

        let lut = WeightLut::new(1, 128, 1, 1).unwrap();
        let mut fifos = vec![IntermediateFifo::new(); 1];
        fifos[0].push(Entry::new(4, 0));
        (fifos, lut, fb, PeArray::new())
    }

    #[test]
    fn test_pick_and_latch() {
        let (mut fifos, lut, fb, mut pea) = setup();
        let mut iwp = InputWeightProvider::new();
        let progressed = iwp
            .run(&mut fifos, &[false], 1, &lut, &fb, &mut pea, 1)
            .unwrap();
        assert!(progressed);
        assert!(pea.has_latch());
        assert!(fifos[0].empty());

        pea.tick();
        let outs = pea.take_outputs();
        assert_eq!(outs.len(), NUM_PE);
        assert!(outs.iter().all(|e| e.ts == 4));
    }

    #[test]
    fn test_stalls_on_unconsumed_latch() {
        let (mut fifos, lut, fb, mut pea) = setup();
        fifos[0].push(Entry::new(5, 0));
        let mut iwp = InputWeightProvider::new();

        assert!(iwp.run(&mut fifos, &[false], 1, &lut, &fb, &mut pea, 1).unwrap());
        // latch still occupied: the second entry stays queued
        assert!(!iwp.run(&mut fifos, &[false], 1, &lut, &fb, &mut pea, 1).unwrap());
        assert_eq!(fifos[0].len(), 1);

        pea.tick();
        assert!(iwp.run(&mut fifos, &[false], 1, &lut, &fb, &mut pea, 1).unwrap());
    }

    #[test]
    fn test_gate_blocks_unprimed_batches() {
        let (mut fifos, lut, fb, mut pea) = setup();
        fifos.push(IntermediateFifo::new()); // batch 1 exists but is empty
        let mut iwp = InputWeightProvider::new();
        assert!(!iwp
            .run(&mut fifos, &[false, false], 2, &lut, &fb, &mut pea, 1)
            .unwrap());
        assert_eq!(fifos[0].len(), 1);
    }

    #[test]
    fn test_tile_pointer_wraps() {
        let lut = WeightLut::new(1, 256, 1, 1).unwrap(); // 2 tiles
        assert_eq!(lut.out_tiles(), 2);

        let (mut fifos, _, fb, mut pea) = setup();
        fifos[0].push(Entry::new(5, 0));
        let mut iwp = InputWeightProvider::new();
        assert_eq!(iwp.cur_out_tile(), 0);
        iwp.run(&mut fifos, &[false], 1, &lut, &fb, &mut pea, 1).unwrap();
        assert_eq!(iwp.cur_out_tile(), 1);
        pea.tick();
        iwp.run(&mut fifos, &[false], 1, &lut, &fb, &mut pea, 1).unwrap();
        assert_eq!(iwp.cur_out_tile(), 0);
    }
}

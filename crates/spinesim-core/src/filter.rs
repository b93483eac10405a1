//! Filter buffer: resident weight rows for the active output tile
//!
//! Rows are flattened as `(c_in * K_h + r) * K_w + c`, each holding one
//! `i8` weight per PE lane. DRAM layout per tile is
//! `[input_channel][kh][kw][0..128)`.

use std::collections::{HashMap, HashSet};

use crate::constants::{FILTER_ROWS, NUM_PE};
use crate::cost::MemTiming;
use crate::error::{CoreError, Result};
use spinesim_storage::SpineDram;

/// One weight row: 128 `i8` weights, one per PE lane
pub type Row = [i8; NUM_PE];

/// A resolved kernel tap: tile-local row id plus its decomposition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLookup {
    /// Tile-local row id
    pub row_id: usize,
    /// Input channel of the tap
    pub c_in: usize,
    /// Kernel row of the tap
    pub kh: usize,
    /// Kernel column of the tap
    pub kw: usize,
}

/// Static convolution geometry for one layer
#[derive(Debug, Clone, Copy)]
pub struct FilterGeometry {
    /// Input channels
    pub c_in: usize,
    /// Input width
    pub w_in: usize,
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
}

/// Fixed-capacity weight store with resident-tile ownership.
///
/// Exactly one tile is active at a time; reads through [`FilterBuffer::active_row`]
/// resolve against the active tile's base offset.
pub struct FilterBuffer {
    rows: Vec<Row>,
    geom: FilterGeometry,

    h_out_cur: usize,
    w_out_cur: usize,

    owned_tiles: HashSet<u32>,
    tile_base_row: HashMap<u32, usize>,
    active_tile: Option<u32>,

    timing: MemTiming,
}

impl FilterBuffer {
    /// Create a filter buffer for one layer's geometry
    pub fn new(geom: FilterGeometry) -> Result<Self> {
        if geom.c_in == 0 || geom.w_in == 0 || geom.k_h == 0 || geom.k_w == 0
            || geom.s_h == 0 || geom.s_w == 0
        {
            return Err(CoreError::invalid_config(
                "filter geometry has a zero dimension or stride",
            ));
        }
        Ok(Self {
            rows: vec![[0; NUM_PE]; FILTER_ROWS],
            geom,
            h_out_cur: 0,
            w_out_cur: 0,
            owned_tiles: HashSet::new(),
            tile_base_row: HashMap::new(),
            active_tile: None,
            timing: MemTiming {
                bw_bytes_per_cycle: 16,
                fixed_latency: 0,
                wire_entry_bytes: 1,
            },
        })
    }

    /// Override the DRAM load timing model
    pub fn set_timing(&mut self, timing: MemTiming) {
        self.timing = timing;
    }

    /// Rows one tile occupies: `C_in * K_h * K_w`
    pub fn rows_per_tile(&self) -> usize {
        self.geom.c_in * self.geom.k_h * self.geom.k_w
    }

    /// Set the current output site
    pub fn update(&mut self, h_out: usize, w_out: usize) {
        self.h_out_cur = h_out;
        self.w_out_cur = w_out;
    }

    /// Map an input neuron id to a tile-local row id using the current
    /// output site.
    ///
    /// Returns `None` for taps falling outside the kernel window (padding)
    /// and for rows beyond the storage bound; the caller drops the tap.
    pub fn compute_row_id(&self, neuron_id: u32) -> Option<usize> {
        self.resolve_row(neuron_id).map(|l| l.row_id)
    }

    /// As [`FilterBuffer::compute_row_id`], also returning the tap's
    /// `(c_in, kh, kw)` decomposition.
    pub fn resolve_row(&self, neuron_id: u32) -> Option<RowLookup> {
        let g = &self.geom;
        let c_in = neuron_id as usize % g.c_in;
        let pos = neuron_id as usize / g.c_in;
        let h_in = pos / g.w_in;
        let w_in = pos % g.w_in;

        let r = h_in as i64 - (self.h_out_cur as i64 * g.s_h as i64 - g.p_h as i64);
        let c = w_in as i64 - (self.w_out_cur as i64 * g.s_w as i64 - g.p_w as i64);
        if r < 0 || r >= g.k_h as i64 || c < 0 || c >= g.k_w as i64 {
            return None;
        }
        let (kh, kw) = (r as usize, c as usize);

        let row_id = (c_in * g.k_h + kh) * g.k_w + kw;
        (row_id < FILTER_ROWS).then_some(RowLookup { row_id, c_in, kh, kw })
    }

    /// Read a row of the active tile by tile-local row id
    pub fn active_row(&self, local_row_id: usize) -> Result<Row> {
        let base = self.active_base_row();
        self.row(base + local_row_id)
    }

    /// Read a row by global storage id (used by the LUT-driven weight path)
    pub fn row(&self, row_id: usize) -> Result<Row> {
        self.rows
            .get(row_id)
            .copied()
            .ok_or_else(|| CoreError::invariant("filter_buffer", format!("row {row_id} out of range")))
    }

    /// Currently active tile, if weights have been loaded
    pub fn active_tile(&self) -> Option<u32> {
        self.active_tile
    }

    /// Load weights for `tile_id`, greedily pulling following tiles until
    /// storage capacity is reached.
    ///
    /// An already-resident tile is only re-activated: no bytes move and no
    /// cycles are charged. Returns `(bytes_loaded, cycles)`.
    pub fn load_weights(
        &mut self,
        dram: &SpineDram,
        layer_id: u32,
        tile_id: u32,
        total_tiles: u32,
    ) -> Result<(u32, u64)> {
        if self.owned_tiles.contains(&tile_id) {
            self.active_tile = Some(tile_id);
            return Ok((0, 0));
        }

        self.owned_tiles.clear();
        self.tile_base_row.clear();
        self.active_tile = None;

        let rows_per_tile = self.rows_per_tile();
        if rows_per_tile == 0 || rows_per_tile > FILTER_ROWS {
            return Err(CoreError::invalid_config(format!(
                "rows per tile {rows_per_tile} does not fit {FILTER_ROWS} filter rows"
            )));
        }

        let tile_bytes = rows_per_tile * NUM_PE;
        let mut scratch = vec![0u8; tile_bytes];
        let mut base = 0usize;
        let mut total_bytes: u64 = 0;

        let mut tile = tile_id;
        while tile < total_tiles && base + rows_per_tile <= FILTER_ROWS {
            if !dram.has_weight_tile(layer_id, tile) {
                break;
            }
            let n = dram.load_weight_tile(layer_id, tile, &mut scratch)?;
            for (i, chunk) in scratch[..n].chunks(NUM_PE).enumerate() {
                let row = &mut self.rows[base + i];
                *row = [0; NUM_PE];
                for (lane, &b) in chunk.iter().enumerate() {
                    row[lane] = b as i8;
                }
            }
            // rows past the loaded bytes stay zero
            for i in n.div_ceil(NUM_PE)..rows_per_tile {
                self.rows[base + i] = [0; NUM_PE];
            }

            self.owned_tiles.insert(tile);
            self.tile_base_row.insert(tile, base);
            total_bytes += n as u64;
            base += rows_per_tile;
            tile += 1;
        }

        if !self.owned_tiles.contains(&tile_id) {
            return Err(CoreError::Storage {
                source: spinesim_storage::StorageError::TileNotFound { layer: layer_id, tile: tile_id },
            });
        }

        self.active_tile = Some(tile_id);
        let cycles = self.timing.cycles_for_bytes(total_bytes);
        log::debug!(
            "FB tile load: tiles {}..{} from tile {tile_id}, {total_bytes} bytes, {cycles} cycles",
            tile_id,
            tile,
        );
        Ok((total_bytes as u32, cycles))
    }

    fn active_base_row(&self) -> usize {
        self.active_tile
            .and_then(|t| self.tile_base_row.get(&t).copied())
            .unwrap_or(0)
    }
}

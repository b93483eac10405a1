//! Lookup table mapping kernel taps to filter-buffer rows
//!
//! Row indexing over the tiled DRAM layout `[out_ch / 128][in_c][kh*kw][lane]`:
//!
//! ```text
//! rows_per_tile = C_in * K_h * K_w
//! base          = in_c * (K_h * K_w) + ky * K_w + kx
//! row_id        = out_tile * rows_per_tile + base
//! ```
//!
//! The tile-agnostic `base` doubles as the stable neuron id carried by
//! entries on the clocked pipeline's weight path.

use crate::constants::NUM_PE;
use crate::error::{CoreError, Result};

/// Geometry-derived row lookup for one layer
#[derive(Debug, Clone, Copy)]
pub struct WeightLut {
    in_c: u16,
    out_c: u16,
    k_h: u8,
    k_w: u8,
    out_tiles: u16,
    rows_per_tile: u32,
}

impl WeightLut {
    /// Build the LUT for one convolution layer
    pub fn new(in_c: u16, out_c: u16, k_h: u8, k_w: u8) -> Result<Self> {
        if in_c == 0 || out_c == 0 || k_h == 0 || k_w == 0 {
            return Err(CoreError::invalid_config("weight LUT geometry has a zero field"));
        }
        let rows_per_tile = in_c as u32 * k_h as u32 * k_w as u32;
        let out_tiles = (out_c as u32).div_ceil(NUM_PE as u32) as u16;
        Ok(Self { in_c, out_c, k_h, k_w, out_tiles, rows_per_tile })
    }

    /// Output tiles: `ceil(C_out / 128)`
    pub fn out_tiles(&self) -> u16 {
        self.out_tiles
    }

    /// Rows per tile: `C_in * K_h * K_w`
    pub fn rows_per_tile(&self) -> u32 {
        self.rows_per_tile
    }

    /// Stable, tile-agnostic neuron id for a kernel tap
    pub fn neuron_id(&self, ky: u8, kx: u8, in_c: u16) -> Result<u32> {
        self.check_tap(ky, kx, in_c)?;
        Ok(in_c as u32 * (self.k_h as u32 * self.k_w as u32)
            + ky as u32 * self.k_w as u32
            + kx as u32)
    }

    /// Global filter-buffer row for a kernel tap in a given output tile
    pub fn row_id(&self, ky: u8, kx: u8, in_c: u16, out_tile: u16) -> Result<u32> {
        self.check_tile(out_tile)?;
        Ok(out_tile as u32 * self.rows_per_tile + self.neuron_id(ky, kx, in_c)?)
    }

    /// Recover the global row for a tap neuron id in a given output tile
    pub fn row_id_from_neuron(&self, neuron_id: u32, out_tile: u16) -> Result<u32> {
        self.check_tile(out_tile)?;
        if neuron_id >= self.rows_per_tile {
            return Err(CoreError::invariant(
                "weight_lut",
                format!("neuron id {neuron_id} outside {} rows per tile", self.rows_per_tile),
            ));
        }
        Ok(out_tile as u32 * self.rows_per_tile + neuron_id)
    }

    /// Which PE lane an absolute output channel lands on
    pub fn lane_of(out_c: u32) -> u16 {
        (out_c % NUM_PE as u32) as u16
    }

    /// Which tile an absolute output channel belongs to
    pub fn tile_of(out_c: u32) -> u16 {
        (out_c / NUM_PE as u32) as u16
    }

    fn check_tap(&self, ky: u8, kx: u8, in_c: u16) -> Result<()> {
        if ky >= self.k_h || kx >= self.k_w || in_c >= self.in_c {
            return Err(CoreError::invariant(
                "weight_lut",
                format!("tap ({ky},{kx},c{in_c}) outside {}x{} kernel / {} channels",
                    self.k_h, self.k_w, self.in_c),
            ));
        }
        Ok(())
    }

    fn check_tile(&self, out_tile: u16) -> Result<()> {
        if out_tile >= self.out_tiles {
            return Err(CoreError::invariant(
                "weight_lut",
                format!("out tile {out_tile} outside {} tiles", self.out_tiles),
            ));
        }
        Ok(())
    }
}

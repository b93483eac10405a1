//! Flat byte-array DRAM model with per-layer metadata tables
//!
//! DRAM is modeled as an in-memory byte slab; there is no true DRAM timing
//! here. Latency accounting happens on the accelerator side by converting
//! transferred byte counts into cycles.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, StorageError};
use crate::Entry;

/// Location of one input spine inside the DRAM space
#[derive(Debug, Clone, Copy)]
pub struct SpineMeta {
    /// Logical spine id
    pub id: u32,
    /// Byte address in DRAM space
    pub addr: u64,
    /// Size in bytes
    pub size: u32,
}

/// Location of one weight tile inside the DRAM space
#[derive(Debug, Clone, Copy)]
pub struct WeightTileMeta {
    /// Tile id
    pub tile: u32,
    /// Byte address in DRAM space
    pub addr: u64,
    /// Size in bytes
    pub size: u32,
}

/// Per-layer metadata: spine/tile tables plus the output reservation
#[derive(Debug, Clone, Default)]
pub struct LayerMeta {
    /// Input spine table keyed by logical spine id
    pub input_spines: HashMap<u32, SpineMeta>,
    /// Weight tile table keyed by tile id
    pub weight_tiles: HashMap<u32, WeightTileMeta>,
    /// First byte of the reserved output region
    pub output_region_begin: u64,
    /// Exclusive end of the reserved output region
    pub output_region_end: u64,
    /// Next byte to write in the output region
    pub output_write_ptr: u64,
    /// Segments appended so far, keyed by output spine id
    pub output_segments: HashMap<u32, Vec<SpineMeta>>,
}

#[derive(Deserialize)]
struct AddrSizeJson {
    addr: u64,
    size: u32,
}

#[derive(Deserialize)]
struct LayerMetaJson {
    #[serde(rename = "L")]
    layer: u32,
    #[serde(default)]
    input_spines: HashMap<String, AddrSizeJson>,
    #[serde(default)]
    weight_tiles: HashMap<String, AddrSizeJson>,
    #[serde(default)]
    output_region_begin: u64,
    #[serde(default)]
    output_region_end: u64,
    output_write_ptr: Option<u64>,
}

#[derive(Deserialize)]
struct DramMetaJson {
    layers: Vec<LayerMetaJson>,
}

/// In-memory DRAM image plus per-layer lookup tables
#[derive(Debug)]
pub struct SpineDram {
    mem: Vec<u8>,
    layers: HashMap<u32, LayerMeta>,
}

impl SpineDram {
    /// Create a zero-filled DRAM of `total_bytes` capacity
    pub fn new(total_bytes: u64) -> Self {
        Self {
            mem: vec![0; total_bytes as usize],
            layers: HashMap::new(),
        }
    }

    /// Bulk-load a raw image (no headers) into the start of the DRAM space
    pub fn load_raw_image(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > self.mem.len() {
            return Err(StorageError::OutOfRange {
                addr: 0,
                len: image.len() as u64,
                capacity: self.mem.len() as u64,
            });
        }
        self.mem[..image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Build per-layer metadata tables from a metadata JSON string.
    ///
    /// Layers already installed under the same id are overwritten.
    pub fn build_from_json(&mut self, json_text: &str) -> Result<()> {
        let parsed: DramMetaJson = serde_json::from_str(json_text)?;
        for jl in parsed.layers {
            let mut meta = LayerMeta {
                output_region_begin: jl.output_region_begin,
                output_region_end: jl.output_region_end,
                output_write_ptr: jl.output_write_ptr.unwrap_or(jl.output_region_begin),
                ..Default::default()
            };
            for (key, v) in jl.input_spines {
                let spine_id: u32 = key.parse().map_err(|_| {
                    StorageError::invalid_format(format!("non-numeric spine id key '{key}'"))
                })?;
                meta.input_spines.insert(
                    spine_id,
                    SpineMeta { id: spine_id, addr: v.addr, size: v.size },
                );
            }
            for (key, v) in jl.weight_tiles {
                let tile_id: u32 = key.parse().map_err(|_| {
                    StorageError::invalid_format(format!("non-numeric tile id key '{key}'"))
                })?;
                meta.weight_tiles.insert(
                    tile_id,
                    WeightTileMeta { tile: tile_id, addr: v.addr, size: v.size },
                );
            }
            self.set_layer_meta(jl.layer, meta)?;
        }
        Ok(())
    }

    /// Convenience factory: read an image file and metadata JSON from disk
    pub fn from_files(bin_path: impl AsRef<Path>, json_path: impl AsRef<Path>) -> Result<Self> {
        let image = std::fs::read(bin_path)?;
        let json_text = std::fs::read_to_string(json_path)?;
        let mut dram = Self::new(image.len() as u64);
        dram.load_raw_image(&image)?;
        dram.build_from_json(&json_text)?;
        log::info!(
            "DRAM image loaded: {} bytes, {} layers",
            dram.mem.len(),
            dram.layers.len()
        );
        Ok(dram)
    }

    /// Install or replace metadata for one layer
    pub fn set_layer_meta(&mut self, layer: u32, meta: LayerMeta) -> Result<()> {
        if meta.output_write_ptr < meta.output_region_begin
            || meta.output_write_ptr > meta.output_region_end
        {
            return Err(StorageError::invalid_format(format!(
                "layer {layer}: output write ptr {:#x} outside region [{:#x}, {:#x})",
                meta.output_write_ptr, meta.output_region_begin, meta.output_region_end
            )));
        }
        self.layers.insert(layer, meta);
        Ok(())
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.mem.len() as u64
    }

    /// Borrow the raw image bytes
    pub fn image(&self) -> &[u8] {
        &self.mem
    }

    fn layer(&self, layer: u32) -> Result<&LayerMeta> {
        self.layers
            .get(&layer)
            .ok_or(StorageError::LayerNotFound { layer })
    }

    /// Read an input spine by logical id, copying at most `dst.len()` bytes.
    ///
    /// Returns the number of bytes copied (the spine may be shorter than the
    /// destination buffer).
    pub fn load_input_spine(&self, layer: u32, spine: u32, dst: &mut [u8]) -> Result<usize> {
        let meta = self.layer(layer)?;
        let sm = meta
            .input_spines
            .get(&spine)
            .ok_or(StorageError::SpineNotFound { layer, spine })?;
        let n = (sm.size as usize).min(dst.len());
        let src = self.read(sm.addr, n as u64)?;
        dst[..n].copy_from_slice(src);
        Ok(n)
    }

    /// Read a weight tile by tile id, copying at most `dst.len()` bytes
    pub fn load_weight_tile(&self, layer: u32, tile: u32, dst: &mut [u8]) -> Result<usize> {
        let meta = self.layer(layer)?;
        let wm = meta
            .weight_tiles
            .get(&tile)
            .ok_or(StorageError::TileNotFound { layer, tile })?;
        let n = (wm.size as usize).min(dst.len());
        let src = self.read(wm.addr, n as u64)?;
        dst[..n].copy_from_slice(src);
        Ok(n)
    }

    /// Whether a layer declares the given weight tile
    pub fn has_weight_tile(&self, layer: u32, tile: u32) -> bool {
        self.layers
            .get(&layer)
            .map(|m| m.weight_tiles.contains_key(&tile))
            .unwrap_or(false)
    }

    /// Append one output spine to the layer's output region.
    ///
    /// Returns the number of bytes written. The write is recorded as a
    /// segment under `spine` so stored output can be located later.
    pub fn store_output_spine(&mut self, layer: u32, spine: u32, bytes: &[u8]) -> Result<u32> {
        let meta = self
            .layers
            .get_mut(&layer)
            .ok_or(StorageError::LayerNotFound { layer })?;
        let len = bytes.len() as u64;
        if meta.output_write_ptr + len > meta.output_region_end {
            return Err(StorageError::OutputRegionFull {
                layer,
                write_ptr: meta.output_write_ptr,
                len,
                region_end: meta.output_region_end,
            });
        }
        let addr = meta.output_write_ptr;
        meta.output_write_ptr += len;
        meta.output_segments.entry(spine).or_default().push(SpineMeta {
            id: spine,
            addr,
            size: bytes.len() as u32,
        });
        self.write(addr, bytes)?;
        Ok(bytes.len() as u32)
    }

    /// Decode every entry stored for one output spine, in append order
    pub fn output_entries(&self, layer: u32, spine: u32) -> Result<Vec<Entry>> {
        let meta = self.layer(layer)?;
        let mut out = Vec::new();
        if let Some(segments) = meta.output_segments.get(&spine) {
            for seg in segments {
                let bytes = self.read(seg.addr, seg.size as u64)?;
                out.extend(Entry::decode_stream(bytes)?);
            }
        }
        Ok(out)
    }

    fn read(&self, addr: u64, len: u64) -> Result<&[u8]> {
        let end = addr.checked_add(len).ok_or(StorageError::OutOfRange {
            addr,
            len,
            capacity: self.mem.len() as u64,
        })?;
        if end > self.mem.len() as u64 {
            return Err(StorageError::OutOfRange {
                addr,
                len,
                capacity: self.mem.len() as u64,
            });
        }
        Ok(&self.mem[addr as usize..end as usize])
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<()> {
        let end = addr + bytes.len() as u64;
        if end > self.mem.len() as u64 {
            return Err(StorageError::OutOfRange {
                addr,
                len: bytes.len() as u64,
                capacity: self.mem.len() as u64,
            });
        }
        self.mem[addr as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }
}

//! Convolution layer driver

use spinesim_core::constants::{MAX_BATCHES, NUM_PE, PHYS_LANES, TILES_PER_SPINE};
use spinesim_core::{Core, CoreParams};
use spinesim_storage::SpineDram;

use crate::config::LayerSpec;
use crate::error::{ModelError, Result};
use crate::network::{drive_core_sites, LayerReport, RunOptions};

/// Drives one convolution layer over all `(h_out, w_out)` sites.
///
/// Each site's receptive window maps to the logical input spines under its
/// kernel taps; those spine ids are split into ISB-sized batches and streamed
/// through the core.
pub struct ConvLayer {
    spec: LayerSpec,
    h_out: usize,
    w_out: usize,
    total_tiles: usize,
    core: Core,
}

pub(crate) fn conv_batches(spec: &LayerSpec, h_out: usize, w_out: usize) -> Vec<Vec<u32>> {
    let s = spec;
    let mut spine_ids = Vec::with_capacity(s.k_h * s.k_w);
    for r in 0..s.k_h {
        for c in 0..s.k_w {
            let h_in = h_out as i64 * s.s_h as i64 - s.p_h as i64 + r as i64;
            let w_in = w_out as i64 * s.s_w as i64 - s.p_w as i64 + c as i64;
            if h_in < 0 || h_in >= s.h_in as i64 || w_in < 0 || w_in >= s.w_in as i64 {
                continue;
            }
            spine_ids.push((h_in * s.w_in as i64 + w_in) as u32);
        }
    }

    let batches_needed = (s.k_h * s.k_w).div_ceil(PHYS_LANES).max(1);
    let mut batches = vec![Vec::new(); batches_needed];
    for (i, chunk) in spine_ids.chunks(PHYS_LANES).enumerate() {
        batches[i] = chunk.to_vec();
    }
    batches
}

fn derive_out_dim(layer: i64, input: usize, pad: usize, kernel: usize, stride: usize) -> Result<usize> {
    let numer = input as i64 + 2 * pad as i64 - kernel as i64;
    if numer < 0 || numer % stride as i64 != 0 {
        return Err(ModelError::config(
            layer,
            format!("invalid shape: ({input} + 2*{pad} - {kernel}) not divisible by stride {stride}"),
        ));
    }
    Ok((numer / stride as i64) as usize + 1)
}

impl ConvLayer {
    /// Validate the spec, derive output geometry and build the core
    pub fn new(spec: &LayerSpec) -> Result<Self> {
        let l = spec.layer_id as i64;
        let h_out = derive_out_dim(l, spec.h_in, spec.p_h, spec.k_h, spec.s_h)?;
        let w_out = derive_out_dim(l, spec.w_in, spec.p_w, spec.k_w, spec.s_w)?;

        if let Some((c, h, w)) = spec.declared_out {
            if (c, h, w) != (spec.c_out, h_out, w_out) {
                log::warn!(
                    "layer {}: declared output {}x{}x{} differs from derived {}x{}x{}",
                    spec.layer_id, c, h, w, spec.c_out, h_out, w_out
                );
            }
        }

        let total_tiles = spec.c_out.div_ceil(NUM_PE);
        if total_tiles > TILES_PER_SPINE {
            return Err(ModelError::config(
                l,
                format!("{total_tiles} output tiles exceed the {TILES_PER_SPINE} tile buffers"),
            ));
        }

        let kernel_slots = spec.k_h * spec.k_w;
        let batches_needed = kernel_slots.div_ceil(PHYS_LANES).max(1);
        if batches_needed > MAX_BATCHES {
            return Err(ModelError::config(
                l,
                format!("{batches_needed} input batches exceed the {MAX_BATCHES} intermediate FIFOs"),
            ));
        }

        let core = Core::new(CoreParams {
            layer_id: spec.layer_id,
            c_in: spec.c_in,
            c_out: spec.c_out,
            h_in: spec.h_in,
            w_in: spec.w_in,
            h_out,
            w_out,
            k_h: spec.k_h,
            k_w: spec.k_w,
            s_h: spec.s_h,
            s_w: spec.s_w,
            p_h: spec.p_h,
            p_w: spec.p_w,
            threshold: spec.threshold,
            total_tiles,
        })?;

        Ok(Self {
            spec: spec.clone(),
            h_out,
            w_out,
            total_tiles,
            core,
        })
    }

    /// Derived output height
    pub fn h_out(&self) -> usize {
        self.h_out
    }

    /// Derived output width
    pub fn w_out(&self) -> usize {
        self.w_out
    }

    /// Output tiles for this layer
    pub fn total_tiles(&self) -> usize {
        self.total_tiles
    }

    /// Input spine batches for one output site.
    ///
    /// Taps falling outside the input (padding) contribute no spine id; the
    /// batch count still follows the kernel slot count, so trailing batches
    /// may be empty.
    pub fn generate_batches(&self, h_out: usize, w_out: usize) -> Vec<Vec<u32>> {
        conv_batches(&self.spec, h_out, w_out)
    }

    /// Run the layer across every output site
    pub fn run_layer(&mut self, dram: &mut SpineDram, opts: &RunOptions) -> Result<LayerReport> {
        log::info!(
            "running conv layer {} ({}): {}x{}x{} -> {}x{}x{}, {}x{} kernel, {} tiles",
            self.spec.layer_id, self.spec.name,
            self.spec.c_in, self.spec.h_in, self.spec.w_in,
            self.spec.c_out, self.h_out, self.w_out,
            self.spec.k_h, self.spec.k_w, self.total_tiles
        );
        let spec = self.spec.clone();
        let (h_out, w_out, total_tiles) = (self.h_out, self.w_out, self.total_tiles);
        drive_core_sites(
            &mut self.core,
            dram,
            &spec,
            h_out,
            w_out,
            total_tiles,
            opts,
            |h, w| conv_batches(&spec, h, w),
        )
    }

    /// Borrow the core, e.g. to inspect statistics
    pub fn core(&self) -> &Core {
        &self.core
    }

    /// Mutably borrow the core, e.g. to attach a cache model
    pub fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }
}

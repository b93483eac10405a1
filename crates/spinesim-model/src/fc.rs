//! Fully-connected layer driver
//!
//! An FC layer treats the whole input plane as one receptive field: every
//! logical spine participates at every site, and the same batch table is
//! reused for all sites.

use spinesim_core::constants::{MAX_BATCHES, NUM_PE, PHYS_LANES, TILES_PER_SPINE};
use spinesim_core::{Core, CoreParams};
use spinesim_storage::SpineDram;

use crate::config::LayerSpec;
use crate::error::{ModelError, Result};
use crate::network::{drive_core_sites, LayerReport, RunOptions};

/// Drives one fully-connected layer
pub struct FcLayer {
    spec: LayerSpec,
    h_out: usize,
    w_out: usize,
    total_tiles: usize,
    batches: Vec<Vec<u32>>,
    core: Core,
}

fn derive_out_dim(layer: i64, input: usize, pad: usize, kernel: usize, stride: usize) -> Result<usize> {
    let numer = input as i64 + 2 * pad as i64 - kernel as i64;
    if numer < 0 {
        return Err(ModelError::config(
            layer,
            format!("invalid shape: {input} + 2*{pad} < kernel {kernel}"),
        ));
    }
    Ok((numer / stride as i64) as usize + 1)
}

impl FcLayer {
    /// Validate the spec, derive geometry and build the core
    pub fn new(spec: &LayerSpec) -> Result<Self> {
        let l = spec.layer_id as i64;
        let h_out = derive_out_dim(l, spec.h_in, spec.p_h, spec.k_h, spec.s_h)?;
        let w_out = derive_out_dim(l, spec.w_in, spec.p_w, spec.k_w, spec.s_w)?;

        let total_tiles = spec.c_out.div_ceil(NUM_PE);
        if total_tiles > TILES_PER_SPINE {
            return Err(ModelError::config(
                l,
                format!("{total_tiles} output tiles exceed the {TILES_PER_SPINE} tile buffers"),
            ));
        }

        let total_spines = spec.h_in * spec.w_in;
        let batches_needed = total_spines.div_ceil(PHYS_LANES).max(1);
        if batches_needed > MAX_BATCHES {
            return Err(ModelError::config(
                l,
                format!(
                    "{total_spines} input spines need {batches_needed} batches, exceeding the {MAX_BATCHES} FIFOs"
                ),
            ));
        }

        let spine_ids: Vec<u32> = (0..total_spines as u32).collect();
        let batches: Vec<Vec<u32>> = spine_ids
            .chunks(PHYS_LANES)
            .map(|chunk| chunk.to_vec())
            .collect();

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
            batches,
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

    /// The batch table shared by every site
    pub fn batches(&self) -> &[Vec<u32>] {
        &self.batches
    }

    /// Run the layer across every output site
    pub fn run_layer(&mut self, dram: &mut SpineDram, opts: &RunOptions) -> Result<LayerReport> {
        log::info!(
            "running fc layer {} ({}): {}x{}x{} -> {} outputs, {} tiles",
            self.spec.layer_id, self.spec.name,
            self.spec.c_in, self.spec.h_in, self.spec.w_in,
            self.spec.c_out, self.total_tiles
        );
        let spec = self.spec.clone();
        let batches = self.batches.clone();
        let (h_out, w_out, total_tiles) = (self.h_out, self.w_out, self.total_tiles);
        drive_core_sites(
            &mut self.core,
            dram,
            &spec,
            h_out,
            w_out,
            total_tiles,
            opts,
            |_, _| batches.clone(),
        )
    }

    /// Mutably borrow the core
    pub fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayerKind, WeightQuant};

    fn fc_spec(h_in: usize, w_in: usize) -> LayerSpec {
        LayerSpec {
            layer_id: 5,
            name: "fc".into(),
            kind: LayerKind::Fc,
            c_in: 16,
            h_in,
            w_in,
            c_out: 10,
            k_h: h_in,
            k_w: w_in,
            s_h: 1,
            s_w: 1,
            p_h: 0,
            p_w: 0,
            declared_out: None,
            threshold: 1,
            weight_quant: WeightQuant::default(),
        }
    }

    #[test]
    fn test_single_site_geometry() {
        let layer = FcLayer::new(&fc_spec(2, 2)).unwrap();
        assert_eq!((layer.h_out(), layer.w_out()), (1, 1));
        assert_eq!(layer.batches().len(), 1);
        assert_eq!(layer.batches()[0], vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_batches_split_over_lanes() {
        let layer = FcLayer::new(&fc_spec(5, 5)).unwrap();
        // 25 spines over 16 lanes
        assert_eq!(layer.batches().len(), 2);
        assert_eq!(layer.batches()[0].len(), 16);
        assert_eq!(layer.batches()[1].len(), 9);
    }

    #[test]
    fn test_too_many_spines_rejected() {
        // 9*9 = 81 spines -> 6 batches > 4 FIFOs
        assert!(FcLayer::new(&fc_spec(9, 9)).is_err());
    }
}

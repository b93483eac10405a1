//! Global merger: smallest live entry across all batch FIFOs

use crate::fifo::IntermediateFifo;
use spinesim_storage::Entry;

/// Stateless picker over the per-batch FIFO heads.
///
/// The readiness gate guarantees minimality: a pick only happens when every
/// batch that is not yet totally drained has a head available, so no smaller
/// entry can still be hiding upstream.
pub struct GlobalMerger;

impl GlobalMerger {
    /// Whether the merger may pick this tick: every non-drained batch is
    /// primed and at least one such batch exists.
    pub fn can_work(
        fifos: &[IntermediateFifo],
        totally_drained: &[bool],
        batches_needed: usize,
    ) -> bool {
        let mut any_live = false;
        for b in 0..batches_needed {
            if totally_drained[b] {
                continue;
            }
            any_live = true;
            if fifos[b].empty() {
                return false;
            }
        }
        any_live
    }

    /// Pick and pop the globally smallest `(ts, neuron_id)` head.
    ///
    /// Ties break toward the lower batch index. Returns `None` when the gate
    /// fails or every FIFO is empty.
    pub fn pick(
        fifos: &mut [IntermediateFifo],
        totally_drained: &[bool],
        batches_needed: usize,
    ) -> Option<Entry> {
        if !Self::can_work(fifos, totally_drained, batches_needed) {
            return None;
        }

        let mut best: Option<(usize, Entry)> = None;
        for (idx, fifo) in fifos.iter().enumerate().take(batches_needed) {
            if let Some(head) = fifo.front() {
                match best {
                    Some((_, best_entry)) if head >= best_entry => {}
                    _ => best = Some((idx, head)),
                }
            }
        }

        let (idx, entry) = best?;
        fifos[idx].pop();
        Some(entry)
    }
}

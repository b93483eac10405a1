//! Smallest-timestamp picker: the stage-1 accumulator pool
//!
//! Sits between the PE array and the output queue. While its pool is
//! non-empty it holds the single `st1_st2_valid` handshake bit low, stalling
//! stage-2 writes; once drained it reopens the gate.

use crate::clock::PipelineSignals;
use crate::output_queue::OutputQueue;
use spinesim_storage::Entry;

/// Accumulator pool emitting entries in ascending `(ts, neuron_id)` order
pub struct SmallestTsPicker {
    entries: Vec<Entry>,
    per_cycle_budget: usize,
}

impl Default for SmallestTsPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl SmallestTsPicker {
    /// Create an empty picker with an unbounded per-cycle budget
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            per_cycle_budget: usize::MAX,
        }
    }

    /// Limit how many entries one tick may forward downstream
    pub fn set_per_cycle_budget(&mut self, budget: usize) {
        self.per_cycle_budget = budget;
    }

    /// Drop all pooled entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pooled entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Stage-2 write: accepted only while the handshake gate is open
    pub fn stage2_write(&mut self, signals: &PipelineSignals, e: Entry) -> bool {
        if !signals.st1_st2_valid {
            return false;
        }
        self.entries.push(e);
        true
    }

    /// One stage-1 tick: manage the handshake and forward minimal entries
    /// into the output queue.
    ///
    /// Returns `true` if anything was forwarded or the gate changed state.
    pub fn run(&mut self, signals: &mut PipelineSignals, out_q: &mut OutputQueue) -> bool {
        let mut progressed = false;

        if !self.entries.is_empty() && signals.st1_st2_valid {
            signals.st1_st2_valid = false;
            progressed = true;
        }

        let mut sent = 0;
        while sent < self.per_cycle_budget && !self.entries.is_empty() && !out_q.full() {
            let e = self.pop_smallest();
            if !out_q.push_entry(e) {
                // queue filled up under us; keep the entry for next tick
                self.entries.push(e);
                break;
            }
            sent += 1;
            progressed = true;
        }

        let open = self.entries.is_empty();
        if signals.st1_st2_valid != open {
            signals.st1_st2_valid = open;
            progressed = true;
        }

        progressed
    }

    fn pop_smallest(&mut self) -> Entry {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| **e)
            .map(|(i, _)| i)
            .expect("pool checked non-empty");
        self.entries.swap_remove(idx)
    }
}

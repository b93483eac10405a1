//! Memory-bandwidth cost accounting
//!
//! Functional progress and cycle cost are kept apart: stages move entries,
//! while these helpers convert transferred bytes into cycles so the
//! controller can account them.

use spinesim_storage::Entry;

/// Bandwidth model for one DRAM transfer path
#[derive(Debug, Clone, Copy)]
pub struct MemTiming {
    /// Bytes the bus moves per cycle
    pub bw_bytes_per_cycle: u32,
    /// Fixed per-transaction latency in cycles
    pub fixed_latency: u32,
    /// On-wire width of one entry
    pub wire_entry_bytes: u32,
}

impl Default for MemTiming {
    fn default() -> Self {
        Self {
            bw_bytes_per_cycle: 16,
            fixed_latency: 0,
            wire_entry_bytes: Entry::WIRE_BYTES as u32,
        }
    }
}

impl MemTiming {
    /// Cycles to move `bytes` over this path
    pub fn cycles_for_bytes(&self, bytes: u64) -> u64 {
        let bw = self.bw_bytes_per_cycle.max(1) as u64;
        bytes.div_ceil(bw) + self.fixed_latency as u64
    }

    /// Cycles to move `entries` wire-encoded entries
    pub fn cycles_for_entries(&self, entries: u64) -> u64 {
        self.cycles_for_bytes(entries * self.wire_entry_bytes.max(1) as u64)
    }
}

/// Result of charging a load against accumulated compute credit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCost {
    /// Cycles the pipeline actually blocks for
    pub block_cycles: u64,
    /// Credit consumed to hide the rest of the load
    pub credit_used: u64,
}

/// Compute-shadow credit: compute ticks accumulate credit that hides part of
/// the next in-step input load behind already-spent compute time.
#[derive(Debug, Clone, Default)]
pub struct IoShadow {
    credit: u64,
}

impl IoShadow {
    /// Create with zero credit
    pub fn new() -> Self {
        Self::default()
    }

    /// Record compute cycles that can shadow a future load
    pub fn on_compute_cycles(&mut self, cycles: u64) {
        self.credit += cycles;
    }

    /// Charge a load of `load_cycles`, consuming credit first.
    ///
    /// The consumed credit is removed; leftover credit survives for the next
    /// load.
    pub fn apply_load_cycles(&mut self, load_cycles: u64) -> LoadCost {
        let credit_used = self.credit.min(load_cycles);
        self.credit -= credit_used;
        LoadCost {
            block_cycles: load_cycles - credit_used,
            credit_used,
        }
    }

    /// Credit currently banked
    pub fn credit(&self) -> u64 {
        self.credit
    }

    /// Drop all banked credit
    pub fn reset(&mut self) {
        self.credit = 0;
    }
}

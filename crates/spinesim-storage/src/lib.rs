//! DRAM image model and binary spine formats for the spinesim simulator
//!
//! This crate provides the memory-side infrastructure the accelerator core is
//! simulated against: a flat byte-array DRAM with per-layer metadata tables,
//! the segmented spine wire formats (fixed-stride and packed), and stream
//! readers/writers over segmented images.

#![deny(missing_docs)]
#![warn(clippy::all)]

use core::fmt;

/// One spike event: a logical timestamp plus the neuron that fired.
///
/// Comparison order everywhere in the simulator is lexicographic
/// `(ts, neuron_id)` ascending; the derive relies on field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entry {
    /// Logical timestamp (not a cycle count)
    pub ts: u8,
    /// Identifier of the neuron that fired
    pub neuron_id: u32,
}

impl Entry {
    /// On-wire width: `ts: u8` followed by `neuron_id: u32` little-endian.
    pub const WIRE_BYTES: usize = 5;

    /// Create a new entry
    pub const fn new(ts: u8, neuron_id: u32) -> Self {
        Self { ts, neuron_id }
    }

    /// Encode into the 5-byte wire representation
    pub fn to_wire(&self) -> [u8; Self::WIRE_BYTES] {
        let nid = self.neuron_id.to_le_bytes();
        [self.ts, nid[0], nid[1], nid[2], nid[3]]
    }

    /// Decode one entry from the start of `bytes`
    pub fn from_wire(bytes: &[u8]) -> error::Result<Self> {
        if bytes.len() < Self::WIRE_BYTES {
            return Err(error::StorageError::invalid_format(format!(
                "entry needs {} bytes, got {}",
                Self::WIRE_BYTES,
                bytes.len()
            )));
        }
        Ok(Self {
            ts: bytes[0],
            neuron_id: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        })
    }

    /// Decode a contiguous run of wire-format entries.
    ///
    /// The byte length must be an exact multiple of [`Entry::WIRE_BYTES`].
    pub fn decode_stream(bytes: &[u8]) -> error::Result<Vec<Entry>> {
        if bytes.len() % Self::WIRE_BYTES != 0 {
            return Err(error::StorageError::invalid_format(format!(
                "entry stream length {} is not a multiple of {}",
                bytes.len(),
                Self::WIRE_BYTES
            )));
        }
        bytes.chunks_exact(Self::WIRE_BYTES).map(Entry::from_wire).collect()
    }

    /// Encode a run of entries into wire bytes
    pub fn encode_stream(entries: &[Entry]) -> Vec<u8> {
        let mut out = Vec::with_capacity(entries.len() * Self::WIRE_BYTES);
        for e in entries {
            out.extend_from_slice(&e.to_wire());
        }
        out
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, n{})", self.ts, self.neuron_id)
    }
}

// Core modules
pub mod directory;
pub mod dram;
pub mod error;
pub mod format;
pub mod segment;
pub mod stream;

// Re-export essential types
pub use directory::{LayerDirectory, Region};
pub use dram::{LayerMeta, SpineDram, SpineMeta, WeightTileMeta};
pub use error::{Result, StorageError};
pub use format::DramFormat;
pub use segment::{SegKind, SegmentHeader};
pub use stream::{StreamReader, StreamWriter, WeightMatchPolicy};

/// Storage crate version for compatibility checking
pub const STORAGE_VERSION: u32 = 1;

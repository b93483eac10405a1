//! Error types for the storage layer

use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Layer id not present in the DRAM metadata tables
    #[error("Layer {layer} not found in DRAM metadata")]
    LayerNotFound {
        /// Layer id that was not found
        layer: u32,
    },

    /// Input spine id not present in a layer's table
    #[error("Input spine {spine} not found in layer {layer}")]
    SpineNotFound {
        /// Layer id
        layer: u32,
        /// Spine id that was not found
        spine: u32,
    },

    /// Weight tile id not present in a layer's table
    #[error("Weight tile {tile} not found in layer {layer}")]
    TileNotFound {
        /// Layer id
        layer: u32,
        /// Tile id that was not found
        tile: u32,
    },

    /// Read or write beyond the allocated DRAM region
    #[error("DRAM access out of range: addr {addr:#x} + {len} bytes exceeds {capacity} bytes")]
    OutOfRange {
        /// Starting byte address of the access
        addr: u64,
        /// Access length in bytes
        len: u64,
        /// Total DRAM capacity in bytes
        capacity: u64,
    },

    /// Output region exhausted while appending a spine
    #[error("Output region full for layer {layer}: write ptr {write_ptr:#x} + {len} bytes exceeds {region_end:#x}")]
    OutputRegionFull {
        /// Layer id
        layer: u32,
        /// Current write pointer
        write_ptr: u64,
        /// Bytes that were being appended
        len: u64,
        /// Exclusive end of the output region
        region_end: u64,
    },

    /// Invalid wire format or corrupted data
    #[error("Invalid format: {reason}")]
    InvalidFormat {
        /// Reason for invalid format
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Source I/O error
        source: std::io::Error,
    },

    /// Metadata JSON error
    #[error("Metadata JSON error: {source}")]
    Json {
        #[from]
        /// Source JSON error
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Create an invalid format error
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }
}

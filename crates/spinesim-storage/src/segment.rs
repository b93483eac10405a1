//! Segment headers for the segmented DRAM stream layout
//!
//! A segmented image is a sequence of lines, each `[header | payload |
//! optional padding]`. The header is serialized explicitly little-endian so
//! the wire layout does not depend on struct padding.

use crate::error::{Result, StorageError};

/// Kind of payload carried by a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SegKind {
    /// Input or output spine entries
    Spine = 0,
    /// Weight rows
    Weight = 1,
}

impl SegKind {
    /// Decode from the wire byte
    pub fn from_wire(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(SegKind::Spine),
            1 => Ok(SegKind::Weight),
            other => Err(StorageError::invalid_format(format!(
                "unknown segment kind {other}"
            ))),
        }
    }
}

/// On-wire segment header.
///
/// For [`SegKind::Weight`] segments, `logical_spine_id` encodes the kernel
/// tap `ky * K_w + kx`, `aux0` carries the input channel and `aux1` the
/// output-channel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Header layout version (currently 1)
    pub version: u8,
    /// Segment payload kind
    pub kind: SegKind,
    /// Layer index (0-based)
    pub layer_id: u16,
    /// Logical spine id (spines) or packed kernel tap (weights)
    pub logical_spine_id: u16,
    /// Number of valid entries in this segment
    pub size: u8,
    /// Segment index within the logical stream
    pub seg_id: u8,
    /// Total number of segments in the logical stream
    pub seg_count: u8,
    /// End-of-logical-stream flag
    pub eol: u8,
    /// Weight segments: input channel. Spine segments: 0.
    pub aux0: u16,
    /// Weight segments: output-channel group. Spine segments: 0.
    pub aux1: u16,
    /// Must be written as 0
    pub reserved: u32,
}

/// Current header layout version
pub const SEGMENT_VERSION: u8 = 1;

impl SegmentHeader {
    /// Serialized header width in bytes
    pub const WIRE_BYTES: usize = 18;

    /// Create a spine header for one segment of a logical stream
    pub fn spine(layer_id: u16, spine_id: u16, size: u8, seg_id: u8, seg_count: u8) -> Self {
        Self {
            version: SEGMENT_VERSION,
            kind: SegKind::Spine,
            layer_id,
            logical_spine_id: spine_id,
            size,
            seg_id,
            seg_count,
            eol: u8::from(seg_id + 1 == seg_count),
            aux0: 0,
            aux1: 0,
            reserved: 0,
        }
    }

    /// Create a weight header for one `(ky*Kw+kx, in_c, oc_group)` row group
    pub fn weight(
        layer_id: u16,
        tap: u16,
        in_c: u16,
        oc_group: u16,
        size: u8,
        seg_id: u8,
        seg_count: u8,
    ) -> Self {
        Self {
            version: SEGMENT_VERSION,
            kind: SegKind::Weight,
            layer_id,
            logical_spine_id: tap,
            size,
            seg_id,
            seg_count,
            eol: u8::from(seg_id + 1 == seg_count),
            aux0: in_c,
            aux1: oc_group,
            reserved: 0,
        }
    }

    /// Encode to the wire representation
    pub fn to_wire(&self) -> [u8; Self::WIRE_BYTES] {
        let mut out = [0u8; Self::WIRE_BYTES];
        out[0] = self.version;
        out[1] = self.kind as u8;
        out[2..4].copy_from_slice(&self.layer_id.to_le_bytes());
        out[4..6].copy_from_slice(&self.logical_spine_id.to_le_bytes());
        out[6] = self.size;
        out[7] = self.seg_id;
        out[8] = self.seg_count;
        out[9] = self.eol;
        out[10..12].copy_from_slice(&self.aux0.to_le_bytes());
        out[12..14].copy_from_slice(&self.aux1.to_le_bytes());
        out[14..18].copy_from_slice(&self.reserved.to_le_bytes());
        out
    }

    /// Decode from the start of `bytes`
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::WIRE_BYTES {
            return Err(StorageError::invalid_format(format!(
                "segment header needs {} bytes, got {}",
                Self::WIRE_BYTES,
                bytes.len()
            )));
        }
        let version = bytes[0];
        if version != SEGMENT_VERSION {
            return Err(StorageError::invalid_format(format!(
                "unsupported segment header version {version}"
            )));
        }
        Ok(Self {
            version,
            kind: SegKind::from_wire(bytes[1])?,
            layer_id: u16::from_le_bytes([bytes[2], bytes[3]]),
            logical_spine_id: u16::from_le_bytes([bytes[4], bytes[5]]),
            size: bytes[6],
            seg_id: bytes[7],
            seg_count: bytes[8],
            eol: bytes[9],
            aux0: u16::from_le_bytes([bytes[10], bytes[11]]),
            aux1: u16::from_le_bytes([bytes[12], bytes[13]]),
            reserved: u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]),
        })
    }
}

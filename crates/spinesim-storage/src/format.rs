//! Line layouts for segmented DRAM images
//!
//! A line is one segment: header followed by entry payload. The two layouts
//! differ only in how far the next line is:
//!
//! - fixed-stride: `header + max_entries * entry_bytes`, with padding after
//!   the valid payload,
//! - packed: `header + size * entry_bytes`, no padding.

use crate::error::{Result, StorageError};
use crate::segment::SegmentHeader;
use crate::Entry;

/// DRAM line layout, statically dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DramFormat {
    /// Every line occupies the same stride; short payloads are padded
    FixedStride {
        /// Maximum entries per line (also the stride divisor)
        max_entries: usize,
    },
    /// Lines are tightly packed to their payload
    Packed {
        /// Maximum entries per line (still a limit for `size`)
        max_entries: usize,
    },
}

impl DramFormat {
    /// Header width in bytes
    pub const fn header_bytes(&self) -> usize {
        SegmentHeader::WIRE_BYTES
    }

    /// One entry's width in bytes
    pub const fn entry_bytes(&self) -> usize {
        Entry::WIRE_BYTES
    }

    /// Maximum entries a line may carry
    pub const fn max_entries_per_line(&self) -> usize {
        match self {
            DramFormat::FixedStride { max_entries } | DramFormat::Packed { max_entries } => {
                *max_entries
            }
        }
    }

    /// Parse and validate a header at the start of `line`
    pub fn parse_header(&self, line: &[u8]) -> Result<SegmentHeader> {
        let hdr = SegmentHeader::from_wire(line)?;
        if hdr.size as usize > self.max_entries_per_line() {
            return Err(StorageError::invalid_format(format!(
                "segment size {} exceeds line capacity {}",
                hdr.size,
                self.max_entries_per_line()
            )));
        }
        Ok(hdr)
    }

    /// Valid payload bytes for a parsed header
    pub fn payload_bytes(&self, hdr: &SegmentHeader) -> usize {
        hdr.size as usize * self.entry_bytes()
    }

    /// Total line bytes, including padding for the fixed-stride layout
    pub fn line_bytes(&self, hdr: &SegmentHeader) -> usize {
        match self {
            DramFormat::FixedStride { max_entries } => {
                self.header_bytes() + max_entries * self.entry_bytes()
            }
            DramFormat::Packed { .. } => self.header_bytes() + self.payload_bytes(hdr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_stride_ignores_size_for_hop() {
        let fmt = DramFormat::FixedStride { max_entries: 128 };
        let short = SegmentHeader::spine(0, 0, 3, 0, 1);
        let full = SegmentHeader::spine(0, 0, 128, 0, 1);
        assert_eq!(fmt.line_bytes(&short), fmt.line_bytes(&full));
        assert_eq!(
            fmt.line_bytes(&short),
            SegmentHeader::WIRE_BYTES + 128 * Entry::WIRE_BYTES
        );
    }

    #[test]
    fn test_packed_follows_size() {
        let fmt = DramFormat::Packed { max_entries: 128 };
        let hdr = SegmentHeader::spine(0, 0, 3, 0, 1);
        assert_eq!(
            fmt.line_bytes(&hdr),
            SegmentHeader::WIRE_BYTES + 3 * Entry::WIRE_BYTES
        );
    }

    #[test]
    fn test_oversized_segment_rejected() {
        let fmt = DramFormat::Packed { max_entries: 4 };
        let hdr = SegmentHeader::spine(0, 0, 5, 0, 1);
        assert!(fmt.parse_header(&hdr.to_wire()).is_err());
    }
}

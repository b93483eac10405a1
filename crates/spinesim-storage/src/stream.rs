//! Stream reader/writer over segmented DRAM images
//!
//! The reader linearly scans a layer's region and yields lines whose headers
//! match the opened key. The writer appends fully formed lines, padding up to
//! the stride for fixed-stride layouts.

use crate::directory::{LayerDirectory, Region};
use crate::error::{Result, StorageError};
use crate::format::DramFormat;
use crate::segment::{SegKind, SegmentHeader};
use crate::Entry;

/// Match policy for weight streams.
///
/// Only the output-channel group is required; input-channel and kernel-tap
/// filtering are opt-in.
#[derive(Debug, Clone, Copy)]
pub struct WeightMatchPolicy {
    /// Output-channel group to match (required)
    pub oc_group: u16,
    /// Optional input-channel filter
    pub in_c: Option<u16>,
    /// Optional kernel-tap filter (`ky * K_w + kx`)
    pub tap: Option<u16>,
}

impl WeightMatchPolicy {
    /// Match on output-channel group only
    pub fn oc_group(oc_group: u16) -> Self {
        Self { oc_group, in_c: None, tap: None }
    }
}

enum StreamKey {
    Spine { spine_id: u16 },
    Weight(WeightMatchPolicy),
}

/// Scanning reader over one layer region of a segmented image
pub struct StreamReader<'a> {
    fmt: DramFormat,
    image: &'a [u8],
    key: StreamKey,
    layer_id: u16,
    region: Region,
    cursor: u64,
}

impl<'a> StreamReader<'a> {
    /// Open a spine stream over the layer's input region.
    ///
    /// Returns `None` when the layer has no input region or the image is
    /// empty.
    pub fn open_spine(
        fmt: DramFormat,
        image: &'a [u8],
        dir: &LayerDirectory,
        layer: u16,
        spine_id: u16,
    ) -> Option<Self> {
        let region = dir.input_range(layer);
        Self::open(fmt, image, region, layer, StreamKey::Spine { spine_id })
    }

    /// Open a weight stream over the layer's weight region
    pub fn open_weight(
        fmt: DramFormat,
        image: &'a [u8],
        dir: &LayerDirectory,
        layer: u16,
        policy: WeightMatchPolicy,
    ) -> Option<Self> {
        let region = dir.weight_range(layer);
        Self::open(fmt, image, region, layer, StreamKey::Weight(policy))
    }

    fn open(
        fmt: DramFormat,
        image: &'a [u8],
        region: Region,
        layer_id: u16,
        key: StreamKey,
    ) -> Option<Self> {
        if region.is_empty() || image.is_empty() || region.end > image.len() as u64 {
            return None;
        }
        Some(Self {
            fmt,
            image,
            key,
            layer_id,
            region,
            cursor: region.begin,
        })
    }

    fn matches(&self, hdr: &SegmentHeader) -> bool {
        if hdr.layer_id != self.layer_id {
            return false;
        }
        match &self.key {
            StreamKey::Spine { spine_id } => {
                hdr.kind == SegKind::Spine && hdr.logical_spine_id == *spine_id
            }
            StreamKey::Weight(pol) => {
                hdr.kind == SegKind::Weight
                    && hdr.aux1 == pol.oc_group
                    && pol.in_c.map_or(true, |c| hdr.aux0 == c)
                    && pol.tap.map_or(true, |t| hdr.logical_spine_id == t)
            }
        }
    }

    /// Advance to the next matching line and return its header and payload
    /// entries. Returns `Ok(None)` at end of region.
    pub fn read_next(&mut self) -> Result<Option<(SegmentHeader, Vec<Entry>)>> {
        let header_bytes = self.fmt.header_bytes() as u64;
        while self.cursor + header_bytes <= self.region.end {
            let pos = self.cursor as usize;
            let hdr = self.fmt.parse_header(&self.image[pos..])?;
            let line_bytes = self.fmt.line_bytes(&hdr) as u64;
            if self.cursor + line_bytes > self.region.end {
                // truncated line at region end
                self.cursor = self.region.end;
                return Ok(None);
            }
            self.cursor += line_bytes;
            if self.matches(&hdr) {
                let payload_begin = pos + self.fmt.header_bytes();
                let payload_end = payload_begin + self.fmt.payload_bytes(&hdr);
                let entries = Entry::decode_stream(&self.image[payload_begin..payload_end])?;
                return Ok(Some((hdr, entries)));
            }
        }
        self.cursor = self.region.end;
        Ok(None)
    }

    /// Current scan offset inside the image
    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}

/// Appending writer that lays out lines according to a [`DramFormat`]
pub struct StreamWriter<'a> {
    fmt: DramFormat,
    image: &'a mut Vec<u8>,
}

impl<'a> StreamWriter<'a> {
    /// Create a writer appending to `image`
    pub fn new(fmt: DramFormat, image: &'a mut Vec<u8>) -> Self {
        Self { fmt, image }
    }

    /// Append one line. The header's `size` must match the payload length.
    pub fn append(&mut self, hdr: &SegmentHeader, entries: &[Entry]) -> Result<()> {
        if hdr.size as usize != entries.len() {
            return Err(StorageError::invalid_format(format!(
                "header size {} does not match payload length {}",
                hdr.size,
                entries.len()
            )));
        }
        if entries.len() > self.fmt.max_entries_per_line() {
            return Err(StorageError::invalid_format(format!(
                "payload of {} entries exceeds line capacity {}",
                entries.len(),
                self.fmt.max_entries_per_line()
            )));
        }
        let line_bytes = self.fmt.line_bytes(hdr);
        let payload = Entry::encode_stream(entries);
        let pad = line_bytes - self.fmt.header_bytes() - payload.len();

        self.image.extend_from_slice(&hdr.to_wire());
        self.image.extend_from_slice(&payload);
        self.image.extend(std::iter::repeat(0u8).take(pad));
        Ok(())
    }

    /// Append a whole logical spine, splitting it into segments of at most
    /// `max_entries_per_line` entries.
    pub fn append_spine(&mut self, layer: u16, spine_id: u16, entries: &[Entry]) -> Result<()> {
        let per_line = self.fmt.max_entries_per_line();
        let seg_count = entries.len().div_ceil(per_line).max(1) as u8;
        if entries.is_empty() {
            let hdr = SegmentHeader::spine(layer, spine_id, 0, 0, 1);
            return self.append(&hdr, &[]);
        }
        for (seg_id, chunk) in entries.chunks(per_line).enumerate() {
            let hdr = SegmentHeader::spine(
                layer,
                spine_id,
                chunk.len() as u8,
                seg_id as u8,
                seg_count,
            );
            self.append(&hdr, chunk)?;
        }
        Ok(())
    }
}

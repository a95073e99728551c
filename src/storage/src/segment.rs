// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The immutable on-disk container for table slices.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! header  : magic "VSEG", u16 version (=0), u128 uuid
//! index   : u32 n_slices, n_slices x { u64 offset, u32 rows, u32 byte_off }
//! payload : length-prefixed serialized slices
//! trailer : u32 payload_len, u32 index_len, u32 crc32(header||index||payload)
//! ```
//!
//! Slices carry their own encoding tag, so a segment can be read back
//! without knowing what kinds of slices were packed into it.

use bytes::{Buf, BufMut};
use uuid::Uuid;

use spyglass_common::bitmap::Bitmap;
use spyglass_common::error::{Error, Result, WithContext};
use spyglass_common::slice::TableSlice;
use spyglass_common::types::value_encoding::{take_u32, take_u64};

use crate::fs::Chunk;

pub const SEGMENT_MAGIC: &[u8; 4] = b"VSEG";
pub const SEGMENT_VERSION: u16 = 0;

/// Fixed sizes of the framing pieces.
const HEADER_LEN: usize = 4 + 2 + 16;
const INDEX_ENTRY_LEN: usize = 8 + 4 + 4;
const TRAILER_LEN: usize = 4 + 4 + 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SliceEntry {
    offset: u64,
    rows: u32,
    /// Byte position of the slice's length-prefixed frame within the
    /// payload section.
    byte_off: u32,
}

/// Packs table slices, in id order, into a segment byte buffer.
#[derive(Debug)]
pub struct SegmentBuilder {
    uuid: Uuid,
    index: Vec<SliceEntry>,
    payload: Vec<u8>,
    next_offset: u64,
    rows: u64,
}

impl SegmentBuilder {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            index: Vec::new(),
            payload: Vec::new(),
            next_offset: 0,
            rows: 0,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn num_slices(&self) -> usize {
        self.index.len()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Add a slice. Offsets must not overlap the slices seen so far:
    /// `slice.offset() >= previous offset + rows`.
    pub fn add(&mut self, slice: &TableSlice) -> Result<()> {
        if slice.rows() == 0 {
            return Err(Error::invalid_argument("cannot add an empty slice"));
        }
        if slice.offset() < self.next_offset {
            return Err(Error::invalid_argument(format!(
                "slice offset {} overlaps previous slices ending at {}",
                slice.offset(),
                self.next_offset
            )));
        }
        let byte_off = self.payload.len() as u32;
        let mut frame = Vec::new();
        slice.encode_to(&mut frame);
        self.payload.put_u32_le(frame.len() as u32);
        self.payload.extend_from_slice(&frame);
        self.index.push(SliceEntry {
            offset: slice.offset(),
            rows: slice.rows(),
            byte_off,
        });
        self.next_offset = slice.offset() + slice.rows() as u64;
        self.rows += slice.rows() as u64;
        Ok(())
    }

    /// Emit the segment bytes and reset the builder for a new uuid.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_LEN + 4 + self.index.len() * INDEX_ENTRY_LEN + self.payload.len() + TRAILER_LEN,
        );
        out.extend_from_slice(SEGMENT_MAGIC);
        out.put_u16_le(SEGMENT_VERSION);
        out.put_u128_le(self.uuid.as_u128());
        out.put_u32_le(self.index.len() as u32);
        for entry in &self.index {
            out.put_u64_le(entry.offset);
            out.put_u32_le(entry.rows);
            out.put_u32_le(entry.byte_off);
        }
        let index_len = 4 + self.index.len() * INDEX_ENTRY_LEN;
        out.extend_from_slice(&self.payload);

        let mut crc = crc32fast::Hasher::new();
        crc.update(&out);
        out.put_u32_le(self.payload.len() as u32);
        out.put_u32_le(index_len as u32);
        out.put_u32_le(crc.finalize());

        self.index.clear();
        self.payload.clear();
        self.next_offset = 0;
        self.rows = 0;
        self.uuid = Uuid::new_v4();
        out
    }
}

/// A decoded segment. The slice index lives in memory; slice payloads
/// stay in the backing chunk and are decoded on lookup.
#[derive(Debug)]
pub struct Segment {
    uuid: Uuid,
    index: Vec<SliceEntry>,
    chunk: Chunk,
    payload_start: usize,
    payload_len: usize,
}

impl Segment {
    /// Parse and verify a segment from a chunk. A checksum mismatch or
    /// a truncated buffer is a hard error.
    pub fn decode(chunk: Chunk) -> Result<Self> {
        let data = chunk.as_slice();
        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(Error::format("segment too short"));
        }
        let (body, trailer) = data.split_at(data.len() - TRAILER_LEN);
        let mut trailer = trailer;
        let payload_len = take_u32(&mut trailer)? as usize;
        let index_len = take_u32(&mut trailer)? as usize;
        let crc = take_u32(&mut trailer)?;

        let mut crc_check = crc32fast::Hasher::new();
        crc_check.update(body);
        if crc_check.finalize() != crc {
            return Err(Error::format("segment checksum mismatch"));
        }

        let mut header = body;
        let magic = take_u32(&mut header)?.to_le_bytes();
        if &magic != SEGMENT_MAGIC {
            return Err(Error::format(format!(
                "bad segment magic: {magic:02x?}"
            )));
        }
        let version = spyglass_common::types::value_encoding::take_u16(&mut header)?;
        if version != SEGMENT_VERSION {
            return Err(Error::VersionMismatch(format!(
                "segment version {version}, expected {SEGMENT_VERSION}"
            )));
        }
        let uuid = Uuid::from_u128(take_u128(&mut header)?);

        if body.len() != HEADER_LEN + index_len + payload_len {
            return Err(Error::format(format!(
                "segment length mismatch: {} != {HEADER_LEN} + {index_len} + {payload_len}",
                body.len()
            )));
        }
        let n_slices = take_u32(&mut header)? as usize;
        if index_len != 4 + n_slices * INDEX_ENTRY_LEN {
            return Err(Error::format("segment index length mismatch"));
        }
        let mut index = Vec::with_capacity(n_slices);
        let mut next_offset = 0;
        for _ in 0..n_slices {
            let offset = take_u64(&mut header)?;
            let rows = take_u32(&mut header)?;
            let byte_off = take_u32(&mut header)?;
            if offset < next_offset && !index.is_empty() {
                return Err(Error::format("segment slice offsets out of order"));
            }
            if rows == 0 || byte_off as usize >= payload_len {
                return Err(Error::format("segment index entry out of bounds"));
            }
            next_offset = offset + rows as u64;
            index.push(SliceEntry {
                offset,
                rows,
                byte_off,
            });
        }

        Ok(Self {
            uuid,
            index,
            chunk,
            payload_start: HEADER_LEN + index_len,
            payload_len,
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn num_slices(&self) -> usize {
        self.index.len()
    }

    pub fn rows(&self) -> u64 {
        self.index.iter().map(|e| e.rows as u64).sum()
    }

    /// The ids covered by this segment.
    pub fn ids(&self) -> Bitmap {
        let mut bitmap = Bitmap::new();
        for entry in &self.index {
            bitmap.insert_range(entry.offset, entry.offset + entry.rows as u64);
        }
        bitmap
    }

    /// Decode the slices whose id range overlaps `ids`. The walk is
    /// linear in the number of matching slices: each run of `ids` jumps
    /// straight to its first candidate entry.
    pub fn lookup(&self, ids: &Bitmap) -> Result<Vec<TableSlice>> {
        let mut selected = Vec::new();
        let mut last: Option<usize> = None;
        for (start, end) in ids.runs() {
            let mut i = self
                .index
                .partition_point(|e| e.offset + e.rows as u64 <= start);
            while i < self.index.len() && self.index[i].offset < end {
                if last != Some(i) {
                    selected.push(i);
                    last = Some(i);
                }
                i += 1;
            }
        }
        selected.into_iter().map(|i| self.decode_slice(i)).collect()
    }

    fn decode_slice(&self, i: usize) -> Result<TableSlice> {
        let entry = self.index[i];
        let frame_at = self.payload_start + entry.byte_off as usize;
        let mut len_bytes = self
            .chunk
            .bytes(frame_at..(frame_at + 4).min(self.chunk.len()));
        let len = take_u32(&mut len_bytes)? as usize;
        let frame_end = frame_at + 4 + len;
        if frame_end > self.payload_start + self.payload_len {
            return Err(Error::format("slice frame out of bounds"));
        }
        let mut frame = self.chunk.bytes(frame_at + 4..frame_end);
        let slice =
            TableSlice::decode_from(&mut frame).context(format!("slice {i}"))?;
        if slice.offset() != entry.offset || slice.rows() != entry.rows {
            return Err(Error::format(format!(
                "slice {i} disagrees with segment index: offset {} rows {}",
                slice.offset(),
                slice.rows()
            )));
        }
        Ok(slice)
    }
}

fn take_u128(buf: &mut impl Buf) -> Result<u128> {
    if buf.remaining() < 16 {
        return Err(Error::format("truncated segment header"));
    }
    Ok(buf.get_u128_le())
}

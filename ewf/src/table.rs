//! Table section payload and the chunk offset table
//!
//! A table section declares how many media chunks it covers and a base
//! offset, then carries one 32-bit entry per chunk. The top bit of an
//! entry marks the chunk as zlib-compressed; the low 31 bits are the
//! chunk's start offset relative to the base.

use std::path::PathBuf;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::{EwfError, Result};
use crate::section::{SECTION_PREFIX_SIZE, SectionKind, SectionPrefix, expect_kind};
use crate::segment::SegmentIo;

/// Minimum declared size of a table section.
pub const TABLE_SECTION_MIN_SIZE: u64 = 100;

/// Section-relative offset where the chunk offset array starts.
const OFFSET_ARRAY_OFFSET: u64 = 100;

const CHUNK_COUNT_OFFSET: usize = 76;
const BASE_OFFSET_OFFSET: usize = 84;

const COMPRESSED_FLAG: u32 = 0x8000_0000;
const OFFSET_MASK: u32 = 0x7fff_ffff;

/// Chunk count and base offset declared by a table section.
#[derive(Debug, Clone, Copy)]
pub struct TableParameters {
    /// Media chunks covered by this table.
    pub chunk_count: u32,
    /// Added to every entry offset to obtain an absolute file offset.
    pub base_offset: i64,
}

impl TableParameters {
    /// Decodes the checksummed fixed-size payload after a table prefix.
    pub fn read(io: &mut SegmentIo, prefix: &SectionPrefix) -> Result<Self> {
        expect_kind(prefix, SectionKind::Table)?;
        if prefix.section_size < TABLE_SECTION_MIN_SIZE {
            return Err(EwfError::Format {
                path: prefix.path.clone(),
                offset: prefix.file_offset,
                reason: format!(
                    "table section of {} bytes is too small",
                    prefix.section_size
                ),
            });
        }

        let bytes = io.read_checksummed(
            &prefix.path,
            prefix.file_offset + SECTION_PREFIX_SIZE as u64,
            TABLE_SECTION_MIN_SIZE as usize - SECTION_PREFIX_SIZE,
        )?;

        let at = CHUNK_COUNT_OFFSET - SECTION_PREFIX_SIZE;
        let chunk_count = LittleEndian::read_u32(&bytes[at..at + 4]);
        if chunk_count > i32::MAX as u32 {
            return Err(EwfError::Format {
                path: prefix.path.clone(),
                offset: prefix.file_offset,
                reason: format!("chunk count {chunk_count} is out of range"),
            });
        }

        let at = BASE_OFFSET_OFFSET - SECTION_PREFIX_SIZE;
        let base_offset = LittleEndian::read_i64(&bytes[at..at + 8]);

        Ok(Self {
            chunk_count,
            base_offset,
        })
    }
}

/// Per-chunk start offsets and compression flags for one table section.
#[derive(Debug)]
pub struct ChunkOffsetTable {
    entries: Vec<u32>,
    path: PathBuf,
    file_offset: u64,
}

impl ChunkOffsetTable {
    /// Reads the offset array of a table section whose chunk count is
    /// already known from its prefix.
    ///
    /// The declared section size selects the layout: the array followed
    /// by its own checksum, or the legacy layout with no checksum.
    pub fn read(io: &mut SegmentIo, prefix: &SectionPrefix) -> Result<Self> {
        expect_kind(prefix, SectionKind::Table)?;

        let count = prefix.chunk_count;
        let array_size = count * 4;
        let legacy_size = OFFSET_ARRAY_OFFSET + array_size;
        let checksummed_size = legacy_size + 4;

        if prefix.section_size < legacy_size {
            return Err(EwfError::Format {
                path: prefix.path.clone(),
                offset: prefix.file_offset,
                reason: format!(
                    "table section of {} bytes cannot hold {count} chunk entries",
                    prefix.section_size
                ),
            });
        }

        let address = prefix.file_offset + OFFSET_ARRAY_OFFSET;
        let bytes = if prefix.section_size >= checksummed_size {
            let bytes = io.read_checksummed(&prefix.path, address, (array_size + 4) as usize)?;
            if prefix.section_size > checksummed_size {
                debug!("chunk table carries extra trailing bytes: {prefix}");
            }
            bytes
        } else if prefix.section_size == legacy_size {
            debug!("chunk table without trailing checksum (legacy layout): {prefix}");
            io.read_raw(&prefix.path, address, array_size as usize)?
        } else {
            return Err(EwfError::Format {
                path: prefix.path.clone(),
                offset: prefix.file_offset,
                reason: format!(
                    "table section size {} fits neither chunk table layout",
                    prefix.section_size
                ),
            });
        };

        let entries = bytes
            .chunks_exact(4)
            .take(count as usize)
            .map(LittleEndian::read_u32)
            .collect();

        Ok(Self {
            entries,
            path: prefix.path.clone(),
            file_offset: prefix.file_offset,
        })
    }

    /// Number of chunks covered by this table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table covers no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start offset of a chunk relative to the table's base offset.
    pub fn start_offset(&self, index: usize) -> Result<u32> {
        self.entry(index).map(|entry| entry & OFFSET_MASK)
    }

    /// Whether the chunk at `index` is stored zlib-compressed.
    pub fn is_compressed(&self, index: usize) -> Result<bool> {
        self.entry(index).map(|entry| entry & COMPRESSED_FLAG != 0)
    }

    fn entry(&self, index: usize) -> Result<u32> {
        self.entries
            .get(index)
            .copied()
            .ok_or_else(|| EwfError::Format {
                path: self.path.clone(),
                offset: self.file_offset,
                reason: format!(
                    "chunk table index {index} is out of range for {} entries",
                    self.entries.len()
                ),
            })
    }
}

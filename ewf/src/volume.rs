//! Volume section payload

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{EwfError, Result};
use crate::section::{SECTION_PREFIX_SIZE, SectionKind, SectionPrefix, expect_kind};
use crate::segment::SegmentIo;

/// Minimum declared size of a volume section.
pub const VOLUME_SECTION_MIN_SIZE: u64 = 1128;

const CHUNK_COUNT_OFFSET: usize = 80;
const SECTORS_PER_CHUNK_OFFSET: usize = 84;
const BYTES_PER_SECTOR_OFFSET: usize = 88;
const SECTOR_COUNT_OFFSET: usize = 92;

/// Media geometry declared by a volume section.
#[derive(Debug, Clone, Copy)]
pub struct VolumeParameters {
    pub chunk_count: u32,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub sector_count: u32,
}

impl VolumeParameters {
    /// Decodes the checksummed fixed-size payload after a volume prefix.
    pub fn read(io: &mut SegmentIo, prefix: &SectionPrefix) -> Result<Self> {
        expect_kind(prefix, SectionKind::Volume)?;
        if prefix.section_size < VOLUME_SECTION_MIN_SIZE {
            return Err(EwfError::Format {
                path: prefix.path.clone(),
                offset: prefix.file_offset,
                reason: format!(
                    "volume section of {} bytes is too small",
                    prefix.section_size
                ),
            });
        }

        let bytes = io.read_checksummed(
            &prefix.path,
            prefix.file_offset + SECTION_PREFIX_SIZE as u64,
            VOLUME_SECTION_MIN_SIZE as usize - SECTION_PREFIX_SIZE,
        )?;

        Ok(Self {
            chunk_count: bounded_field(&bytes, CHUNK_COUNT_OFFSET, "chunk count", prefix)?,
            sectors_per_chunk: bounded_field(
                &bytes,
                SECTORS_PER_CHUNK_OFFSET,
                "sectors per chunk",
                prefix,
            )?,
            bytes_per_sector: bounded_field(
                &bytes,
                BYTES_PER_SECTOR_OFFSET,
                "bytes per sector",
                prefix,
            )?,
            sector_count: bounded_field(&bytes, SECTOR_COUNT_OFFSET, "sector count", prefix)?,
        })
    }

    /// Media chunk size in bytes.
    pub fn chunk_size(&self) -> u64 {
        u64::from(self.sectors_per_chunk) * u64::from(self.bytes_per_sector)
    }
}

fn bounded_field(
    bytes: &[u8],
    section_offset: usize,
    name: &str,
    prefix: &SectionPrefix,
) -> Result<u32> {
    let at = section_offset - SECTION_PREFIX_SIZE;
    let value = LittleEndian::read_u32(&bytes[at..at + 4]);
    if value > i32::MAX as u32 {
        return Err(EwfError::Format {
            path: prefix.path.clone(),
            offset: prefix.file_offset,
            reason: format!("{name} {value} is out of range"),
        });
    }
    Ok(value)
}

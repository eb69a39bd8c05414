//! Section classification and the common section prefix
//!
//! Every section begins with a 76-byte checksummed prefix naming its type,
//! the file offset of the next section, and its own size. Sections form a
//! chain through each segment file; table sections additionally advance
//! the running media chunk index.

use std::fmt;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use crate::error::{EwfError, Result};
use crate::segment::SegmentIo;
use crate::table::TableParameters;

/// Size of the checksummed prefix that starts every section.
pub const SECTION_PREFIX_SIZE: usize = 76;

const TYPE_TOKEN_SIZE: usize = 16;
const NEXT_OFFSET_OFFSET: usize = 16;
const SECTION_SIZE_OFFSET: usize = 24;

/// The closed set of section types a container may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Compressed case metadata text
    Header,
    /// Media geometry: chunk count, sectors per chunk, bytes per sector
    Volume,
    /// Chunk offset table for a run of media chunks
    Table,
    /// End of this segment file, media continues in the next one
    Next,
    /// End of the final segment file
    Done,
    /// UTF-16 variant of the case metadata text
    Header2,
    /// Alternate name some writers use for the volume section
    Disk,
    /// Copy of the volume geometry carried for recovery
    Data,
    /// Raw and compressed chunk data
    Sectors,
    /// Backup copy of a table section
    Table2,
    /// Logical evidence tree
    Ltree,
    /// Stored digests over the media
    Digest,
    /// Stored MD5 hash of the media
    Hash,
}

impl SectionKind {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "header" => Some(Self::Header),
            "volume" => Some(Self::Volume),
            "table" => Some(Self::Table),
            "next" => Some(Self::Next),
            "done" => Some(Self::Done),
            "header2" => Some(Self::Header2),
            "disk" => Some(Self::Disk),
            "data" => Some(Self::Data),
            "sectors" => Some(Self::Sectors),
            "table2" => Some(Self::Table2),
            "ltree" => Some(Self::Ltree),
            "digest" => Some(Self::Digest),
            "hash" => Some(Self::Hash),
            _ => None,
        }
    }

    /// The on-disk type token for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Volume => "volume",
            Self::Table => "table",
            Self::Next => "next",
            Self::Done => "done",
            Self::Header2 => "header2",
            Self::Disk => "disk",
            Self::Data => "data",
            Self::Sectors => "sectors",
            Self::Table2 => "table2",
            Self::Ltree => "ltree",
            Self::Digest => "digest",
            Self::Hash => "hash",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded prefix of one section, plus its place in the media chunk run.
#[derive(Debug, Clone)]
pub struct SectionPrefix {
    /// Classified section type.
    pub kind: SectionKind,
    /// Segment file this section lives in.
    pub path: PathBuf,
    /// File offset where this section starts.
    pub file_offset: u64,
    /// File offset where the next section starts.
    pub next_offset: u64,
    /// Declared size of this section, prefix included.
    pub section_size: u64,
    /// Running media chunk index at the start of this section.
    pub chunk_index: u64,
    /// Running media chunk index after this section; exceeds `chunk_index`
    /// only for table sections.
    pub next_chunk_index: u64,
    /// Media chunks contributed by this section's table.
    pub chunk_count: u64,
}

impl SectionPrefix {
    /// Decodes the checksummed prefix at `file_offset`, pulling the table
    /// payload as well when the section is a table so the running chunk
    /// index can advance.
    pub fn read(
        io: &mut SegmentIo,
        path: &Path,
        file_offset: u64,
        chunk_index: u64,
    ) -> Result<Self> {
        let bytes = io.read_checksummed(path, file_offset, SECTION_PREFIX_SIZE)?;

        let token_bytes = &bytes[..TYPE_TOKEN_SIZE];
        let end = token_bytes
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(TYPE_TOKEN_SIZE);
        let token = std::str::from_utf8(&token_bytes[..end]).unwrap_or_default();
        let kind = SectionKind::from_token(token).ok_or_else(|| EwfError::Format {
            path: path.to_path_buf(),
            offset: file_offset,
            reason: format!(
                "unrecognized section type '{}'",
                String::from_utf8_lossy(&token_bytes[..end])
            ),
        })?;

        let next_offset =
            LittleEndian::read_u64(&bytes[NEXT_OFFSET_OFFSET..NEXT_OFFSET_OFFSET + 8]);
        let section_size =
            LittleEndian::read_u64(&bytes[SECTION_SIZE_OFFSET..SECTION_SIZE_OFFSET + 8]);
        for (field, value) in [
            ("next-section offset", next_offset),
            ("section size", section_size),
        ] {
            if value > i64::MAX as u64 {
                return Err(EwfError::Format {
                    path: path.to_path_buf(),
                    offset: file_offset,
                    reason: format!("{field} {value:#x} is out of range"),
                });
            }
        }

        let mut prefix = Self {
            kind,
            path: path.to_path_buf(),
            file_offset,
            next_offset,
            section_size,
            chunk_index,
            next_chunk_index: chunk_index,
            chunk_count: 0,
        };

        if kind == SectionKind::Table {
            let table = TableParameters::read(io, &prefix)?;
            prefix.chunk_count = u64::from(table.chunk_count);
            prefix.next_chunk_index = chunk_index + prefix.chunk_count;
        }

        trace!("{prefix}");
        Ok(prefix)
    }
}

impl fmt::Display for SectionPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "section '{}' in {} at {:#x}, size {}, chunk index {}, chunk count {}",
            self.kind,
            self.path.display(),
            self.file_offset,
            self.section_size,
            self.chunk_index,
            self.chunk_count
        )
    }
}

pub(crate) fn expect_kind(prefix: &SectionPrefix, kind: SectionKind) -> Result<()> {
    if prefix.kind == kind {
        Ok(())
    } else {
        Err(EwfError::Format {
            path: prefix.path.clone(),
            offset: prefix.file_offset,
            reason: format!("expected a '{kind}' section, found '{}'", prefix.kind),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use adler2::adler32_slice;
    use tempfile::TempDir;

    use crate::segment::{EWF_SIGNATURE, FIRST_SECTION_OFFSET};

    fn prefix_bytes(token: &[u8], next_offset: u64, section_size: u64) -> Vec<u8> {
        let mut data = [0u8; SECTION_PREFIX_SIZE - 4];
        data[..token.len()].copy_from_slice(token);
        LittleEndian::write_u64(&mut data[NEXT_OFFSET_OFFSET..NEXT_OFFSET_OFFSET + 8], next_offset);
        LittleEndian::write_u64(
            &mut data[SECTION_SIZE_OFFSET..SECTION_SIZE_OFFSET + 8],
            section_size,
        );
        let mut bytes = data.to_vec();
        let mut trailer = [0u8; 4];
        LittleEndian::write_u32(&mut trailer, adler32_slice(&data));
        bytes.extend_from_slice(&trailer);
        bytes
    }

    fn write_segment(dir: &TempDir, sections: &[Vec<u8>]) -> PathBuf {
        let path = dir.path().join("image.E01");
        let mut bytes = EWF_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[1, 1, 0, 0, 0]);
        for section in sections {
            bytes.extend_from_slice(section);
        }
        fs::write(&path, bytes).expect("should write test segment");
        path
    }

    #[test]
    fn decodes_prefix_fields() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = write_segment(&dir, &[prefix_bytes(b"done", 13, 76)]);

        let mut io = SegmentIo::new();
        let prefix = SectionPrefix::read(&mut io, &path, FIRST_SECTION_OFFSET, 7)
            .expect("should decode");
        assert_eq!(prefix.kind, SectionKind::Done);
        assert_eq!(prefix.file_offset, 13);
        assert_eq!(prefix.next_offset, 13);
        assert_eq!(prefix.section_size, 76);
        assert_eq!(prefix.chunk_index, 7);
        assert_eq!(prefix.next_chunk_index, 7);
        assert_eq!(prefix.chunk_count, 0);
    }

    #[test]
    fn table_prefix_learns_its_chunk_count() {
        let dir = TempDir::new().expect("should create temp dir");
        let mut table_data = [0u8; 20];
        LittleEndian::write_u32(&mut table_data[..4], 5);
        let mut payload = table_data.to_vec();
        let mut trailer = [0u8; 4];
        LittleEndian::write_u32(&mut trailer, adler32_slice(&table_data));
        payload.extend_from_slice(&trailer);

        let mut section = prefix_bytes(b"table", 300, 120);
        section.extend_from_slice(&payload);
        let path = write_segment(&dir, &[section]);

        let mut io = SegmentIo::new();
        let prefix = SectionPrefix::read(&mut io, &path, FIRST_SECTION_OFFSET, 10)
            .expect("should decode");
        assert_eq!(prefix.kind, SectionKind::Table);
        assert_eq!(prefix.chunk_count, 5);
        assert_eq!(prefix.chunk_index, 10);
        assert_eq!(prefix.next_chunk_index, 15);
    }

    #[test]
    fn unknown_type_token_is_a_format_error() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = write_segment(&dir, &[prefix_bytes(b"bogus", 13, 76)]);

        let mut io = SegmentIo::new();
        let err = SectionPrefix::read(&mut io, &path, FIRST_SECTION_OFFSET, 0)
            .expect_err("unknown token");
        assert!(matches!(err, EwfError::Format { .. }));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn corrupted_prefix_is_a_checksum_error() {
        let dir = TempDir::new().expect("should create temp dir");
        let mut section = prefix_bytes(b"done", 13, 76);
        section[20] ^= 0xff;
        let path = write_segment(&dir, &[section]);

        let mut io = SegmentIo::new();
        let err = SectionPrefix::read(&mut io, &path, FIRST_SECTION_OFFSET, 0)
            .expect_err("corruption");
        assert!(matches!(err, EwfError::Checksum { .. }));
    }

    #[test]
    fn oversized_section_size_is_a_format_error() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = write_segment(&dir, &[prefix_bytes(b"done", 13, u64::MAX)]);

        let mut io = SegmentIo::new();
        let err = SectionPrefix::read(&mut io, &path, FIRST_SECTION_OFFSET, 0)
            .expect_err("out of range");
        assert!(matches!(err, EwfError::Format { .. }));
    }
}

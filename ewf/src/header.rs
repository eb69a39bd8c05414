//! Header section text

use tracing::trace;

use crate::error::{EwfError, Result};
use crate::section::{SECTION_PREFIX_SIZE, SectionKind, SectionPrefix, expect_kind};
use crate::segment::{DEFAULT_CHUNK_SIZE, SegmentIo};

/// Inflates a header section's payload into case metadata text.
///
/// The payload is one zlib stream holding line-oriented text recorded by
/// the acquisition tool. Unlike media chunks it carries no trailing
/// checksum; the stream's own integrity check covers it.
pub fn read_header_text(io: &mut SegmentIo, prefix: &SectionPrefix) -> Result<String> {
    expect_kind(prefix, SectionKind::Header)?;

    if prefix.section_size > i32::MAX as u64 {
        return Err(EwfError::Format {
            path: prefix.path.clone(),
            offset: prefix.file_offset,
            reason: format!(
                "header section size {} is out of range",
                prefix.section_size
            ),
        });
    }
    let payload_size = prefix
        .section_size
        .checked_sub(SECTION_PREFIX_SIZE as u64)
        .ok_or_else(|| EwfError::Format {
            path: prefix.path.clone(),
            offset: prefix.file_offset,
            reason: format!(
                "header section of {} bytes is smaller than its prefix",
                prefix.section_size
            ),
        })?;

    let bytes = io.read_compressed(
        &prefix.path,
        prefix.file_offset + SECTION_PREFIX_SIZE as u64,
        payload_size as usize,
        DEFAULT_CHUNK_SIZE,
    )?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    trace!(
        "decoded {} bytes of header text from {}",
        bytes.len(),
        prefix.path.display()
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write as _;
    use std::path::PathBuf;

    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use tempfile::TempDir;

    use crate::segment::EWF_SIGNATURE;

    fn write_header(dir: &TempDir, text: &str) -> (PathBuf, SectionPrefix) {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(text.as_bytes())
            .expect("should compress");
        let compressed = encoder.finish().expect("should finish stream");

        let path = dir.path().join("image.E01");
        let mut bytes = EWF_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[1, 1, 0, 0, 0]);
        bytes.extend_from_slice(&[0u8; SECTION_PREFIX_SIZE]);
        bytes.extend_from_slice(&compressed);
        fs::write(&path, bytes).expect("should write test segment");

        let section_size = (SECTION_PREFIX_SIZE + compressed.len()) as u64;
        let prefix = SectionPrefix {
            kind: SectionKind::Header,
            path: path.clone(),
            file_offset: 13,
            next_offset: 13 + section_size,
            section_size,
            chunk_index: 0,
            next_chunk_index: 0,
            chunk_count: 0,
        };
        (path, prefix)
    }

    #[test]
    fn inflates_case_metadata() {
        let dir = TempDir::new().expect("should create temp dir");
        let text = "1\r\nmain\r\nc\tn\ta\te\r\ncase 42\tevidence 7\texaminer\tdescription\r\n";
        let (_, prefix) = write_header(&dir, text);

        let mut io = SegmentIo::new();
        let decoded = read_header_text(&mut io, &prefix).expect("should inflate");
        assert_eq!(decoded, text);
    }

    #[test]
    fn section_smaller_than_its_prefix_is_a_format_error() {
        let dir = TempDir::new().expect("should create temp dir");
        let (_, mut prefix) = write_header(&dir, "text");
        prefix.section_size = 40;

        let mut io = SegmentIo::new();
        let err = read_header_text(&mut io, &prefix).expect_err("too small");
        assert!(matches!(err, EwfError::Format { .. }));
    }

    #[test]
    fn wrong_section_kind_is_a_format_error() {
        let dir = TempDir::new().expect("should create temp dir");
        let (_, mut prefix) = write_header(&dir, "text");
        prefix.kind = SectionKind::Done;

        let mut io = SegmentIo::new();
        let err = read_header_text(&mut io, &prefix).expect_err("wrong kind");
        assert!(matches!(err, EwfError::Format { .. }));
    }
}

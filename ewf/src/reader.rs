//! Random access over the reassembled media image

use std::path::{Path, PathBuf};

use tracing::{debug, info, trace};

use crate::error::{EwfError, Result};
use crate::filename;
use crate::header;
use crate::section::{SectionKind, SectionPrefix};
use crate::segment::{DEFAULT_CHUNK_SIZE, FIRST_SECTION_OFFSET, SegmentIo};
use crate::table::{ChunkOffsetTable, TableParameters};
use crate::volume::VolumeParameters;

#[derive(Debug)]
struct CachedChunk {
    index: u64,
    bytes: Vec<u8>,
}

/// Random-access reader over the media image of one container.
///
/// Opening walks every section of every chained segment file, then derives
/// the chunk size and the total media size. Reads translate logical image
/// addresses to stored chunks through the section index.
#[derive(Debug)]
pub struct EwfReader {
    first_path: PathBuf,
    io: SegmentIo,
    sections: Vec<SectionPrefix>,
    chunk_size: usize,
    image_size: u64,
    cached: Option<CachedChunk>,
}

impl EwfReader {
    /// Opens the container whose first segment file is `path`.
    ///
    /// The whole section chain is validated up front; a container with a
    /// broken chain, a bad checksum, or no media chunks fails here rather
    /// than on a later read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let first_path = path.as_ref().to_path_buf();
        if !filename::is_first_segment_path(&first_path) {
            return Err(EwfError::Sequence {
                path: first_path,
                reason: "not a first segment filename (expected an .E01 suffix)".to_string(),
            });
        }

        let mut io = SegmentIo::new();
        let sections = scan_sections(&mut io, &first_path)?;
        info!(
            "indexed {} sections starting from {}",
            sections.len(),
            first_path.display()
        );

        let chunk_size = derive_chunk_size(&mut io, &sections)?;

        let mut reader = Self {
            first_path,
            io,
            sections,
            chunk_size,
            image_size: 0,
            cached: None,
        };
        reader.image_size = reader.compute_image_size()?;
        info!(
            "opened {} with image size {}",
            reader.first_path.display(),
            reader.image_size
        );
        Ok(reader)
    }

    /// Total size in bytes of the media image.
    pub fn image_size(&self) -> u64 {
        self.image_size
    }

    /// Media chunk size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Reads up to `length` bytes of media starting at image address
    /// `address`.
    ///
    /// The result is clipped at the end of the image: it is shorter than
    /// `length` when the request crosses the end and empty when `address`
    /// is at or past it.
    pub fn read_image_bytes(&mut self, address: u64, length: usize) -> Result<Vec<u8>> {
        if address >= self.image_size {
            trace!("read at {address:#x} is past the image end, returning no bytes");
            return Ok(Vec::new());
        }

        let clipped = (length as u64).min(self.image_size - address) as usize;
        let mut out = Vec::with_capacity(clipped);
        let mut position = address;
        let mut remaining = clipped;
        while remaining > 0 {
            let chunk_index = position / self.chunk_size as u64;
            let offset_in_chunk = (position % self.chunk_size as u64) as usize;
            let step = remaining.min(self.chunk_size - offset_in_chunk);
            let step_end = offset_in_chunk + step;

            let chunk = self.chunk_bytes(chunk_index)?;
            if step_end > chunk.len() {
                let stored = chunk.len();
                return Err(EwfError::Format {
                    path: self.first_path.clone(),
                    offset: position,
                    reason: format!(
                        "chunk {chunk_index} holds {stored} bytes, expected at least {step_end}"
                    ),
                });
            }
            out.extend_from_slice(&chunk[offset_in_chunk..step_end]);

            position += step as u64;
            remaining -= step;
        }

        Ok(out)
    }

    /// Renders the container's identifying properties as text: the
    /// filename, media size, chunk size, and the case metadata from the
    /// first header section.
    pub fn image_properties(&mut self) -> Result<String> {
        let header_text = self.read_header_information()?;
        Ok(format!(
            "EWF file filename: {}\nImage size: {1} (0x{1:08x})\nChunk size: {2}\nVolume header information:\n{3}",
            self.first_path.display(),
            self.image_size,
            self.chunk_size,
            header_text
        ))
    }

    /// Releases the open file handle and the cached chunk. A later read
    /// reopens what it needs, so closing is idempotent.
    pub fn close(&mut self) {
        self.io.close();
        self.cached = None;
    }

    fn read_header_information(&mut self) -> Result<String> {
        let header_prefix = self
            .sections
            .iter()
            .find(|prefix| prefix.kind == SectionKind::Header)
            .cloned();
        match header_prefix {
            Some(prefix) => header::read_header_text(&mut self.io, &prefix),
            None => {
                debug!("{} has no header section", self.first_path.display());
                Ok("This media has no Header Section.".to_string())
            }
        }
    }

    fn compute_image_size(&mut self) -> Result<u64> {
        let next_chunk_index = self
            .sections
            .last()
            .map_or(0, |prefix| prefix.next_chunk_index);
        if next_chunk_index == 0 {
            return Err(EwfError::Sequence {
                path: self.first_path.clone(),
                reason: "container has no media chunks".to_string(),
            });
        }
        let last_chunk_index = next_chunk_index - 1;

        let last_len = self.chunk_bytes(last_chunk_index)?.len() as u64;
        let image_size = last_chunk_index * self.chunk_size as u64 + last_len;
        trace!(
            "image size {image_size}: {last_chunk_index} chunks of {} plus {last_len} final bytes",
            self.chunk_size
        );
        Ok(image_size)
    }

    fn chunk_bytes(&mut self, chunk_index: u64) -> Result<&[u8]> {
        if self
            .cached
            .as_ref()
            .is_none_or(|cached| cached.index != chunk_index)
        {
            let bytes = self.resolve_chunk(chunk_index)?;
            self.cached = Some(CachedChunk {
                index: chunk_index,
                bytes,
            });
        }
        // the slot is occupied on both paths above
        self.cached
            .as_ref()
            .map(|cached| cached.bytes.as_slice())
            .ok_or_else(|| EwfError::Sequence {
                path: self.first_path.clone(),
                reason: format!("chunk {chunk_index} is unavailable"),
            })
    }

    /// Locates, reads, and decodes one stored chunk.
    ///
    /// The chunk's table section is found by its index range, and the
    /// chunk's span inside the segment file comes from adjacent table
    /// entries. The last chunk of a table has no next entry; its span
    /// ends where the section enclosing its data ends.
    fn resolve_chunk(&mut self, chunk_index: u64) -> Result<Vec<u8>> {
        let table_prefix = self
            .sections
            .iter()
            .find(|prefix| (prefix.chunk_index..prefix.next_chunk_index).contains(&chunk_index))
            .cloned()
            .ok_or_else(|| EwfError::Sequence {
                path: self.first_path.clone(),
                reason: format!("no table section covers chunk {chunk_index}"),
            })?;

        let table = TableParameters::read(&mut self.io, &table_prefix)?;
        if table.base_offset != 0 {
            debug!(
                "table at {:#x} in {} uses base offset {:#x}",
                table_prefix.file_offset,
                table_prefix.path.display(),
                table.base_offset
            );
        }
        let offsets = ChunkOffsetTable::read(&mut self.io, &table_prefix)?;

        let local_index = (chunk_index - table_prefix.chunk_index) as usize;
        let begin = absolute_offset(&table_prefix, &table, offsets.start_offset(local_index)?)?;
        let end = if chunk_index + 1 < table_prefix.next_chunk_index {
            absolute_offset(&table_prefix, &table, offsets.start_offset(local_index + 1)?)?
        } else {
            self.enclosing_section_end(&table_prefix, begin)?
        };

        let len = end
            .checked_sub(begin)
            .filter(|len| *len <= i32::MAX as u64)
            .ok_or_else(|| EwfError::Format {
                path: table_prefix.path.clone(),
                offset: begin,
                reason: format!("chunk {chunk_index} spans an invalid range {begin:#x}..{end:#x}"),
            })? as usize;

        if offsets.is_compressed(local_index)? {
            trace!("chunk {chunk_index} is stored compressed in {len} bytes");
            self.io
                .read_compressed(&table_prefix.path, begin, len, self.chunk_size)
        } else {
            trace!("chunk {chunk_index} is stored raw in {len} bytes");
            let mut bytes = self.io.read_checksummed(&table_prefix.path, begin, len)?;
            bytes.truncate(len - 4);
            Ok(bytes)
        }
    }

    /// End offset of the section whose range strictly encloses `begin` in
    /// the same segment file as `table_prefix`.
    fn enclosing_section_end(&self, table_prefix: &SectionPrefix, begin: u64) -> Result<u64> {
        self.sections
            .iter()
            .find(|prefix| {
                prefix.path == table_prefix.path
                    && prefix.file_offset < begin
                    && prefix.next_offset > begin
            })
            .map(|prefix| prefix.next_offset)
            .ok_or_else(|| EwfError::Sequence {
                path: table_prefix.path.clone(),
                reason: format!("no section encloses chunk data at offset {begin:#x}"),
            })
    }
}

/// Walks the section chain across all chained segment files, starting at
/// the fixed first-section offset of the first file.
fn scan_sections(io: &mut SegmentIo, first_path: &Path) -> Result<Vec<SectionPrefix>> {
    let mut sections = Vec::new();
    let mut path = first_path.to_path_buf();
    let mut offset = FIRST_SECTION_OFFSET;
    let mut chunk_index = 0;

    loop {
        let prefix = SectionPrefix::read(io, &path, offset, chunk_index)?;
        offset = prefix.next_offset;
        chunk_index = prefix.next_chunk_index;

        match prefix.kind {
            SectionKind::Next => {
                path = filename::next_segment_path(&path)?;
                offset = FIRST_SECTION_OFFSET;
                debug!("media continues in segment file {}", path.display());
                sections.push(prefix);
            }
            SectionKind::Done => {
                sections.push(prefix);
                break;
            }
            _ => {
                if prefix.next_offset <= prefix.file_offset {
                    return Err(EwfError::Format {
                        path: prefix.path,
                        offset: prefix.file_offset,
                        reason: format!(
                            "section chain does not advance: next offset {:#x} is not past {:#x}",
                            prefix.next_offset, prefix.file_offset
                        ),
                    });
                }
                sections.push(prefix);
            }
        }
    }

    Ok(sections)
}

/// Chunk size from the first volume section, or the default when the
/// container carries none.
fn derive_chunk_size(io: &mut SegmentIo, sections: &[SectionPrefix]) -> Result<usize> {
    let Some(prefix) = sections
        .iter()
        .find(|prefix| prefix.kind == SectionKind::Volume)
    else {
        debug!("no volume section, assuming chunk size {DEFAULT_CHUNK_SIZE}");
        return Ok(DEFAULT_CHUNK_SIZE);
    };

    let volume = VolumeParameters::read(io, prefix)?;
    let chunk_size = volume.chunk_size();
    if chunk_size == 0 || chunk_size > i32::MAX as u64 {
        return Err(EwfError::Format {
            path: prefix.path.clone(),
            offset: prefix.file_offset,
            reason: format!(
                "chunk size {chunk_size} ({} sectors of {} bytes) is out of range",
                volume.sectors_per_chunk, volume.bytes_per_sector
            ),
        });
    }
    debug!("chunk size {chunk_size} from the volume section");
    Ok(chunk_size as usize)
}

fn absolute_offset(
    prefix: &SectionPrefix,
    table: &TableParameters,
    relative: u32,
) -> Result<u64> {
    table
        .base_offset
        .checked_add(i64::from(relative))
        .filter(|offset| *offset >= 0)
        .map(|offset| offset as u64)
        .ok_or_else(|| EwfError::Format {
            path: prefix.path.clone(),
            offset: prefix.file_offset,
            reason: format!(
                "chunk offset {relative:#x} with base {:#x} falls outside the file",
                table.base_offset
            ),
        })
}

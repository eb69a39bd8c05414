//! Byte access to segment files
//!
//! One validated file handle is held open at a time; reading from a
//! different segment closes the previous handle first. Checksummed reads
//! verify a trailing little-endian Adler-32, and compressed reads run a
//! bounded single-shot zlib inflate through reusable scratch state.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use adler2::adler32_slice;
use byteorder::{ByteOrder, LittleEndian};
use flate2::{Decompress, FlushDecompress, Status};
use tracing::{debug, error, trace};

use crate::error::{EwfError, Result};

/// Signature at offset 0 of every segment file.
pub const EWF_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00];

/// File offset of the first section in every segment file.
pub const FIRST_SECTION_OFFSET: u64 = 13;

/// Chunk size assumed when no volume section declares one.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 512;

/// Longest checksum-failure region echoed into the log.
const LOG_DUMP_LIMIT: usize = 64;

#[derive(Debug)]
struct OpenSegment {
    path: PathBuf,
    file: File,
}

impl OpenSegment {
    fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|source| EwfError::Io {
            path: path.to_path_buf(),
            offset: 0,
            source,
        })?;

        let mut signature = [0u8; EWF_SIGNATURE.len()];
        file.read_exact(&mut signature).map_err(|source| EwfError::Io {
            path: path.to_path_buf(),
            offset: 0,
            source,
        })?;
        if signature != EWF_SIGNATURE {
            return Err(EwfError::Format {
                path: path.to_path_buf(),
                offset: 0,
                reason: format!("invalid segment file signature {}", hex::encode(signature)),
            });
        }

        debug!("opened segment file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }
}

/// Reader over one segment file at a time.
#[derive(Debug)]
pub struct SegmentIo {
    open: Option<OpenSegment>,
    inflater: Decompress,
}

impl SegmentIo {
    /// Creates an idle reader with no file open.
    pub fn new() -> Self {
        Self {
            open: None,
            inflater: Decompress::new(true),
        }
    }

    /// Closes the currently open segment file, if any.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            trace!("closed segment file {}", open.path.display());
        }
    }

    /// Reads exactly `len` bytes at `offset`.
    pub fn read_raw(&mut self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
        let open = self.ensure_open(path)?;
        let mut bytes = vec![0u8; len];
        open.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| open.file.read_exact(&mut bytes))
            .map_err(|source| EwfError::Io {
                path: path.to_path_buf(),
                offset,
                source,
            })?;
        trace!("read {len} bytes from {} at {offset:#x}", path.display());
        Ok(bytes)
    }

    /// Reads `len` bytes whose final 4 bytes are a little-endian Adler-32
    /// checksum of the preceding bytes, and verifies it.
    ///
    /// Returns the full region, trailing checksum included.
    pub fn read_checksummed(&mut self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
        if len <= 4 {
            return Err(EwfError::Format {
                path: path.to_path_buf(),
                offset,
                reason: format!("checksummed region of {len} bytes is too short"),
            });
        }

        let bytes = self.read_raw(path, offset, len)?;
        let (data, trailer) = bytes.split_at(len - 4);
        let expected = LittleEndian::read_u32(trailer);
        let computed = adler32_slice(data);
        if computed != expected {
            error!(
                "Adler-32 mismatch in {} at {offset:#x}: expected {expected:#010x}, computed {computed:#010x}, region {}",
                path.display(),
                dump(&bytes),
            );
            return Err(EwfError::Checksum {
                path: path.to_path_buf(),
                offset,
                expected,
                computed,
            });
        }
        Ok(bytes)
    }

    /// Reads `len` bytes at `offset` and inflates them as a single zlib
    /// stream bounded to `max_out` bytes of output.
    ///
    /// The stream must end within the bound; the output may be shorter
    /// than `max_out`, as it is for the final chunk of an image.
    pub fn read_compressed(
        &mut self,
        path: &Path,
        offset: u64,
        len: usize,
        max_out: usize,
    ) -> Result<Vec<u8>> {
        let input = self.read_raw(path, offset, len)?;

        let mut output = vec![0u8; max_out];
        self.inflater.reset(true);
        let status = self
            .inflater
            .decompress(&input, &mut output, FlushDecompress::Finish)
            .map_err(|err| EwfError::Compression {
                path: path.to_path_buf(),
                offset,
                reason: err.to_string(),
            })?;
        match status {
            Status::StreamEnd => {}
            Status::Ok | Status::BufError => {
                return Err(EwfError::Compression {
                    path: path.to_path_buf(),
                    offset,
                    reason: format!(
                        "stream did not end within {max_out} output bytes ({} consumed, {} produced)",
                        self.inflater.total_in(),
                        self.inflater.total_out()
                    ),
                });
            }
        }

        let produced = self.inflater.total_out() as usize;
        output.truncate(produced);
        trace!(
            "inflated {len} bytes into {produced} from {} at {offset:#x}",
            path.display()
        );
        Ok(output)
    }

    fn ensure_open(&mut self, path: &Path) -> Result<&mut OpenSegment> {
        let reuse = self.open.as_ref().is_some_and(|open| open.path == path);
        if !reuse {
            self.close();
            self.open = Some(OpenSegment::open(path)?);
        }
        // the slot is occupied on both paths above
        self.open.as_mut().ok_or_else(|| EwfError::Io {
            path: path.to_path_buf(),
            offset: 0,
            source: std::io::Error::other("segment file handle not open"),
        })
    }
}

impl Default for SegmentIo {
    fn default() -> Self {
        Self::new()
    }
}

fn dump(bytes: &[u8]) -> String {
    if bytes.len() > LOG_DUMP_LIMIT {
        format!(
            "{}.. ({} bytes)",
            hex::encode(&bytes[..LOG_DUMP_LIMIT]),
            bytes.len()
        )
    } else {
        hex::encode(bytes)
    }
}

//! Error types for EWF container reading

use std::path::PathBuf;

use thiserror::Error;

/// Result type for EWF operations
pub type Result<T> = std::result::Result<T, EwfError>;

/// EWF error types
#[derive(Error, Debug)]
pub enum EwfError {
    /// The container bytes violate the format layout
    #[error("Invalid format in {} at offset {offset:#x}: {reason}", path.display())]
    Format {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// Adler-32 verification of a checksummed region failed
    #[error(
        "Checksum mismatch in {} at offset {offset:#x}: expected {expected:#010x}, computed {computed:#010x}",
        path.display()
    )]
    Checksum {
        path: PathBuf,
        offset: u64,
        expected: u32,
        computed: u32,
    },

    /// A zlib chunk stream failed to inflate within its bound
    #[error("Decompression failed in {} at offset {offset:#x}: {reason}", path.display())]
    Compression {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// The underlying file could not be read
    #[error("IO error in {} at offset {offset:#x}: {source}", path.display())]
    Io {
        path: PathBuf,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// The segment chain or chunk sequence is inconsistent
    #[error("Sequence error for {}: {reason}", path.display())]
    Sequence { path: PathBuf, reason: String },
}

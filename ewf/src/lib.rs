//! Reader for the EWF/E01 forensic disk-image container format
//!
//! An E01 container stores a disk image as checksummed, optionally
//! zlib-compressed chunks inside typed sections, spanning one or more
//! sequentially named segment files (`.E01`, `.E02`, ...). This crate
//! walks the full section chain at open time and then serves
//! random-access reads over the reassembled media image.
//!
//! ```no_run
//! use ewf::EwfReader;
//!
//! # fn main() -> ewf::Result<()> {
//! let mut reader = EwfReader::open("evidence.E01")?;
//! let boot_sector = reader.read_image_bytes(0, 512)?;
//! println!(
//!     "media image is {} bytes, first {} read",
//!     reader.image_size(),
//!     boot_sector.len()
//! );
//! reader.close();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod filename;
pub mod header;
pub mod reader;
pub mod section;
pub mod segment;
pub mod table;
pub mod volume;

pub use error::{EwfError, Result};
pub use reader::EwfReader;
pub use section::{SectionKind, SectionPrefix};
pub use segment::{DEFAULT_CHUNK_SIZE, EWF_SIGNATURE, FIRST_SECTION_OFFSET};

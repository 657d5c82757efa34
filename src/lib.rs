//! Streaming reader and writer for tar archives.
//!
//! This crate reads and writes POSIX ustar archives, including the GNU long
//! name and long link extensions, without ever seeking: a reader only needs
//! [`std::io::Read`] and a writer only [`std::io::Write`].
//!
//! # Archive Layout
//!
//! An archive is a sequence of 512-byte blocks:
//!
//! - every entry starts with one header block (see [`Header`] for the field
//!   layout);
//! - the entry content follows, padded with zeros to the next block boundary;
//! - two all-zero blocks terminate the archive.
//!
//! Names that do not fit the 100-byte name field are carried by a GNU long
//! name annotation (type 'L') placed in front of the entry. The reader folds
//! annotations into the entry they describe; the writer emits them
//! automatically.
//!
//! # Leniencies
//!
//! - Header checksums are never verified on read.
//! - Headers without the ustar magic are read as pre-POSIX headers; a name
//!   ending in a separator marks a directory.
//! - A missing terminator is accepted: a clean end of data where a header is
//!   expected ends the archive.
//!
//! # Example
//!
//! ```
//! use std::io::{Cursor, Read};
//! use startar::{FileMetadata, TarReader, TarWriter};
//!
//! let mut writer = TarWriter::new(Vec::new());
//! writer.write_file_entry("hello.txt", &FileMetadata::new(5))?;
//! writer.write_content(&b"hello"[..])?;
//! let archive = writer.into_inner()?;
//!
//! let mut reader = TarReader::new(Cursor::new(archive));
//! let mut entry = reader.next_entry()?.expect("one entry");
//! assert_eq!(entry.header().name(), "hello.txt");
//! let mut content = String::new();
//! entry.read_to_string(&mut content)?;
//! assert_eq!(content, "hello");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod annotations;
mod entry;
mod error;
pub mod header;
mod limits;
mod mode;
mod path;
mod reader;
mod unpack;
mod util;
mod writer;

pub use annotations::Annotations;
pub use entry::EntryStream;
pub use error::{Result, TarError};
pub use header::{
    compute_checksum, truncate_null, EntryType, Header, HeaderBuilder, HeaderFormat,
    LONG_LINK_NAME,
};
pub use limits::Limits;
pub use mode::{FileMode, FileModeGroup};
pub use reader::TarReader;
pub use unpack::UnpackOptions;
pub use util::padding_len;
pub use writer::{FileMetadata, TarWriter};

/// Size of a header block, and the unit all content is padded to.
pub const BLOCK_SIZE: usize = 512;

//! Error types for archive encoding and decoding.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `Result<T, TarError>`. Errors are raised at the point of detection and are
//! never retried internally.
//!
//! Checksum mismatches are deliberately *not* an error: decoded headers keep
//! the stored checksum (see [`Header::checksum`]) but it is never verified.
//!
//! [`Header::checksum`]: crate::Header::checksum

use std::{io, path::PathBuf};

use crate::EntryType;

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, TarError>;

/// Errors that can occur while reading or writing an archive.
#[derive(Debug, thiserror::Error)]
pub enum TarError {
    /// A required input was missing or unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value does not fit the fixed-width header slot it is stored in.
    #[error("{field} is too long: {len} > {max}")]
    FieldTooLong {
        /// Name of the header field.
        field: &'static str,
        /// Encoded length of the rejected value.
        len: usize,
        /// Largest length the slot accepts.
        max: usize,
    },

    /// The underlying stream ended in the middle of a header or entry content.
    #[error("truncated archive: unexpected end of data at byte {position}")]
    TruncatedArchive {
        /// Absolute stream position where the data ran out.
        position: u64,
    },

    /// A numeric header field holds something other than octal digits.
    #[error("invalid octal number in {field}: {:?}", String::from_utf8_lossy(.value))]
    InvalidOctal {
        /// Name of the header field.
        field: &'static str,
        /// The raw field bytes.
        value: Vec<u8>,
    },

    /// Extraction met an entry type it does not materialize.
    #[error("entries of type {entry_type:?} are not supported ({path})")]
    UnsupportedEntryType {
        /// Archive path of the entry.
        path: String,
        /// The entry type found in the header.
        entry_type: EntryType,
    },

    /// An extraction path resolves outside of the destination directory.
    #[error("{path} is outside of the target directory {target:?}")]
    PathEscapesTarget {
        /// Archive path of the offending entry.
        path: String,
        /// The destination directory.
        target: PathBuf,
    },

    /// An operation was attempted on an object that was already released.
    #[error("{0} has already been finished")]
    UseAfterRelease(&'static str),

    /// A GNU long name/link annotation is larger than the configured limit.
    #[error("annotation exceeds limit: {size} bytes > {limit} bytes")]
    AnnotationTooLarge {
        /// Declared size of the annotation content.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Too many annotations precede a single entry.
    #[error("too many pending annotations: {count} > {limit}")]
    TooManyAnnotations {
        /// Number of annotations seen so far.
        count: usize,
        /// Configured limit.
        limit: usize,
    },

    /// I/O error from the underlying stream or the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<TarError> for io::Error {
    fn from(err: TarError) -> Self {
        match err {
            TarError::Io(err) => err,
            err @ TarError::TruncatedArchive { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err)
            }
            err @ (TarError::InvalidArgument(_)
            | TarError::FieldTooLong { .. }
            | TarError::UseAfterRelease(_)) => io::Error::new(io::ErrorKind::InvalidInput, err),
            err => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}

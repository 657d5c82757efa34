//! GNU long name and long link handling on the read side.
//!
//! A name or link target longer than its 100-byte slot is stored in an
//! annotation entry (type 'L' or 'K') placed right before the real entry.
//! The annotation's content is the full value, NUL-terminated and padded
//! like any other content.

use std::io::Read;

use log::debug;

use crate::{header::truncate_null, EntryStream, EntryType, Header, Limits, Result, TarError};

/// Long values collected from the annotations preceding one entry.
///
/// Repeated annotations of the same kind overwrite each other; the last one
/// wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Annotations {
    long_name: Option<String>,
    long_link: Option<String>,
    count: usize,
}

impl Annotations {
    /// Create an empty set of annotations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb `entry` if it is an annotation.
    ///
    /// For a long name or long link entry the whole content is read and
    /// stored, and `true` is returned. Any other entry is left untouched and
    /// `false` is returned: it is the real entry the annotations belong to.
    ///
    /// # Errors
    ///
    /// Fails with [`TarError::AnnotationTooLarge`] or
    /// [`TarError::TooManyAnnotations`] when `limits` are exceeded, and with
    /// [`TarError::TruncatedArchive`] if the content is cut short.
    pub fn try_absorb<R: Read>(
        &mut self,
        entry: &mut EntryStream<'_, R>,
        limits: &Limits,
    ) -> Result<bool> {
        let entry_type = entry.header().entry_type();
        if !entry_type.is_annotation() {
            return Ok(false);
        }

        let size = entry.len();
        if size > limits.max_annotation_size {
            return Err(TarError::AnnotationTooLarge {
                size,
                limit: limits.max_annotation_size,
            });
        }
        if self.count >= limits.max_pending_annotations {
            return Err(TarError::TooManyAnnotations {
                count: self.count + 1,
                limit: limits.max_pending_annotations,
            });
        }

        let data = entry.read_to_vec()?;
        let value = String::from_utf8_lossy(truncate_null(&data)).into_owned();
        debug!("absorbed {entry_type:?} annotation of {size} bytes: {value}");

        if entry_type == EntryType::GnuLongName {
            self.long_name = Some(value);
        } else {
            self.long_link = Some(value);
        }
        self.count += 1;
        Ok(true)
    }

    /// The absorbed long name, if any.
    #[must_use]
    pub fn long_name(&self) -> Option<&str> {
        self.long_name.as_deref()
    }

    /// The absorbed long link target, if any.
    #[must_use]
    pub fn long_link(&self) -> Option<&str> {
        self.long_link.as_deref()
    }

    /// Number of annotations absorbed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if nothing was absorbed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Apply the long values to `header`. All other fields are kept.
    #[must_use]
    pub fn merge_into(&self, header: Header) -> Header {
        header.with_long_values(self.long_name(), self.long_link())
    }
}

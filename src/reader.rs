//! Sequential archive reader.

use std::io::Read;

use log::{debug, warn};

use crate::{
    util::{padding_len, PositionReader},
    Annotations, EntryStream, Header, Limits, Result, TarError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// The next read is a header.
    Ready,
    /// An entry was handed out; its content ends at `content_end` and is
    /// followed by `padding` zero bytes.
    EntryActive { content_end: u64, padding: u64 },
    /// End of archive reached.
    Finished,
}

/// Reads entries from an archive one at a time.
///
/// Long name and long link annotations are resolved transparently: the
/// returned entries carry the full names, and annotation entries themselves
/// are never returned.
///
/// The transport only needs to implement [`Read`]; nothing is ever seeked.
/// Content the caller did not read is discarded (together with its block
/// padding) on the next call to [`next_entry`](Self::next_entry).
///
/// # Example
///
/// ```no_run
/// use std::{fs::File, io::{BufReader, Read}};
/// use startar::TarReader;
///
/// let file = File::open("archive.tar")?;
/// let mut reader = TarReader::new(BufReader::new(file));
///
/// while let Some(mut entry) = reader.next_entry()? {
///     println!("{}", entry.header().path());
///     let mut content = Vec::new();
///     entry.read_to_end(&mut content)?;
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct TarReader<R> {
    inner: PositionReader<R>,
    limits: Limits,
    state: State,
}

impl<R: Read> TarReader<R> {
    /// Create a reader with default [`Limits`].
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, Limits::default())
    }

    /// Create a reader with the given limits.
    pub fn with_limits(reader: R, limits: Limits) -> Self {
        Self {
            inner: PositionReader::new(reader),
            limits,
            state: State::Ready,
        }
    }

    /// Number of bytes consumed from the transport so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    /// The configured limits.
    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Returns true once the end of the archive was reached.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    /// Consume the reader and return the underlying transport.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    /// Get the next entry.
    ///
    /// Returns `Ok(None)` at the end of the archive, and keeps doing so on
    /// further calls. The end is two empty blocks, or a clean end of data
    /// where a header was expected. Annotations with no entry after them
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TarError::TruncatedArchive`] if the transport ends inside a
    /// header, inside unread content of the previous entry or inside an
    /// annotation; [`TarError::InvalidOctal`] for malformed numeric fields;
    /// and the limit errors described on [`Limits`]. After an error the
    /// reader is finished and further calls return `Ok(None)`.
    pub fn next_entry(&mut self) -> Result<Option<EntryStream<'_, R>>> {
        if self.state == State::Finished {
            return Ok(None);
        }

        // After any error the transport may sit inside a header, an
        // annotation or content, so nothing more is read.
        let next = self.close_active_entry().and_then(|()| {
            if self.state == State::Finished {
                return Ok(None);
            }
            self.read_header()
        });
        let header = match next {
            Ok(Some(header)) => header,
            Ok(None) => {
                self.state = State::Finished;
                return Ok(None);
            }
            Err(err) => {
                self.state = State::Finished;
                return Err(err);
            }
        };

        debug!(
            "entry {} ({:?}, {} bytes) at {}",
            header.path(),
            header.entry_type(),
            header.size(),
            self.inner.position()
        );

        let size = header.size();
        let Some(content_end) = self.inner.position().checked_add(size) else {
            self.state = State::Finished;
            return Err(TarError::InvalidArgument(format!(
                "entry size {size} overflows the stream position"
            )));
        };
        self.state = State::EntryActive {
            content_end,
            padding: padding_len(size),
        };
        Ok(Some(EntryStream::new(header, &mut self.inner)))
    }

    /// Read the next real header and fold the annotations in front of it.
    /// Returns `None` at the end of the archive.
    fn read_header(&mut self) -> Result<Option<Header>> {
        let mut annotations = Annotations::new();
        let header = loop {
            let Some(header) = Header::decode_from(&mut self.inner)? else {
                if !annotations.is_empty() {
                    debug!("ignoring {} trailing annotation(s)", annotations.len());
                }
                debug!("end of archive at {}", self.inner.position());
                return Ok(None);
            };

            let size = header.size();
            let mut entry = EntryStream::new(header, &mut self.inner);
            if !annotations.try_absorb(&mut entry, &self.limits)? {
                break entry.into_header();
            }
            if !self.skip_padding(padding_len(size))? {
                return Ok(None);
            }
        };
        Ok(Some(annotations.merge_into(header)))
    }

    /// Skip whatever the caller left of the active entry, plus its padding.
    fn close_active_entry(&mut self) -> Result<()> {
        let State::EntryActive {
            content_end,
            padding,
        } = self.state
        else {
            return Ok(());
        };
        self.state = State::Ready;

        let unread = content_end.saturating_sub(self.inner.position());
        if self.inner.discard(unread)? < unread {
            return Err(TarError::TruncatedArchive {
                position: self.inner.position(),
            });
        }
        if !self.skip_padding(padding)? {
            self.state = State::Finished;
        }
        Ok(())
    }

    /// Discard `padding` bytes. Returns false if the transport ended first,
    /// which is tolerated: the content itself was complete.
    fn skip_padding(&mut self, padding: u64) -> Result<bool> {
        let skipped = self.inner.discard(padding)?;
        if skipped < padding {
            warn!(
                "archive ends inside block padding at {} ({} of {padding} bytes)",
                self.inner.position(),
                skipped
            );
            return Ok(false);
        }
        Ok(true)
    }
}

impl<R: Read> Iterator for TarReader<R> {
    type Item = Result<Header>;

    /// Iterate over headers only, skipping all content.
    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry()
            .map(|entry| entry.map(|entry| entry.header().clone()))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::{EntryType, BLOCK_SIZE};

    fn header_block(entry_type: EntryType, name: &str, size: u64) -> Vec<u8> {
        let mut builder = Header::builder(entry_type);
        builder.name(name).unwrap().size(size).unwrap();
        builder.build().to_block().unwrap().to_vec()
    }

    fn content_blocks(content: &[u8]) -> Vec<u8> {
        let mut data = content.to_vec();
        data.resize(data.len() + padding_len(content.len() as u64) as usize, 0);
        data
    }

    fn archive(parts: &[Vec<u8>]) -> Vec<u8> {
        let mut data = parts.concat();
        data.extend_from_slice(&[0u8; 2 * BLOCK_SIZE]);
        data
    }

    #[test]
    fn test_empty_archive() {
        let mut reader = TarReader::new(Cursor::new(vec![0u8; 2 * BLOCK_SIZE]));
        assert!(reader.next_entry().unwrap().is_none());
        assert!(reader.is_finished());
        // idempotent
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_missing_terminator_is_tolerated() {
        let data = [
            header_block(EntryType::Regular, "a.txt", 3),
            content_blocks(b"abc"),
        ]
        .concat();
        let mut reader = TarReader::new(Cursor::new(data));
        assert!(reader.next_entry().unwrap().is_some());
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_unread_content_is_skipped() {
        let data = archive(&[
            header_block(EntryType::Regular, "first", 600),
            content_blocks(&[b'x'; 600]),
            header_block(EntryType::Regular, "second", 5),
            content_blocks(b"hello"),
        ]);
        let mut reader = TarReader::new(Cursor::new(data));

        let mut first = reader.next_entry().unwrap().unwrap();
        assert_eq!(first.header().name(), "first");
        let mut partial = [0u8; 10];
        first.read_exact(&mut partial).unwrap();

        let mut second = reader.next_entry().unwrap().unwrap();
        assert_eq!(second.header().name(), "second");
        let mut content = String::new();
        second.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");

        assert!(reader.next_entry().unwrap().is_none());
        assert_eq!(reader.position(), 7 * BLOCK_SIZE as u64);
    }

    #[test]
    fn test_long_name_annotation_is_merged() {
        let long_name = format!("{}/file.txt", "d".repeat(140));
        let mut annotation = long_name.as_bytes().to_vec();
        annotation.push(0);

        let data = archive(&[
            header_block(
                EntryType::GnuLongName,
                crate::LONG_LINK_NAME,
                annotation.len() as u64,
            ),
            content_blocks(&annotation),
            header_block(EntryType::Regular, &long_name[..99], 2),
            content_blocks(b"hi"),
        ]);
        let mut reader = TarReader::new(Cursor::new(data));

        let mut entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().name(), long_name.as_str());
        assert_eq!(entry.read_to_vec().unwrap(), b"hi".to_vec());
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_annotation_at_end_is_ignored() {
        let data = archive(&[
            header_block(EntryType::GnuLongName, crate::LONG_LINK_NAME, 4),
            content_blocks(b"abc\0"),
        ]);
        let mut reader = TarReader::new(Cursor::new(data));
        assert!(reader.next_entry().unwrap().is_none());
        assert!(reader.is_finished());
    }

    #[test]
    fn test_truncated_unread_content() {
        let mut data = header_block(EntryType::Regular, "big", 4096);
        data.extend_from_slice(&[1u8; 100]);
        let mut reader = TarReader::new(Cursor::new(data));

        assert!(reader.next_entry().unwrap().is_some());
        let err = reader.next_entry().unwrap_err();
        assert!(matches!(err, TarError::TruncatedArchive { position: 612 }));
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_truncated_padding_is_tolerated() {
        let mut data = header_block(EntryType::Regular, "small", 3);
        data.extend_from_slice(b"abc");
        let mut reader = TarReader::new(Cursor::new(data));

        let mut entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.read_to_vec().unwrap(), b"abc".to_vec());
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_truncated_header() {
        let mut data = header_block(EntryType::Regular, "a", 0);
        data.extend_from_slice(&header_block(EntryType::Regular, "b", 0)[..100]);
        let mut reader = TarReader::new(Cursor::new(data));

        assert!(reader.next_entry().unwrap().is_some());
        assert!(matches!(
            reader.next_entry(),
            Err(TarError::TruncatedArchive { position: 612 })
        ));
    }

    #[test]
    fn test_iterate_headers() {
        let data = archive(&[
            header_block(EntryType::Directory, "dir/", 0),
            header_block(EntryType::Regular, "dir/a", 3),
            content_blocks(b"abc"),
            header_block(EntryType::Symlink, "dir/link", 0),
        ]);
        let names: Vec<String> = TarReader::new(Cursor::new(data))
            .map(|header| header.unwrap().name().to_owned())
            .collect();
        assert_eq!(names, vec!["dir/", "dir/a", "dir/link"]);
    }

    #[test]
    fn test_strict_limits_reject_oversized_annotation() {
        let name = "x".repeat(5000);
        let data = archive(&[
            header_block(EntryType::GnuLongName, crate::LONG_LINK_NAME, 5001),
            content_blocks(format!("{name}\0").as_bytes()),
            header_block(EntryType::Regular, "x", 0),
        ]);
        let mut reader = TarReader::with_limits(Cursor::new(data), Limits::strict());
        assert!(matches!(
            reader.next_entry(),
            Err(TarError::AnnotationTooLarge { size: 5001, .. })
        ));
    }

    #[test]
    fn test_no_entries_after_annotation_limit_error() {
        // An annotation whose content looks like a header of its own.
        let mut content = header_block(EntryType::Regular, "forged.txt", 0);
        content.resize(5000, 0);
        let data = archive(&[
            header_block(EntryType::GnuLongName, crate::LONG_LINK_NAME, 5000),
            content_blocks(&content),
            header_block(EntryType::Regular, "real.txt", 0),
        ]);
        let mut reader = TarReader::with_limits(Cursor::new(data), Limits::strict());

        assert!(matches!(
            reader.next_entry(),
            Err(TarError::AnnotationTooLarge {
                size: 5000,
                limit: 4096
            })
        ));
        assert!(reader.is_finished());
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_no_entries_after_invalid_header() {
        let mut bad = header_block(EntryType::Regular, "bad", 0);
        bad[100..108].copy_from_slice(b"zzzzzzzz");
        let data = archive(&[bad, header_block(EntryType::Regular, "next", 0)]);
        let mut reader = TarReader::new(Cursor::new(data));

        assert!(matches!(
            reader.next_entry(),
            Err(TarError::InvalidOctal { field: "mode", .. })
        ));
        assert!(reader.is_finished());
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_no_entries_after_truncated_annotation() {
        let mut data = header_block(EntryType::GnuLongName, crate::LONG_LINK_NAME, 1000);
        data.extend_from_slice(&header_block(EntryType::Regular, "inner", 0)[..]);
        let mut reader = TarReader::new(Cursor::new(data));

        assert!(matches!(
            reader.next_entry(),
            Err(TarError::TruncatedArchive { position: 1024 })
        ));
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let mut bad = header_block(EntryType::Regular, "bad", 0);
        bad[124..136].copy_from_slice(b"not a size\0\0");
        let data = archive(&[
            header_block(EntryType::Regular, "good", 0),
            bad,
            header_block(EntryType::Regular, "after", 0),
        ]);
        let results: Vec<_> = TarReader::new(Cursor::new(data)).collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().name(), "good");
        assert!(matches!(
            results[1],
            Err(TarError::InvalidOctal { field: "size", .. })
        ));
    }
}

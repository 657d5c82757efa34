//! Bounded view over the content of one archive entry.

use std::io::{self, ErrorKind, Read, Write};

use crate::{util::PositionReader, Header, Result, TarError};

/// The content of a single entry, as returned by [`TarReader::next_entry`].
///
/// Reads are capped at the size declared in the header: once that many bytes
/// have been consumed the stream reports end-of-data without touching the
/// underlying transport. If the transport ends first, reads fail with
/// [`TarError::TruncatedArchive`] (surfaced through [`Read`] as
/// [`ErrorKind::UnexpectedEof`]).
///
/// The stream mutably borrows the reader, so it cannot outlive the next call
/// to [`TarReader::next_entry`]. Unread content is skipped by the reader, not
/// by the stream. There is no `Write` or `Seek` implementation.
///
/// [`TarReader::next_entry`]: crate::TarReader::next_entry
#[derive(Debug)]
pub struct EntryStream<'a, R> {
    header: Header,
    inner: &'a mut PositionReader<R>,
    length: u64,
    consumed: u64,
}

impl<'a, R: Read> EntryStream<'a, R> {
    pub(crate) fn new(header: Header, inner: &'a mut PositionReader<R>) -> Self {
        let length = header.size();
        Self {
            header,
            inner,
            length,
            consumed: 0,
        }
    }

    /// The entry header, with any long name/link annotations applied.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Declared content length.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Returns true if the entry has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of content bytes read so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.consumed
    }

    /// Number of content bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.length - self.consumed
    }

    pub(crate) fn into_header(self) -> Header {
        self.header
    }

    /// Copy the remaining content into `writer`, returning the byte count.
    ///
    /// Unlike [`io::copy`], a truncated archive is reported as
    /// [`TarError::TruncatedArchive`] rather than a plain I/O error.
    pub fn copy_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> Result<u64> {
        let mut buf = [0u8; 8192];
        let mut copied = 0;
        loop {
            let n = self.read_bounded(&mut buf)?;
            if n == 0 {
                return Ok(copied);
            }
            writer.write_all(&buf[..n])?;
            copied += n as u64;
        }
    }

    /// Read the remaining content into memory.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(usize::try_from(self.remaining()).unwrap_or(0));
        self.copy_to(&mut data)?;
        Ok(data)
    }

    fn read_bounded(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = loop {
            match self.inner.read(&mut buf[..max]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Err(TarError::TruncatedArchive {
                position: self.inner.position(),
            });
        }
        self.consumed += n as u64;
        Ok(n)
    }
}

impl<R: Read> Read for EntryStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bounded(buf).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::EntryType;

    fn header_with_size(size: u64) -> Header {
        let mut builder = Header::builder(EntryType::Regular);
        builder.name("entry").unwrap().size(size).unwrap();
        builder.build()
    }

    #[test]
    fn test_reads_stop_at_declared_length() {
        let mut inner = PositionReader::new(Cursor::new(b"hello world".to_vec()));
        let mut entry = EntryStream::new(header_with_size(5), &mut inner);

        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");
        assert_eq!(entry.remaining(), 0);

        // further reads do not touch the transport
        let mut buf = [0u8; 4];
        assert_eq!(entry.read(&mut buf).unwrap(), 0);
        drop(entry);
        assert_eq!(inner.position(), 5);
    }

    #[test]
    fn test_truncated_content() {
        let mut inner = PositionReader::new(Cursor::new(b"abc".to_vec()));
        let mut entry = EntryStream::new(header_with_size(10), &mut inner);

        let err = entry.read_to_vec().unwrap_err();
        assert!(matches!(err, TarError::TruncatedArchive { position: 3 }));
    }

    #[test]
    fn test_truncated_content_through_read_trait() {
        let mut inner = PositionReader::new(Cursor::new(b"abc".to_vec()));
        let mut entry = EntryStream::new(header_with_size(10), &mut inner);

        let mut buf = Vec::new();
        let err = entry.read_to_end(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert_eq!(buf, b"abc".to_vec());
    }

    #[test]
    fn test_empty_entry() {
        let mut inner = PositionReader::new(Cursor::new(Vec::new()));
        let mut entry = EntryStream::new(header_with_size(0), &mut inner);
        assert!(entry.is_empty());
        assert_eq!(entry.read_to_vec().unwrap(), Vec::<u8>::new());
    }
}

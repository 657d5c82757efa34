use std::io::{self, ErrorKind, Read, Write};

use log::trace;

use crate::{Result, TarError, BLOCK_SIZE};

const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Number of zero bytes needed after `len` bytes of content to reach the next
/// block boundary.
#[must_use]
pub fn padding_len(len: u64) -> u64 {
    (BLOCK_SIZE as u64 - len % BLOCK_SIZE as u64) % BLOCK_SIZE as u64
}

/// A reader that counts how many bytes have been pulled from the transport.
///
/// The archive reader relies on the count for exact block accounting: it is
/// the only way to know how much of an entry the caller consumed when the
/// transport itself cannot seek.
#[derive(Debug)]
pub(crate) struct PositionReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> PositionReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn get_ref(&self) -> &R {
        &self.inner
    }

    pub(crate) fn into_inner(self) -> R {
        self.inner
    }

    /// Read and discard exactly `len` bytes.
    ///
    /// Returns the number of bytes actually discarded, which is smaller than
    /// `len` only if the transport ran out of data.
    pub(crate) fn discard(&mut self, len: u64) -> Result<u64> {
        if len == 0 {
            return Ok(0);
        }
        trace!("skipping {len} bytes at {}", self.position);
        let skipped = io::copy(&mut self.by_ref().take(len), &mut io::sink())?;
        Ok(skipped)
    }
}

impl<R: Read> Read for PositionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// This function reads the exact amount of bytes required to fill the buffer, possibly performing
/// multiple reads to do so (and also retrying if required to deal with EINTR).
///
/// Unlike [`Read::read_exact`], a "clean" EOF where no bytes at all could be read is reported as
/// `Ok(false)` rather than an error. An EOF after some bytes were read is a truncated archive.
pub(crate) fn read_exactish<R: Read>(reader: &mut PositionReader<R>, buf: &mut [u8]) -> Result<bool> {
    let buflen = buf.len();
    let mut todo: &mut [u8] = buf;

    while !todo.is_empty() {
        match reader.read(todo) {
            Ok(0) => {
                return match todo.len() {
                    s if s == buflen => Ok(false), // clean EOF
                    _ => Err(TarError::TruncatedArchive {
                        position: reader.position(),
                    }),
                };
            }
            Ok(n) => todo = &mut todo[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(true)
}

/// Write the zero bytes that align `written` content bytes to the next block.
pub(crate) fn write_padding<W: Write>(writer: &mut W, written: u64) -> io::Result<()> {
    let padding = padding_len(written) as usize;
    if padding > 0 {
        trace!("padding {written} bytes with {padding} zeros");
        writer.write_all(&ZERO_BLOCK[..padding])?;
    }
    Ok(())
}

/// Write a single all-zero block.
pub(crate) fn write_zero_block<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&ZERO_BLOCK)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_padding_len() {
        assert_eq!(padding_len(0), 0);
        assert_eq!(padding_len(1), 511);
        assert_eq!(padding_len(511), 1);
        assert_eq!(padding_len(512), 0);
        assert_eq!(padding_len(513), 511);
    }

    #[test]
    fn test_read_exactish() {
        let mut reader = PositionReader::new(Cursor::new(vec![1u8; 10]));
        let mut buf = [0u8; 4];
        assert!(read_exactish(&mut reader, &mut buf).unwrap());
        assert!(read_exactish(&mut reader, &mut buf).unwrap());
        assert_eq!(reader.position(), 8);

        // two bytes remain: short read
        let err = read_exactish(&mut reader, &mut buf).unwrap_err();
        assert!(matches!(err, TarError::TruncatedArchive { position: 10 }));

        // nothing remains: clean EOF
        assert!(!read_exactish(&mut reader, &mut buf).unwrap());
    }

    #[test]
    fn test_discard() {
        let mut reader = PositionReader::new(Cursor::new(vec![0u8; 100]));
        assert_eq!(reader.discard(60).unwrap(), 60);
        assert_eq!(reader.discard(60).unwrap(), 40);
        assert_eq!(reader.position(), 100);
    }

    #[test]
    fn test_write_padding() {
        let mut out = Vec::new();
        write_padding(&mut out, 10).unwrap();
        assert_eq!(out.len(), 502);
        assert!(out.iter().all(|&b| b == 0));

        out.clear();
        write_padding(&mut out, 1024).unwrap();
        assert!(out.is_empty());
    }
}

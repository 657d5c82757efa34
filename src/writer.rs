//! Sequential archive writer.

use std::{
    fs::{self, File, Metadata},
    io::{self, Read, Write},
    os::unix::fs::{MetadataExt, PermissionsExt},
    path::Path,
};

use log::{debug, trace, warn};

use crate::{
    header::{LONG_LINK_NAME, NAME_LEN},
    path::{archive_path, normalize_lexically, tar_normalize, tar_normalize_directory},
    util::{write_padding, write_zero_block},
    EntryType, FileModeGroup, Header, HeaderBuilder, Result, TarError,
};

/// Metadata for a regular file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// Content length in bytes.
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: u64,
    /// Permission bits.
    pub mode: FileModeGroup,
    /// Owner user ID.
    pub uid: u64,
    /// Owner group ID.
    pub gid: u64,
}

impl FileMetadata {
    /// Metadata for `size` bytes of content, with mode 777 and everything
    /// else zero.
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            size,
            mtime: 0,
            mode: FileModeGroup::from_bits_truncate(0o777),
            uid: 0,
            gid: 0,
        }
    }

    /// Size, modification time and permission bits of a file on disk.
    /// Ownership is not recorded.
    #[must_use]
    pub fn from_fs(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            mtime: u64::try_from(metadata.mtime()).unwrap_or(0),
            mode: FileModeGroup::from_bits_truncate(metadata.permissions().mode()),
            uid: 0,
            gid: 0,
        }
    }
}

/// Writes an archive entry by entry.
///
/// Every entry is a header followed by exactly as many content bytes as the
/// header announces; the writer pads content to the block size. Paths of
/// 100 bytes or more are stored in a GNU long name annotation written in
/// front of the entry.
///
/// The archive is terminated by [`finish`](Self::finish), which writes two
/// empty blocks. It runs at most once: explicitly, through
/// [`into_inner`](Self::into_inner), or when the writer is dropped. Any
/// write after that fails with [`TarError::UseAfterRelease`].
///
/// # Example
///
/// ```
/// use startar::{FileMetadata, TarWriter};
///
/// let mut writer = TarWriter::new(Vec::new());
/// writer.write_directory_entry("docs", 0)?;
/// writer.write_file_entry("docs/hello.txt", &FileMetadata::new(5))?;
/// writer.write_content(&b"hello"[..])?;
/// let archive = writer.into_inner()?;
/// assert_eq!(archive.len(), 5 * 512);
/// # Ok::<(), startar::TarError>(())
/// ```
#[derive(Debug)]
pub struct TarWriter<W: Write> {
    inner: Option<W>,
    finished: bool,
    /// Content length announced by the last header and not written yet.
    pending_content: Option<u64>,
}

impl<W: Write> TarWriter<W> {
    /// Create a writer on top of `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Some(writer),
            finished: false,
            pending_content: None,
        }
    }

    /// Returns true once the terminator blocks were written.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn writer(&mut self) -> Result<&mut W> {
        if self.finished {
            return Err(TarError::UseAfterRelease("TarWriter"));
        }
        self.inner
            .as_mut()
            .ok_or(TarError::UseAfterRelease("TarWriter"))
    }

    /// Write a header block as-is.
    ///
    /// If the header announces content, it must be supplied with
    /// [`write_content`](Self::write_content) before the next header.
    ///
    /// # Errors
    ///
    /// Fails with [`TarError::InvalidArgument`] if the content of the
    /// previous entry is still missing, and with [`TarError::FieldTooLong`]
    /// if the header cannot be encoded. Nothing is written in either case.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.writer()?;
        if let Some(size) = self.pending_content {
            return Err(TarError::InvalidArgument(format!(
                "the previous entry announced {size} bytes of content that were not written"
            )));
        }

        header.encode(self.writer()?)?;
        debug!("wrote header {header}");

        let size = header.size();
        self.pending_content = (size > 0).then_some(size);
        Ok(())
    }

    /// Copy the content of the current entry from `content`, then pad it to
    /// the block size. Returns the number of content bytes written.
    ///
    /// # Errors
    ///
    /// Fails with [`TarError::InvalidArgument`] if `content` does not yield
    /// exactly the size announced by the last header.
    pub fn write_content<R: Read>(&mut self, mut content: R) -> Result<u64> {
        let expected = self.pending_content.unwrap_or(0);
        let writer = self.writer()?;

        let copied = io::copy(&mut content.by_ref().take(expected), writer)?;
        if copied < expected {
            return Err(TarError::InvalidArgument(format!(
                "content ended after {copied} of {expected} bytes"
            )));
        }
        let mut probe = [0u8; 1];
        if content.read(&mut probe)? > 0 {
            return Err(TarError::InvalidArgument(format!(
                "content is longer than the announced {expected} bytes"
            )));
        }

        write_padding(writer, copied)?;
        trace!("wrote {copied} bytes of content");
        self.pending_content = None;
        Ok(copied)
    }

    /// Write a directory entry. A trailing `/` is added to `path` if missing.
    pub fn write_directory_entry(&mut self, path: &str, mtime: u64) -> Result<()> {
        let path = tar_normalize_directory(path);
        let mut builder = HeaderBuilder::new(EntryType::Directory);
        builder.mtime(mtime)?;
        self.write_entry_header(&path, builder)
    }

    /// Write the header of a regular file entry. The content must follow
    /// with [`write_content`](Self::write_content).
    pub fn write_file_entry(&mut self, path: &str, metadata: &FileMetadata) -> Result<()> {
        let path = tar_normalize(path);
        let mut builder = HeaderBuilder::new(EntryType::Regular);
        builder
            .size(metadata.size)?
            .mtime(metadata.mtime)?
            .uid(metadata.uid)?
            .gid(metadata.gid)?
            .mode(metadata.mode);
        self.write_entry_header(&path, builder)
    }

    /// Add the file at `source` under the archive path `path`, header and
    /// content.
    pub fn append_file(&mut self, path: &str, source: impl AsRef<Path>) -> Result<u64> {
        let mut file = File::open(source.as_ref())?;
        let metadata = FileMetadata::from_fs(&file.metadata()?);
        self.write_file_entry(path, &metadata)?;
        self.write_content(&mut file)
    }

    /// Recursively add the directory `root`.
    ///
    /// Archive paths are relative to the parent of `root`, so the archive
    /// contains `root`'s own name as its top-level directory. With
    /// `skip_top_level` they are relative to `root` itself and no entry is
    /// written for `root`.
    ///
    /// Each directory is written as its entry, then its files, then its
    /// subdirectories, all in name order. Symlinks to regular files are
    /// stored as regular files with the target's content. Anything else that
    /// is neither a regular file nor a directory, symlinks to directories
    /// included, is skipped.
    pub fn write_directory_tree(&mut self, root: impl AsRef<Path>, skip_top_level: bool) -> Result<()> {
        self.writer()?;
        let root = normalize_lexically(&std::path::absolute(root.as_ref())?);
        if !root.is_dir() {
            return Err(TarError::InvalidArgument(format!(
                "{root:?} is not a directory"
            )));
        }

        let base = match root.parent() {
            Some(parent) if !skip_top_level => parent.to_path_buf(),
            _ => root.clone(),
        };
        self.write_tree(&root, &base, skip_top_level)
    }

    fn write_tree(&mut self, dir: &Path, base: &Path, skip_self: bool) -> Result<()> {
        let relative = |path: &Path| {
            path.strip_prefix(base)
                .map_err(|_| TarError::InvalidArgument(format!("{path:?} is outside of {base:?}")))
                .and_then(archive_path)
        };

        if !skip_self {
            let metadata = fs::metadata(dir)?;
            let mtime = u64::try_from(metadata.mtime()).unwrap_or(0);
            self.write_directory_entry(&relative(dir)?, mtime)?;
        }

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                dirs.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            } else if file_type.is_symlink()
                && fs::metadata(entry.path()).is_ok_and(|m| m.is_file())
            {
                // stored as the file it points to; directory links are not followed
                files.push(entry.path());
            } else {
                debug!("skipping {:?}: not a file or directory", entry.path());
            }
        }
        files.sort();
        dirs.sort();

        for file in files {
            self.append_file(&relative(&file)?, &file)?;
        }
        for subdir in dirs {
            self.write_tree(&subdir, base, false)?;
        }
        Ok(())
    }

    /// Write the header for `path`, preceded by a long name annotation if
    /// the path does not fit the name field.
    fn write_entry_header(&mut self, path: &str, mut builder: HeaderBuilder) -> Result<()> {
        if path.contains('\0') {
            return Err(TarError::InvalidArgument(format!(
                "path contains a NUL byte: {path:?}"
            )));
        }

        let name = if path.len() >= NAME_LEN {
            self.write_long_name(path)?;
            truncate_name(path)
        } else {
            path
        };
        builder.name(name)?;
        self.write_header(&builder.build())
    }

    fn write_long_name(&mut self, path: &str) -> Result<()> {
        debug!("writing long name annotation for {path}");
        let mut content = Vec::with_capacity(path.len() + 1);
        content.extend_from_slice(path.as_bytes());
        content.push(0);

        let mut builder = HeaderBuilder::new(EntryType::GnuLongName);
        builder
            .name(LONG_LINK_NAME)?
            .size(content.len() as u64)?
            .mode(FileModeGroup::from_bits_truncate(0o644));
        self.write_header(&builder.build())?;
        self.write_content(content.as_slice())?;
        Ok(())
    }

    /// Terminate the archive with two empty blocks and flush.
    ///
    /// Calling this again does nothing.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        // Never retried, even if writing the terminator fails.
        self.finished = true;

        if let Some(size) = self.pending_content {
            warn!("finishing archive with {size} bytes of content missing");
        }
        let writer = self
            .inner
            .as_mut()
            .ok_or(TarError::UseAfterRelease("TarWriter"))?;
        write_zero_block(writer)?;
        write_zero_block(writer)?;
        writer.flush()?;
        debug!("archive finished");
        Ok(())
    }

    /// Finish the archive and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        self.inner.take().ok_or(TarError::UseAfterRelease("TarWriter"))
    }
}

impl<W: Write> Drop for TarWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() && !self.finished {
            if let Err(err) = self.finish() {
                warn!("failed to finish archive: {err}");
            }
        }
    }
}

/// The first 99 bytes of `path`, cut back to a character boundary.
fn truncate_name(path: &str) -> &str {
    let mut end = NAME_LEN - 1;
    while !path.is_char_boundary(end) {
        end -= 1;
    }
    &path[..end]
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::{TarReader, BLOCK_SIZE};

    #[test]
    fn test_empty_archive() {
        let archive = TarWriter::new(Vec::new()).into_inner().unwrap();
        assert_eq!(archive.len(), 2 * BLOCK_SIZE);
        assert!(archive.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_drop_finishes() {
        let mut archive = Vec::new();
        {
            let mut writer = TarWriter::new(&mut archive);
            writer.write_directory_entry("d", 0).unwrap();
        }
        assert_eq!(archive.len(), 3 * BLOCK_SIZE);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut archive = Vec::new();
        let mut writer = TarWriter::new(&mut archive);
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert!(writer.is_finished());
        assert!(matches!(
            writer.write_directory_entry("late", 0),
            Err(TarError::UseAfterRelease(_))
        ));
        drop(writer);
        assert_eq!(archive.len(), 2 * BLOCK_SIZE);
    }

    #[test]
    fn test_content_is_padded() {
        let mut writer = TarWriter::new(Vec::new());
        writer
            .write_file_entry("a.txt", &FileMetadata::new(3))
            .unwrap();
        assert_eq!(writer.write_content(&b"abc"[..]).unwrap(), 3);
        let archive = writer.into_inner().unwrap();
        assert_eq!(archive.len(), 4 * BLOCK_SIZE);
        assert_eq!(&archive[BLOCK_SIZE..BLOCK_SIZE + 3], &b"abc"[..]);
        assert!(archive[BLOCK_SIZE + 3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_content_length_mismatch() {
        let mut writer = TarWriter::new(Vec::new());
        writer
            .write_file_entry("short", &FileMetadata::new(10))
            .unwrap();
        assert!(matches!(
            writer.write_content(&b"abc"[..]),
            Err(TarError::InvalidArgument(_))
        ));

        let mut writer = TarWriter::new(Vec::new());
        writer.write_file_entry("long", &FileMetadata::new(2)).unwrap();
        assert!(matches!(
            writer.write_content(&b"abc"[..]),
            Err(TarError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_missing_content_is_rejected() {
        let mut writer = TarWriter::new(Vec::new());
        writer.write_file_entry("a", &FileMetadata::new(1)).unwrap();
        assert!(matches!(
            writer.write_file_entry("b", &FileMetadata::new(1)),
            Err(TarError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_long_name_layout() {
        let path = format!("{}/file.bin", "p".repeat(120));
        let mut writer = TarWriter::new(Vec::new());
        writer.write_file_entry(&path, &FileMetadata::new(0)).unwrap();
        writer.write_content(io::empty()).unwrap();
        let archive = writer.into_inner().unwrap();

        // annotation header, annotation content, entry header, terminator
        assert_eq!(archive.len(), 5 * BLOCK_SIZE);
        let annotation = Header::from_block(archive[..BLOCK_SIZE].try_into().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(annotation.name(), LONG_LINK_NAME);
        assert_eq!(annotation.entry_type(), EntryType::GnuLongName);
        assert_eq!(annotation.mode().bits(), 0o644);
        assert_eq!(annotation.size(), path.len() as u64 + 1);
        assert_eq!(
            &archive[BLOCK_SIZE..BLOCK_SIZE + path.len() + 1],
            format!("{path}\0").as_bytes()
        );

        let entry = Header::from_block(archive[2 * BLOCK_SIZE..3 * BLOCK_SIZE].try_into().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(entry.name(), &path[..99]);

        let mut reader = TarReader::new(Cursor::new(archive));
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().name(), path.as_str());
    }

    #[test]
    fn test_name_of_exactly_100_bytes_uses_annotation() {
        let path = "n".repeat(100);
        let mut writer = TarWriter::new(Vec::new());
        writer.write_directory_entry(&path, 0).unwrap();
        let archive = writer.into_inner().unwrap();
        // "nnn.../" is 101 bytes: annotation + content + header + terminator
        assert_eq!(archive.len(), 5 * BLOCK_SIZE);

        let path = "n".repeat(98);
        let mut writer = TarWriter::new(Vec::new());
        writer.write_directory_entry(&path, 0).unwrap();
        let archive = writer.into_inner().unwrap();
        assert_eq!(archive.len(), 3 * BLOCK_SIZE);
    }

    #[test]
    fn test_truncate_name_respects_char_boundaries() {
        let path = format!("{}é{}", "a".repeat(98), "b".repeat(10));
        assert_eq!(truncate_name(&path), "a".repeat(98).as_str());
        let path = "c".repeat(150);
        assert_eq!(truncate_name(&path).len(), 99);
    }

    #[test]
    fn test_separators_are_normalized() {
        let mut writer = TarWriter::new(Vec::new());
        writer.write_directory_entry(r"a\b|c", 0).unwrap();
        let archive = writer.into_inner().unwrap();
        let header = Header::from_block(archive[..BLOCK_SIZE].try_into().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(header.name(), "a/b/c/");
        assert_eq!(header.entry_type(), EntryType::Directory);
        assert_eq!(header.mode().bits(), 0o777);
    }
}

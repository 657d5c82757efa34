//! Extraction of an archive into a directory.

use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
};

use log::debug;
use rustix::fs::{utimensat, AtFlags, Timespec, Timestamps, CWD, UTIME_OMIT};

use crate::{
    path::{normalize_lexically, strip_top_level, tar_normalize, trim_leading_separators},
    Result, TarError, TarReader,
};

/// Options for [`TarReader::unpack_in`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackOptions {
    /// Strip the first path component of every entry, and skip the entry
    /// naming the top-level directory itself.
    ///
    /// Default: false.
    pub skip_top_level: bool,

    /// Restore the modification time of extracted files and directories.
    ///
    /// Default: true.
    pub preserve_mtime: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            skip_top_level: false,
            preserve_mtime: true,
        }
    }
}

impl<R: Read> TarReader<R> {
    /// Extract all remaining entries below `target`.
    ///
    /// Entry names have their separators folded to `/` and leading
    /// separators removed. Directories (entries of directory type, or names
    /// ending in a separator) and regular files are created; parent
    /// directories are created as needed. Directory modification times are
    /// applied once every entry is written.
    ///
    /// # Errors
    ///
    /// - [`TarError::PathEscapesTarget`] if an entry resolves outside
    ///   `target`, before anything is written for that entry.
    /// - [`TarError::UnsupportedEntryType`] for links, devices, FIFOs and
    ///   every other type that is not a file or a directory.
    /// - Any error of [`TarReader::next_entry`], or an I/O error from the
    ///   filesystem.
    ///
    /// Entries extracted before the error are left in place.
    pub fn unpack_in(&mut self, target: impl AsRef<Path>, options: &UnpackOptions) -> Result<()> {
        let target = normalize_lexically(&std::path::absolute(target.as_ref())?);
        fs::create_dir_all(&target)?;

        let mut directory_times = Vec::new();

        while let Some(mut entry) = self.next_entry()? {
            let archive_path = entry.header().path();
            let normalized = tar_normalize(&archive_path);
            let mut name = trim_leading_separators(&normalized);

            if options.skip_top_level {
                let Some(rest) = strip_top_level(name) else {
                    debug!("skipping top-level entry {archive_path}");
                    continue;
                };
                name = rest;
            }

            let dest = resolve_in(&target, name).ok_or_else(|| TarError::PathEscapesTarget {
                path: archive_path.clone(),
                target: target.clone(),
            })?;

            let header = entry.header();
            let entry_type = header.entry_type();
            let mtime = header.mtime();

            if entry_type.is_dir() || name.ends_with('/') {
                debug!("creating directory {dest:?}");
                fs::create_dir_all(&dest)?;
                if options.preserve_mtime {
                    directory_times.push((dest, mtime));
                }
            } else if entry_type.is_file() {
                debug!("extracting {archive_path} to {dest:?}");
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut file = File::create(&dest)?;
                entry.copy_to(&mut file)?;
                drop(file);
                if options.preserve_mtime {
                    set_mtime(&dest, mtime)?;
                }
            } else {
                return Err(TarError::UnsupportedEntryType {
                    path: archive_path,
                    entry_type,
                });
            }
        }

        // Deepest directories last in the list; apply those first.
        for (dir, mtime) in directory_times.iter().rev() {
            set_mtime(dir, *mtime)?;
        }

        Ok(())
    }
}

/// Join `name` onto `target`, returning `None` if the result leaves it.
fn resolve_in(target: &Path, name: &str) -> Option<PathBuf> {
    let dest = normalize_lexically(&target.join(name));
    dest.starts_with(target).then_some(dest)
}

fn set_mtime(path: &Path, mtime: u64) -> io::Result<()> {
    let times = Timestamps {
        last_access: Timespec {
            tv_sec: 0,
            tv_nsec: UTIME_OMIT,
        },
        last_modification: Timespec {
            tv_sec: i64::try_from(mtime).unwrap_or(i64::MAX),
            tv_nsec: 0,
        },
    };
    utimensat(CWD, path, &times, AtFlags::empty())?;
    Ok(())
}

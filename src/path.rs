//! Path helpers shared by the writer and the extraction code.
//!
//! Archive paths always use `/`; names written by other tools may also use
//! `\` or `|`, which are folded to `/` before use.

use std::path::{Component, Path, PathBuf};

use crate::{Result, TarError};

/// Every character accepted as a directory separator inside an archive.
const SEPARATORS: [char; 3] = ['/', '\\', '|'];

/// The separator written into archives.
pub(crate) const TAR_SEPARATOR: char = '/';

/// Fold all separator variants to `/`.
pub(crate) fn tar_normalize(path: &str) -> String {
    path.replace(&SEPARATORS[1..], "/")
}

/// Like [`tar_normalize`], additionally ensuring a trailing `/`.
pub(crate) fn tar_normalize_directory(path: &str) -> String {
    let mut path = tar_normalize(path);
    if !path.ends_with(TAR_SEPARATOR) {
        path.push(TAR_SEPARATOR);
    }
    path
}

pub(crate) fn ends_with_separator(path: &str) -> bool {
    path.ends_with(SEPARATORS)
}

pub(crate) fn trim_leading_separators(path: &str) -> &str {
    path.trim_start_matches(SEPARATORS)
}

/// Remove the first component of a relative, `/`-separated path.
///
/// A path without a separator is returned unchanged. Returns `None` when
/// nothing is left, i.e. the path named the top-level directory itself.
pub(crate) fn strip_top_level(path: &str) -> Option<&str> {
    let rest = match path.split_once(TAR_SEPARATOR) {
        Some((_, rest)) => rest,
        None => path,
    };
    (!rest.is_empty() && rest != "/").then_some(rest)
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` never climbs above the root of an absolute path.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// Render a filesystem path relative to an archive base as a `/`-separated
/// archive path.
pub(crate) fn archive_path(path: &Path) -> Result<String> {
    let mut out = String::new();
    for component in path.components() {
        let Component::Normal(name) = component else {
            continue;
        };
        let name = name.to_str().ok_or_else(|| {
            TarError::InvalidArgument(format!("path is not valid UTF-8: {path:?}"))
        })?;
        if !out.is_empty() {
            out.push(TAR_SEPARATOR);
        }
        out.push_str(name);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_tar_normalize() {
        assert_eq!(tar_normalize(r"a\b|c/d"), "a/b/c/d");
        assert_eq!(tar_normalize_directory("dir"), "dir/");
        assert_eq!(tar_normalize_directory(r"dir\"), "dir/");
    }

    #[test]
    fn test_separators() {
        assert!(ends_with_separator("dir/"));
        assert!(ends_with_separator(r"dir\"));
        assert!(ends_with_separator("dir|"));
        assert!(!ends_with_separator("file"));
        assert_eq!(trim_leading_separators(r"/\|etc/passwd"), "etc/passwd");
    }

    #[test]
    fn test_strip_top_level() {
        assert_eq!(strip_top_level("top/a/b.txt"), Some("a/b.txt"));
        assert_eq!(strip_top_level("top/"), None);
        assert_eq!(strip_top_level("top//"), None);
        assert_eq!(strip_top_level("file.txt"), Some("file.txt"));
        assert_eq!(strip_top_level(""), None);
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/tmp/x/./a/../b")),
            PathBuf::from("/tmp/x/b")
        );
        assert_eq!(
            normalize_lexically(Path::new("/tmp/x/../../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(
            normalize_lexically(Path::new("../a")),
            PathBuf::from("../a")
        );
    }

    #[test]
    fn test_archive_path() {
        assert_eq!(archive_path(Path::new("a/b/c.txt")).unwrap(), "a/b/c.txt");
        assert_eq!(archive_path(Path::new("./a")).unwrap(), "a");
        assert_eq!(archive_path(Path::new("")).unwrap(), "");
    }
}

//! Permission bits stored in the header `mode` field.
//!
//! A [`FileModeGroup`] holds three [`FileMode`] triples (user, group and
//! other). Its packed value is `user * 64 + group * 8 + other`, which is
//! always within `0..=0o777`, and its canonical textual form is a
//! three-digit octal string such as `"644"`.

use std::{fmt, str::FromStr};

use crate::{Result, TarError};

bitflags::bitflags! {
    /// Access flags for a single subject (user, group or other).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileMode: u8 {
        /// Execute (or search, for directories) permission.
        const EXECUTE = 1;
        /// Write permission.
        const WRITE = 1 << 1;
        /// Read permission.
        const READ = 1 << 2;
    }
}

/// Permission triple for user, group and other.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileModeGroup {
    user: FileMode,
    group: FileMode,
    other: FileMode,
}

impl FileModeGroup {
    /// Highest packed value a permission triple can take.
    pub const MAX: u16 = 0o777;

    /// Build a triple from its three subjects.
    #[must_use]
    pub fn new(user: FileMode, group: FileMode, other: FileMode) -> Self {
        Self { user, group, other }
    }

    /// Unpack a value, ignoring any bits above the lowest nine.
    ///
    /// Header mode fields frequently carry file type bits (`0100644`); only
    /// the permission triple is kept.
    #[must_use]
    pub fn from_bits_truncate(bits: u32) -> Self {
        Self {
            user: FileMode::from_bits_truncate((bits >> 6) as u8 & 0o7),
            group: FileMode::from_bits_truncate((bits >> 3) as u8 & 0o7),
            other: FileMode::from_bits_truncate(bits as u8 & 0o7),
        }
    }

    /// Unpack a value, returning `None` if it does not fit in nine bits.
    #[must_use]
    pub fn from_bits(bits: u16) -> Option<Self> {
        (bits <= Self::MAX).then(|| Self::from_bits_truncate(bits.into()))
    }

    /// The packed `user * 64 + group * 8 + other` value.
    #[must_use]
    pub fn bits(&self) -> u16 {
        u16::from(self.user.bits()) * 64 + u16::from(self.group.bits()) * 8 + u16::from(self.other.bits())
    }

    /// The user (owner) permissions.
    #[must_use]
    pub fn user(&self) -> FileMode {
        self.user
    }

    /// The group permissions.
    #[must_use]
    pub fn group(&self) -> FileMode {
        self.group
    }

    /// The permissions for everyone else.
    #[must_use]
    pub fn other(&self) -> FileMode {
        self.other
    }

    /// Replace the user permissions, keeping group and other.
    pub fn set_user(&mut self, mode: FileMode) {
        self.user = mode;
    }

    /// Replace the group permissions, keeping user and other.
    pub fn set_group(&mut self, mode: FileMode) {
        self.group = mode;
    }

    /// Replace the other permissions, keeping user and group.
    pub fn set_other(&mut self, mode: FileMode) {
        self.other = mode;
    }

    /// The three-digit octal form, e.g. `"755"`.
    #[must_use]
    pub fn to_octal_string(&self) -> String {
        format!("{:03o}", self.bits())
    }
}

impl FromStr for FileModeGroup {
    type Err = TarError;

    /// Parse the octal form. Surrounding spaces and NULs are ignored and an
    /// empty string means "no permissions".
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim_matches(|c: char| c == ' ' || c == '\0');
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let invalid = || TarError::InvalidOctal {
            field: "mode",
            value: s.as_bytes().to_vec(),
        };
        let bits = u16::from_str_radix(trimmed, 8).map_err(|_| invalid())?;
        Self::from_bits(bits).ok_or_else(invalid)
    }
}

impl From<FileModeGroup> for u16 {
    fn from(mode: FileModeGroup) -> Self {
        mode.bits()
    }
}

impl fmt::Display for FileModeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o}", self.bits())
    }
}

impl fmt::Debug for FileModeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileModeGroup({:03o})", self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RWX: FileMode = FileMode::all();
    const RX: FileMode = FileMode::READ.union(FileMode::EXECUTE);

    #[test]
    fn test_packing_is_additive() {
        let mode = FileModeGroup::new(RWX, RX, FileMode::READ);
        assert_eq!(mode.bits(), 7 * 64 + 5 * 8 + 4);
        assert_eq!(mode.bits(), 0o754);
        assert_eq!(mode.to_octal_string(), "754");
    }

    #[test]
    fn test_setters_keep_other_subjects() {
        let mut mode = FileModeGroup::new(RWX, RX, RX);
        mode.set_group(FileMode::empty());
        assert_eq!(mode.bits(), 0o705);
        mode.set_other(FileMode::WRITE);
        assert_eq!(mode.bits(), 0o702);
        mode.set_user(FileMode::READ);
        assert_eq!(mode.bits(), 0o402);
        assert_eq!(mode.user(), FileMode::READ);
        assert_eq!(mode.group(), FileMode::empty());
        assert_eq!(mode.other(), FileMode::WRITE);
    }

    #[test]
    fn test_parse_octal_string() {
        assert_eq!("644".parse::<FileModeGroup>().unwrap().bits(), 0o644);
        assert_eq!("0000755\0".parse::<FileModeGroup>().unwrap().bits(), 0o755);
        assert_eq!(" 7 ".parse::<FileModeGroup>().unwrap().bits(), 0o7);
        assert_eq!("".parse::<FileModeGroup>().unwrap().bits(), 0);
        assert!("8".parse::<FileModeGroup>().is_err());
        assert!("1777".parse::<FileModeGroup>().is_err());
    }

    #[test]
    fn test_string_roundtrip() {
        for bits in [0, 0o1, 0o644, 0o755, 0o777] {
            let mode = FileModeGroup::from_bits(bits).unwrap();
            let parsed: FileModeGroup = mode.to_octal_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_truncate_drops_type_bits() {
        let mode = FileModeGroup::from_bits_truncate(0o100644);
        assert_eq!(mode.bits(), 0o644);
        assert!(FileModeGroup::from_bits(0o1000).is_none());
    }
}

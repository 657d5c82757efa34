//! The 512-byte header block codec.
//!
//! Every archive entry starts with one header block. The fields have fixed
//! widths and are either NUL-terminated ASCII strings or NUL-terminated octal
//! numbers:
//!
//! | Offset | Size | Field     | Encoding                                    |
//! |--------|------|-----------|---------------------------------------------|
//! | 0      | 100  | name      | NUL-terminated string                       |
//! | 100    | 8    | mode      | 7 octal digits + NUL                        |
//! | 108    | 8    | uid       | 7 octal digits + NUL                        |
//! | 116    | 8    | gid       | 7 octal digits + NUL                        |
//! | 124    | 12   | size      | 11 octal digits + NUL, or base-256 escape   |
//! | 136    | 12   | mtime     | 11 octal digits + NUL                       |
//! | 148    | 8    | checksum  | 6 octal digits + NUL + space                |
//! | 156    | 1    | typeflag  | see [`EntryType`]                           |
//! | 157    | 100  | linkname  | NUL-terminated string                       |
//! | 257    | 6    | magic     | `"ustar\0"` (anything else is pre-POSIX)    |
//! | 263    | 2    | version   | `"00"`                                      |
//! | 265    | 32   | uname     | NUL-terminated string                       |
//! | 297    | 32   | gname     | NUL-terminated string                       |
//! | 329    | 8    | devmajor  | 7 octal digits + NUL                        |
//! | 337    | 8    | devminor  | 7 octal digits + NUL                        |
//! | 345    | 155  | prefix    | NUL-terminated string (read only)           |
//!
//! Decoding is lenient: the checksum is kept but never verified, and headers
//! without the ustar magic are accepted as pre-POSIX headers. Encoding always
//! stamps the ustar magic and recomputes the checksum.

use std::{
    fmt,
    io::{Read, Write},
};

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::{
    mode::FileModeGroup,
    path::ends_with_separator,
    util::{read_exactish, PositionReader},
    Result, TarError, BLOCK_SIZE,
};

/// Magic string for ustar headers.
pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// Version field written into every ustar header.
pub const USTAR_VERSION: &[u8; 2] = b"00";

/// Magic string used by GNU tar ("ustar" followed by a space).
pub const GNU_MAGIC: &[u8; 6] = b"ustar ";

/// Pseudo file name carried by GNU long name and long link annotations.
pub const LONG_LINK_NAME: &str = "././@LongLink";

/// Width of the name and link name fields.
pub const NAME_LEN: usize = 100;
const NUMBER_LEN: usize = 8;
const LONG_NUMBER_LEN: usize = 12;
const OWNER_NAME_LEN: usize = 32;
const PREFIX_LEN: usize = 155;

/// Byte range of the checksum field within a header block.
const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// Raw ustar header layout.
///
/// This is only used to give names to the byte ranges of a block; the
/// meaning of the fields is handled by [`Header`].
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct UstarHeader {
    name: [u8; NAME_LEN],
    mode: [u8; NUMBER_LEN],
    uid: [u8; NUMBER_LEN],
    gid: [u8; NUMBER_LEN],
    size: [u8; LONG_NUMBER_LEN],
    mtime: [u8; LONG_NUMBER_LEN],
    checksum: [u8; NUMBER_LEN],
    typeflag: u8,
    linkname: [u8; NAME_LEN],
    magic: [u8; 6],
    version: [u8; 2],
    uname: [u8; OWNER_NAME_LEN],
    gname: [u8; OWNER_NAME_LEN],
    devmajor: [u8; NUMBER_LEN],
    devminor: [u8; NUMBER_LEN],
    prefix: [u8; PREFIX_LEN],
    pad: [u8; 12],
}

// ============================================================================
// Entry Type
// ============================================================================

/// The kind of object an entry describes, stored as a single ASCII byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file (type '0' or '\0' for old tar compatibility).
    Regular,
    /// Hard link to another entry (type '1').
    Link,
    /// Symbolic link (type '2').
    Symlink,
    /// Character special device (type '3').
    Char,
    /// Block special device (type '4').
    Block,
    /// Directory (type '5').
    Directory,
    /// FIFO (type '6').
    Fifo,
    /// Contiguous file (type '7').
    Contiguous,
    /// PAX global extended header (type 'g').
    XGlobalHeader,
    /// PAX extended header (type 'x').
    XHeader,
    /// GNU long link annotation (type 'K').
    GnuLongLink,
    /// GNU long name annotation (type 'L').
    GnuLongName,
    /// GNU sparse file (type 'S').
    GnuSparse,
    /// Any other type byte.
    Other(u8),
}

impl EntryType {
    /// Parse an entry type from its raw byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' | b'\0' => EntryType::Regular,
            b'1' => EntryType::Link,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::Char,
            b'4' => EntryType::Block,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b'7' => EntryType::Contiguous,
            b'g' => EntryType::XGlobalHeader,
            b'x' => EntryType::XHeader,
            b'K' => EntryType::GnuLongLink,
            b'L' => EntryType::GnuLongName,
            b'S' => EntryType::GnuSparse,
            other => EntryType::Other(other),
        }
    }

    /// The raw byte for this entry type. `Regular` is written as '0'.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            EntryType::Regular => b'0',
            EntryType::Link => b'1',
            EntryType::Symlink => b'2',
            EntryType::Char => b'3',
            EntryType::Block => b'4',
            EntryType::Directory => b'5',
            EntryType::Fifo => b'6',
            EntryType::Contiguous => b'7',
            EntryType::XGlobalHeader => b'g',
            EntryType::XHeader => b'x',
            EntryType::GnuLongLink => b'K',
            EntryType::GnuLongName => b'L',
            EntryType::GnuSparse => b'S',
            EntryType::Other(b) => b,
        }
    }

    /// Returns true for GNU long name/link annotations, which only carry a
    /// value for the entry that follows them.
    #[must_use]
    pub fn is_annotation(self) -> bool {
        matches!(self, EntryType::GnuLongName | EntryType::GnuLongLink)
    }

    /// Returns true if this is a regular file entry.
    #[must_use]
    pub fn is_file(self) -> bool {
        self == EntryType::Regular
    }

    /// Returns true if this is a directory entry.
    #[must_use]
    pub fn is_dir(self) -> bool {
        self == EntryType::Directory
    }
}

impl From<u8> for EntryType {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl From<EntryType> for u8 {
    fn from(entry_type: EntryType) -> Self {
        entry_type.to_byte()
    }
}

/// Header flavour detected from the magic field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HeaderFormat {
    /// POSIX ustar (`"ustar\0"` magic).
    #[default]
    Ustar,
    /// GNU tar (`"ustar "` magic): owner names are valid, there is no prefix.
    Gnu,
    /// No recognized magic; only the fields up to the link name are valid.
    PrePosix,
}

// ============================================================================
// Header
// ============================================================================

/// Metadata of a single archive entry.
///
/// A `Header` is immutable; use [`HeaderBuilder`] (or [`Header::to_builder`])
/// to create or modify one. The builder enforces the fixed field widths, so
/// every header built through it can be encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    name: String,
    mode: FileModeGroup,
    uid: u64,
    gid: u64,
    size: u64,
    mtime: u64,
    checksum: Option<u32>,
    entry_type: EntryType,
    link_name: String,
    format: HeaderFormat,
    user_name: Option<String>,
    group_name: Option<String>,
    device_major: Option<u32>,
    device_minor: Option<u32>,
    prefix: Option<String>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: FileModeGroup::from_bits_truncate(0o777),
            uid: 0,
            gid: 0,
            size: 0,
            mtime: 0,
            checksum: None,
            entry_type: EntryType::Regular,
            link_name: String::new(),
            format: HeaderFormat::Ustar,
            user_name: None,
            group_name: None,
            device_major: None,
            device_minor: None,
            prefix: None,
        }
    }
}

impl Header {
    /// Start building a header for an entry of the given type.
    #[must_use]
    pub fn builder(entry_type: EntryType) -> HeaderBuilder {
        HeaderBuilder::new(entry_type)
    }

    /// The name field as stored in the header.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full entry path: `prefix/name` when a ustar prefix is present,
    /// otherwise just the name.
    #[must_use]
    pub fn path(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The link target for hard and symbolic links.
    #[must_use]
    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    /// The permission bits.
    #[must_use]
    pub fn mode(&self) -> FileModeGroup {
        self.mode
    }

    /// Owner user ID.
    #[must_use]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Owner group ID.
    #[must_use]
    pub fn gid(&self) -> u64 {
        self.gid
    }

    /// Owner user name, if the header carries one.
    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// Owner group name, if the header carries one.
    #[must_use]
    pub fn group_name(&self) -> Option<&str> {
        self.group_name.as_deref()
    }

    /// Content length in bytes. An empty size field reads as zero.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Modification time in seconds since the Unix epoch.
    #[must_use]
    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    /// The checksum stored in a decoded header.
    ///
    /// This is `None` for headers that were built rather than decoded, and
    /// for decoded headers whose checksum field is not a number. The value
    /// is never verified against the block contents.
    #[must_use]
    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    /// The entry type.
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Device major number (for character and block devices).
    #[must_use]
    pub fn device_major(&self) -> Option<u32> {
        self.device_major
    }

    /// Device minor number (for character and block devices).
    #[must_use]
    pub fn device_minor(&self) -> Option<u32> {
        self.device_minor
    }

    /// The ustar file name prefix, if present.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The header flavour this header was decoded from.
    #[must_use]
    pub fn format(&self) -> HeaderFormat {
        self.format
    }

    /// Re-open this header for modification.
    ///
    /// The stored checksum is dropped and the format reset to ustar, since
    /// that is what encoding will produce.
    #[must_use]
    pub fn to_builder(&self) -> HeaderBuilder {
        HeaderBuilder {
            header: Header {
                checksum: None,
                format: HeaderFormat::Ustar,
                ..self.clone()
            },
        }
    }

    pub(crate) fn with_long_values(
        mut self,
        name: Option<&str>,
        link_name: Option<&str>,
    ) -> Self {
        if let Some(name) = name {
            self.name = name.to_owned();
            // the long name is the whole path
            self.prefix = None;
        }
        if let Some(link_name) = link_name {
            self.link_name = link_name.to_owned();
        }
        self
    }

    // ========================================================================
    // Decoding
    // ========================================================================

    /// Decode one header block.
    ///
    /// Returns `Ok(None)` if the name field is empty, which marks a candidate
    /// end-of-archive block.
    ///
    /// # Errors
    ///
    /// Returns [`TarError::InvalidOctal`] if a numeric field is malformed.
    pub fn from_block(block: &[u8; BLOCK_SIZE]) -> Result<Option<Header>> {
        let raw: &UstarHeader = zerocopy::transmute_ref!(block);

        let name = truncate_null(&raw.name);
        if name.is_empty() {
            return Ok(None);
        }

        let format = if raw.magic[..5] != USTAR_MAGIC[..5] {
            HeaderFormat::PrePosix
        } else if raw.magic == *USTAR_MAGIC {
            HeaderFormat::Ustar
        } else {
            HeaderFormat::Gnu
        };

        let mut header = Header {
            name: lossy_string(name),
            mode: FileModeGroup::from_bits_truncate(parse_octal("mode", &raw.mode)? as u32),
            uid: parse_numeric("uid", &raw.uid)?,
            gid: parse_numeric("gid", &raw.gid)?,
            size: parse_size(&raw.size)?,
            mtime: parse_numeric("mtime", &raw.mtime)?,
            checksum: parse_octal("checksum", &raw.checksum)
                .ok()
                .and_then(|v| u32::try_from(v).ok()),
            entry_type: EntryType::from_byte(raw.typeflag),
            link_name: lossy_string(truncate_null(&raw.linkname)),
            format,
            user_name: None,
            group_name: None,
            device_major: None,
            device_minor: None,
            prefix: None,
        };

        if format == HeaderFormat::PrePosix {
            // Old archives mark directories with a trailing separator only.
            if ends_with_separator(&header.name) {
                header.entry_type = EntryType::Directory;
            }
            return Ok(Some(header));
        }

        header.user_name = optional_string(&raw.uname);
        header.group_name = optional_string(&raw.gname);
        header.device_major = optional_number("devmajor", &raw.devmajor)?;
        header.device_minor = optional_number("devminor", &raw.devminor)?;
        if format == HeaderFormat::Ustar {
            header.prefix = optional_string(&raw.prefix);
        }

        Ok(Some(header))
    }

    /// Read the next header from a stream.
    ///
    /// An empty header block is only treated as the end of the archive when
    /// the following block is empty as well; a lone empty block followed by
    /// a real header is skipped. A clean end of data where a header was
    /// expected also ends the archive, so archives missing their terminator
    /// blocks are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TarError::TruncatedArchive`] if the stream ends inside a
    /// block, including past the fields every format requires.
    pub fn decode<R: Read>(reader: R) -> Result<Option<Header>> {
        Self::decode_from(&mut PositionReader::new(reader))
    }

    pub(crate) fn decode_from<R: Read>(reader: &mut PositionReader<R>) -> Result<Option<Header>> {
        let mut block = [0u8; BLOCK_SIZE];
        if !read_exactish(reader, &mut block)? {
            return Ok(None);
        }
        if let Some(header) = Self::from_block(&block)? {
            return Ok(Some(header));
        }

        // Confirm the end of the archive with a second block.
        if !read_exactish(reader, &mut block)? {
            return Ok(None);
        }
        Self::from_block(&block)
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode this header into a block, computing the checksum.
    ///
    /// The ustar magic and version are always written, whatever format the
    /// header was decoded from.
    ///
    /// # Errors
    ///
    /// Returns [`TarError::FieldTooLong`] if a value does not fit its field,
    /// which can only happen for headers decoded from foreign archives (for
    /// example a size stored with the base-256 escape).
    pub fn to_block(&self) -> Result<[u8; BLOCK_SIZE]> {
        let mut raw = UstarHeader::new_zeroed();

        string_into("name", &mut raw.name, &self.name)?;
        octal_into("mode", &mut raw.mode, self.mode.bits().into())?;
        octal_into("uid", &mut raw.uid, self.uid)?;
        octal_into("gid", &mut raw.gid, self.gid)?;
        octal_into("size", &mut raw.size, self.size)?;
        octal_into("mtime", &mut raw.mtime, self.mtime)?;
        raw.typeflag = self.entry_type.to_byte();
        string_into("link name", &mut raw.linkname, &self.link_name)?;
        raw.magic = *USTAR_MAGIC;
        raw.version = *USTAR_VERSION;
        if let Some(user_name) = &self.user_name {
            string_into("user name", &mut raw.uname, user_name)?;
        }
        if let Some(group_name) = &self.group_name {
            string_into("group name", &mut raw.gname, group_name)?;
        }
        if let Some(major) = self.device_major {
            octal_into("device major", &mut raw.devmajor, major.into())?;
        }
        if let Some(minor) = self.device_minor {
            octal_into("device minor", &mut raw.devminor, minor.into())?;
        }
        if let Some(prefix) = &self.prefix {
            string_into("prefix", &mut raw.prefix, prefix)?;
        }

        let mut block: [u8; BLOCK_SIZE] = zerocopy::transmute!(raw);
        let checksum = compute_checksum(&block);
        let field = format!("{checksum:06o}\0 ");
        block[CHECKSUM_RANGE].copy_from_slice(field.as_bytes());
        Ok(block)
    }

    /// Encode this header and write the block to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`TarError::FieldTooLong`] as [`Header::to_block`] does, or an
    /// I/O error from the writer. Nothing is written if encoding fails.
    pub fn encode<W: Write>(&self, mut writer: W) -> Result<()> {
        let block = self.to_block()?;
        writer.write_all(&block)?;
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Mutable construction of a [`Header`].
///
/// Every setter checks that the value fits its fixed-width field, keeping one
/// byte free for the terminator, and fails with [`TarError::FieldTooLong`]
/// before anything is written.
///
/// ```
/// use startar::{EntryType, FileModeGroup, Header};
///
/// let mut builder = Header::builder(EntryType::Regular);
/// builder.name("hello.txt")?.size(13)?.mode("644".parse::<FileModeGroup>()?);
/// let header = builder.build();
/// assert_eq!(header.name(), "hello.txt");
/// # Ok::<(), startar::TarError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct HeaderBuilder {
    header: Header,
}

impl HeaderBuilder {
    /// Create a builder with default values: mode 777, owner 0:0, size 0.
    #[must_use]
    pub fn new(entry_type: EntryType) -> Self {
        Self {
            header: Header {
                entry_type,
                ..Header::default()
            },
        }
    }

    /// Set the entry name (at most 99 bytes).
    pub fn name(&mut self, name: impl Into<String>) -> Result<&mut Self> {
        let name = name.into();
        check_string("name", &name, NAME_LEN)?;
        self.header.name = name;
        Ok(self)
    }

    /// Set the link target (at most 99 bytes).
    pub fn link_name(&mut self, link_name: impl Into<String>) -> Result<&mut Self> {
        let link_name = link_name.into();
        check_string("link name", &link_name, NAME_LEN)?;
        self.header.link_name = link_name;
        Ok(self)
    }

    /// Set the permission bits.
    pub fn mode(&mut self, mode: FileModeGroup) -> &mut Self {
        self.header.mode = mode;
        self
    }

    /// Set the owner user ID (at most 7 octal digits).
    pub fn uid(&mut self, uid: u64) -> Result<&mut Self> {
        check_octal("uid", uid, NUMBER_LEN)?;
        self.header.uid = uid;
        Ok(self)
    }

    /// Set the owner group ID (at most 7 octal digits).
    pub fn gid(&mut self, gid: u64) -> Result<&mut Self> {
        check_octal("gid", gid, NUMBER_LEN)?;
        self.header.gid = gid;
        Ok(self)
    }

    /// Set the owner user name (at most 31 bytes). An empty name clears it.
    pub fn user_name(&mut self, user_name: impl Into<String>) -> Result<&mut Self> {
        let user_name = user_name.into();
        check_string("user name", &user_name, OWNER_NAME_LEN)?;
        self.header.user_name = Some(user_name).filter(|n| !n.is_empty());
        Ok(self)
    }

    /// Set the owner group name (at most 31 bytes). An empty name clears it.
    pub fn group_name(&mut self, group_name: impl Into<String>) -> Result<&mut Self> {
        let group_name = group_name.into();
        check_string("group name", &group_name, OWNER_NAME_LEN)?;
        self.header.group_name = Some(group_name).filter(|n| !n.is_empty());
        Ok(self)
    }

    /// Set the content size (at most 11 octal digits; larger files would
    /// need the base-256 encoding, which is never written).
    pub fn size(&mut self, size: u64) -> Result<&mut Self> {
        check_octal("size", size, LONG_NUMBER_LEN)?;
        self.header.size = size;
        Ok(self)
    }

    /// Set the modification time in seconds since the Unix epoch.
    pub fn mtime(&mut self, mtime: u64) -> Result<&mut Self> {
        check_octal("mtime", mtime, LONG_NUMBER_LEN)?;
        self.header.mtime = mtime;
        Ok(self)
    }

    /// Set the entry type.
    pub fn entry_type(&mut self, entry_type: EntryType) -> &mut Self {
        self.header.entry_type = entry_type;
        self
    }

    /// Set the device major number.
    pub fn device_major(&mut self, major: u32) -> Result<&mut Self> {
        check_octal("device major", major.into(), NUMBER_LEN)?;
        self.header.device_major = Some(major);
        Ok(self)
    }

    /// Set the device minor number.
    pub fn device_minor(&mut self, minor: u32) -> Result<&mut Self> {
        check_octal("device minor", minor.into(), NUMBER_LEN)?;
        self.header.device_minor = Some(minor);
        Ok(self)
    }

    /// Set the ustar file name prefix (at most 154 bytes). An empty prefix
    /// clears it.
    pub fn prefix(&mut self, prefix: impl Into<String>) -> Result<&mut Self> {
        let prefix = prefix.into();
        check_string("prefix", &prefix, PREFIX_LEN)?;
        self.header.prefix = Some(prefix).filter(|p| !p.is_empty());
        Ok(self)
    }

    /// Produce the header.
    #[must_use]
    pub fn build(&self) -> Header {
        self.header.clone()
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} {} {}:{} {}",
            self.mode,
            self.entry_type,
            self.size,
            self.uid,
            self.gid,
            self.path()
        )
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Compute the checksum of a header block.
///
/// This is the unsigned sum of all bytes of the block, with the checksum
/// field itself counted as eight ASCII spaces.
#[must_use]
pub fn compute_checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
    block.iter().enumerate().fold(0u32, |sum, (i, &byte)| {
        let byte = if CHECKSUM_RANGE.contains(&i) { b' ' } else { byte };
        sum.wrapping_add(u32::from(byte))
    })
}

/// Truncate a byte slice at the first NUL byte.
///
/// ```
/// use startar::truncate_null;
///
/// assert_eq!(truncate_null(b"hello\0world"), b"hello");
/// assert_eq!(truncate_null(b"no null here"), b"no null here");
/// ```
#[must_use]
pub fn truncate_null(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(pos) => &bytes[..pos],
        None => bytes,
    }
}

fn lossy_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn optional_string(field: &[u8]) -> Option<String> {
    Some(truncate_null(field))
        .filter(|s| !s.is_empty())
        .map(lossy_string)
}

fn optional_number(name: &'static str, field: &[u8]) -> Result<Option<u32>> {
    if field.iter().all(|&b| b == 0 || b == b' ') {
        return Ok(None);
    }
    let value = parse_numeric(name, field)?;
    u32::try_from(value).map(Some).map_err(|_| TarError::InvalidOctal {
        field: name,
        value: field.to_vec(),
    })
}

/// Parse an octal ASCII field.
///
/// Leading spaces are skipped and the number ends at the first space or NUL,
/// so both `"0000644\0"` and `"   644 "` are accepted. An empty field is 0.
fn parse_octal(name: &'static str, bytes: &[u8]) -> Result<u64> {
    let invalid = || TarError::InvalidOctal {
        field: name,
        value: bytes.to_vec(),
    };

    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    let end = bytes[start..]
        .iter()
        .position(|&b| b == b' ' || b == b'\0')
        .map_or(bytes.len(), |i| start + i);

    bytes[start..end].iter().try_fold(0u64, |value, &byte| {
        if !(b'0'..=b'7').contains(&byte) {
            return Err(invalid());
        }
        value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(byte - b'0')))
            .ok_or_else(invalid)
    })
}

/// Parse a numeric field that may use the GNU base-256 encoding.
///
/// When the high bit of the first byte is set, the remaining bits are a
/// big-endian binary number.
fn parse_numeric(name: &'static str, bytes: &[u8]) -> Result<u64> {
    match bytes.first() {
        Some(first) if first & 0x80 != 0 => {
            bytes.iter().enumerate().try_fold(0u64, |value, (i, &byte)| {
                let byte = if i == 0 { byte & 0x7f } else { byte };
                value
                    .checked_shl(8)
                    .filter(|_| value >> 56 == 0)
                    .map(|v| v | u64::from(byte))
                    .ok_or_else(|| TarError::InvalidOctal {
                        field: name,
                        value: bytes.to_vec(),
                    })
            })
        }
        _ => parse_octal(name, bytes),
    }
}

/// Parse the 12-byte size field.
///
/// With the high bit of the first byte set, bytes 4 to 11 hold a big-endian
/// 64-bit size; otherwise the field is octal ASCII.
fn parse_size(field: &[u8; LONG_NUMBER_LEN]) -> Result<u64> {
    if field[0] & 0x80 != 0 {
        let mut be = [0u8; 8];
        be.copy_from_slice(&field[4..]);
        return Ok(u64::from_be_bytes(be));
    }
    parse_octal("size", field)
}

fn octal_digits(value: u64) -> usize {
    ((u64::BITS - value.leading_zeros()) as usize).div_ceil(3).max(1)
}

/// Check that `value` fits a `width` byte numeric field (digits plus NUL).
fn check_octal(name: &'static str, value: u64, width: usize) -> Result<()> {
    let digits = octal_digits(value);
    if digits >= width {
        return Err(TarError::FieldTooLong {
            field: name,
            len: digits,
            max: width - 1,
        });
    }
    Ok(())
}

/// Check that `value` fits a `width` byte string field with its terminator.
fn check_string(name: &'static str, value: &str, width: usize) -> Result<()> {
    if value.contains('\0') {
        return Err(TarError::InvalidArgument(format!(
            "{name} contains a NUL byte: {value:?}"
        )));
    }
    if value.len() >= width {
        return Err(TarError::FieldTooLong {
            field: name,
            len: value.len(),
            max: width - 1,
        });
    }
    Ok(())
}

fn string_into(name: &'static str, dst: &mut [u8], value: &str) -> Result<()> {
    check_string(name, value, dst.len())?;
    dst[..value.len()].copy_from_slice(value.as_bytes());
    Ok(())
}

/// Write `value` as zero-padded octal filling all but the last byte of `dst`,
/// which stays NUL.
fn octal_into(name: &'static str, dst: &mut [u8], value: u64) -> Result<()> {
    check_octal(name, value, dst.len())?;
    let digits = format!("{value:0width$o}", width = dst.len() - 1);
    dst[..digits.len()].copy_from_slice(digits.as_bytes());
    Ok(())
}

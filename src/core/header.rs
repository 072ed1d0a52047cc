//! Fixed-layout parts of the DCI byte format
//!
//! ```text
//! Archive header (8 bytes)
//!   0..4   magic "DCI\0"
//!   4      format version (1)
//!   5..8   root child count, u24 little-endian
//!
//! Entry record (72 bytes + payload)
//!   0      kind tag (1 = file, 2 = directory, 3 = symlink)
//!   1..64  name, UTF-8, NUL padded (at most 62 bytes)
//!   64..72 payload size, u64 little-endian
//! ```

use crate::catalog::EntryKind;
use crate::error::{DciError, Result};

pub const MAGIC: [u8; 4] = *b"DCI\x00";
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

/// Size of the archive header in bytes
pub const HEADER_SIZE: usize = 8;

/// Size of the name field inside a record
pub const NAME_FIELD_SIZE: usize = 63;

/// Longest name that fits the name field with its terminating NUL
pub const MAX_NAME_LEN: usize = NAME_FIELD_SIZE - 1;

/// Size of the fixed part of each entry record
pub const RECORD_HEADER_SIZE: usize = 1 + NAME_FIELD_SIZE + 8;

/// Largest root child count representable in the 3-byte field
pub const MAX_ROOT_CHILDREN: u32 = 0x00FF_FFFF;

/// Format version carried by an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const CURRENT: Version = Version {
        major: VERSION_MAJOR,
        minor: VERSION_MINOR,
    };
}

impl Default for Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// DCI archive header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version (only the major part is stored)
    pub version: Version,

    /// Number of immediate children of the root directory
    pub root_children: u32,
}

impl Header {
    /// Create a header for the current format version
    pub fn new(root_children: u32) -> Self {
        Header {
            version: Version::CURRENT,
            root_children,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE]> {
        if self.root_children > MAX_ROOT_CHILDREN {
            return Err(DciError::TooManyRootEntries(self.root_children as usize));
        }

        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..4].copy_from_slice(&MAGIC);
        bytes[4] = self.version.major;
        bytes[5..8].copy_from_slice(&self.root_children.to_le_bytes()[..3]);
        Ok(bytes)
    }

    /// Deserialize header from bytes and validate magic and version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(DciError::Truncated {
                offset: 0,
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        if bytes[..4] != MAGIC {
            return Err(DciError::InvalidMagic);
        }

        if bytes[4] != VERSION_MAJOR {
            return Err(DciError::UnsupportedVersion {
                major: bytes[4],
                minor: 0,
            });
        }

        let root_children = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], 0]);

        Ok(Header {
            version: Version {
                major: bytes[4],
                minor: VERSION_MINOR,
            },
            root_children,
        })
    }
}

/// Fixed 72-byte prefix of an entry record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: EntryKind,
    pub name: String,
    pub payload_size: u64,
}

impl RecordHeader {
    /// Serialize the record prefix
    ///
    /// Names are validated by the tree before they get here; this only
    /// guards the field capacity.
    pub fn to_bytes(&self) -> Result<[u8; RECORD_HEADER_SIZE]> {
        let name = self.name.as_bytes();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(DciError::NameTooLong {
                name: self.name.clone(),
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }

        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        bytes[0] = self.kind.tag();
        bytes[1..1 + name.len()].copy_from_slice(name);
        bytes[1 + NAME_FIELD_SIZE..].copy_from_slice(&self.payload_size.to_le_bytes());
        Ok(bytes)
    }

    /// Parse the record prefix starting at `offset`
    ///
    /// `offset` is only used for error reporting; `bytes` must start at the
    /// record.
    pub fn from_bytes(bytes: &[u8], offset: usize) -> Result<Self> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(DciError::Truncated {
                offset,
                needed: RECORD_HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let tag = bytes[0];
        let kind = EntryKind::from_tag(tag).ok_or(DciError::InvalidKind { offset, tag })?;

        let field = &bytes[1..1 + NAME_FIELD_SIZE];
        let len = field
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| DciError::InvalidRecordName {
                offset,
                reason: "name is not NUL terminated".to_string(),
            })?;
        if len == 0 {
            return Err(DciError::InvalidRecordName {
                offset,
                reason: "name is empty".to_string(),
            });
        }
        let name = std::str::from_utf8(&field[..len])
            .map_err(|_| DciError::InvalidRecordName {
                offset,
                reason: "name is not valid UTF-8".to_string(),
            })?
            .to_string();

        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[1 + NAME_FIELD_SIZE..RECORD_HEADER_SIZE]);

        Ok(RecordHeader {
            kind,
            name,
            payload_size: u64::from_le_bytes(size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let bytes = Header::new(0).to_bytes().unwrap();
        assert_eq!(bytes, [b'D', b'C', b'I', 0x00, 0x01, 0x00, 0x00, 0x00]);

        let bytes = Header::new(0x030201).to_bytes().unwrap();
        assert_eq!(&bytes[5..], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_header_round_trip() {
        let header = Header::from_bytes(&Header::new(258).to_bytes().unwrap()).unwrap();
        assert_eq!(header.root_children, 258);
        assert_eq!(header.version, Version::CURRENT);
    }

    #[test]
    fn test_invalid_magic() {
        let bytes = *b"DCX\x00\x01\x00\x00\x00";
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(DciError::InvalidMagic)
        ));
    }

    #[test]
    fn test_reserved_magic_byte_must_be_zero() {
        let bytes = *b"DCI\x01\x01\x00\x00\x00";
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(DciError::InvalidMagic)
        ));
    }

    #[test]
    fn test_invalid_version() {
        let bytes = *b"DCI\x00\x02\x00\x00\x00";
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(DciError::UnsupportedVersion { major: 2, .. })
        ));
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            Header::from_bytes(b"DCI"),
            Err(DciError::Truncated { needed: 8, .. })
        ));
    }

    #[test]
    fn test_too_many_root_children() {
        assert!(Header::new(MAX_ROOT_CHILDREN).to_bytes().is_ok());
        assert!(matches!(
            Header::new(MAX_ROOT_CHILDREN + 1).to_bytes(),
            Err(DciError::TooManyRootEntries(_))
        ));
    }

    #[test]
    fn test_record_layout() {
        let record = RecordHeader {
            kind: EntryKind::File,
            name: "b.txt".to_string(),
            payload_size: 5,
        };
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len(), 72);
        assert_eq!(bytes[0], EntryKind::File.tag());
        assert_eq!(&bytes[1..6], b"b.txt");
        assert!(bytes[6..64].iter().all(|&b| b == 0));
        assert_eq!(&bytes[64..], &5u64.to_le_bytes());

        assert_eq!(RecordHeader::from_bytes(&bytes, 0).unwrap(), record);
    }

    #[test]
    fn test_record_name_limits() {
        let longest = "n".repeat(MAX_NAME_LEN);
        let record = RecordHeader {
            kind: EntryKind::Directory,
            name: longest.clone(),
            payload_size: 0,
        };
        let bytes = record.to_bytes().unwrap();
        assert_eq!(RecordHeader::from_bytes(&bytes, 0).unwrap().name, longest);

        let too_long = RecordHeader {
            name: "n".repeat(MAX_NAME_LEN + 1),
            ..record
        };
        assert!(matches!(
            too_long.to_bytes(),
            Err(DciError::NameTooLong { len: 63, .. })
        ));
    }

    #[test]
    fn test_record_rejects_bad_fields() {
        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        bytes[0] = 0;
        bytes[1] = b'a';
        assert!(matches!(
            RecordHeader::from_bytes(&bytes, 8),
            Err(DciError::InvalidKind { offset: 8, tag: 0 })
        ));

        bytes[0] = EntryKind::File.tag();
        bytes[1] = 0;
        assert!(matches!(
            RecordHeader::from_bytes(&bytes, 8),
            Err(DciError::InvalidRecordName { .. })
        ));

        bytes[1..64].fill(b'x');
        assert!(matches!(
            RecordHeader::from_bytes(&bytes, 8),
            Err(DciError::InvalidRecordName { .. })
        ));

        assert!(matches!(
            RecordHeader::from_bytes(&bytes[..40], 8),
            Err(DciError::Truncated { .. })
        ));
    }
}

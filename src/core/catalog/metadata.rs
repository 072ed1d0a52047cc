//! Entry node structures

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Entry kind
///
/// The discriminants are the on-disk tag values; 0 is reserved as invalid.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file
    File = 1,
    /// Directory
    Directory = 2,
    /// Symbolic link
    Symlink = 3,
}

impl EntryKind {
    /// On-disk tag for this kind
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a kind from its on-disk tag
    ///
    /// Returns `None` for the reserved value 0 and for unknown tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::File),
            2 => Some(Self::Directory),
            3 => Some(Self::Symlink),
            _ => None,
        }
    }

    pub fn is_directory(self) -> bool {
        self == Self::Directory
    }

    pub fn is_file(self) -> bool {
        self == Self::File
    }

    pub fn is_symlink(self) -> bool {
        self == Self::Symlink
    }
}

/// Stable handle of an entry inside a [`Tree`](super::Tree)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Payload bytes of a file or symlink
///
/// `Shared` ranges point into the buffer the archive was decoded from. Any
/// write replaces the payload with an `Owned` copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Payload {
    None,
    Shared(Range<usize>),
    Owned(Vec<u8>),
}

impl Payload {
    pub(crate) fn is_shared(&self) -> bool {
        matches!(self, Payload::Shared(_))
    }
}

/// A node in the archive tree
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: EntryKind,
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    /// Kept in natural-sort order by name
    pub(crate) children: Vec<NodeId>,
    pub(crate) payload: Payload,
}

impl Node {
    pub(crate) fn new(kind: EntryKind, name: String, parent: Option<NodeId>, payload: Payload) -> Self {
        Node {
            kind,
            name,
            parent,
            children: Vec::new(),
            payload,
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Entry name; empty for the root
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent back-reference; `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Serializable summary of one entry, as returned by directory listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    /// Absolute internal path (e.g. "/icons/app.png")
    pub path: String,

    /// Just the name (e.g. "app.png")
    pub name: String,

    pub kind: EntryKind,

    /// Payload size in bytes; `None` for directories
    pub size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        for kind in [EntryKind::File, EntryKind::Directory, EntryKind::Symlink] {
            assert_eq!(EntryKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EntryKind::from_tag(0), None);
        assert_eq!(EntryKind::from_tag(4), None);
        assert_eq!(EntryKind::from_tag(255), None);
    }

    #[test]
    fn test_kind_predicates() {
        assert!(EntryKind::Directory.is_directory());
        assert!(!EntryKind::Directory.is_file());
        assert!(EntryKind::Symlink.is_symlink());
    }

    #[test]
    fn test_entry_info_serialization() {
        let info = EntryInfo {
            path: "/a/b.txt".to_string(),
            name: "b.txt".to_string(),
            kind: EntryKind::File,
            size: Some(5),
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"kind\":\"file\""));
        let back: EntryInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}

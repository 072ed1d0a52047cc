//! Tree <-> bytes
//!
//! Encoding runs in two passes: payload sizes are computed bottom-up into a
//! side table, then records are emitted top-down. No backward seek is needed,
//! so any `Write` works as a sink.
//!
//! Decoding is one forward pass. Directories carry no child count, so open
//! directories are tracked with the offset where their payload ends; a
//! directory closes when the cursor lands exactly on that offset.

use crate::catalog::{EntryKind, NodeId, Payload, Tree};
use crate::error::{DciError, Result};
use crate::header::{Header, RecordHeader, Version, HEADER_SIZE, RECORD_HEADER_SIZE};
use crate::validation;
use ahash::AHashMap;
use std::io::Write;
use std::sync::Arc;

/// Payload size of every entry, children computed before parents
fn payload_sizes(tree: &Tree) -> AHashMap<NodeId, u64> {
    let order = tree.subtree(tree.root());
    let mut sizes = AHashMap::with_capacity(order.len());

    for &id in order.iter().rev() {
        let node = &tree[id];
        let size = match node.kind() {
            EntryKind::Directory => node
                .children()
                .iter()
                .map(|child| RECORD_HEADER_SIZE as u64 + sizes[child])
                .sum(),
            EntryKind::File | EntryKind::Symlink => tree.payload(id).len() as u64,
        };
        sizes.insert(id, size);
    }

    sizes
}

/// Exact number of bytes `encode` produces for this tree
pub fn encoded_len(tree: &Tree) -> u64 {
    let sizes = payload_sizes(tree);
    HEADER_SIZE as u64 + sizes[&tree.root()]
}

/// Stream the encoded tree into `writer`, returning the bytes written
pub fn write_to<W: Write>(tree: &Tree, writer: &mut W) -> Result<u64> {
    let sizes = payload_sizes(tree);
    let root = tree.root();

    let count = tree[root].children().len();
    let count = u32::try_from(count).map_err(|_| DciError::TooManyRootEntries(count))?;
    writer.write_all(&Header::new(count).to_bytes()?)?;
    let mut written = HEADER_SIZE as u64;

    // Pre-order walk: a directory record is followed by its whole subtree.
    let mut stack: Vec<NodeId> = tree[root].children().iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        let node = &tree[id];
        let record = RecordHeader {
            kind: node.kind(),
            name: node.name().to_string(),
            payload_size: sizes[&id],
        };
        writer.write_all(&record.to_bytes()?)?;
        written += RECORD_HEADER_SIZE as u64;

        match node.kind() {
            EntryKind::Directory => stack.extend(node.children().iter().rev().copied()),
            EntryKind::File | EntryKind::Symlink => {
                let payload = tree.payload(id);
                writer.write_all(payload)?;
                written += payload.len() as u64;
            }
        }
    }

    Ok(written)
}

/// Encode the tree into a fresh buffer
pub fn encode(tree: &Tree) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded_len(tree) as usize);
    write_to(tree, &mut out)?;
    Ok(out)
}

/// Decode an archive image
///
/// File and symlink payloads in the returned tree borrow ranges of
/// `source`. Any structural violation fails the whole decode.
pub fn decode(source: Arc<[u8]>) -> Result<(Version, Tree)> {
    let header = Header::from_bytes(&source)?;
    let mut tree = Tree::with_source(Arc::clone(&source));
    let bytes: &[u8] = &source;
    let root = tree.root();

    let mut pos = HEADER_SIZE;
    let mut top_level: u64 = 0;
    // Open directories with the offset where their payload ends
    let mut open: Vec<(NodeId, usize)> = Vec::new();

    loop {
        while let Some(&(_, end)) = open.last() {
            if pos == end {
                open.pop();
            } else {
                break;
            }
        }

        let (parent, limit) = match open.last() {
            Some(&(dir, end)) => (dir, end),
            None if pos == bytes.len() => break,
            None => (root, bytes.len()),
        };

        if limit - pos < RECORD_HEADER_SIZE {
            return Err(DciError::Truncated {
                offset: pos,
                needed: RECORD_HEADER_SIZE,
                available: limit - pos,
            });
        }

        let record = RecordHeader::from_bytes(&bytes[pos..limit], pos)?;
        validation::validate_entry_name(&record.name).map_err(|e| {
            DciError::InvalidRecordName {
                offset: pos,
                reason: e.to_string(),
            }
        })?;

        let start = pos + RECORD_HEADER_SIZE;
        let end = usize::try_from(record.payload_size)
            .ok()
            .and_then(|size| start.checked_add(size))
            .filter(|&end| end <= limit)
            .ok_or(DciError::PayloadOverrun {
                offset: pos,
                end: start.saturating_add(record.payload_size.min(usize::MAX as u64) as usize),
                limit,
            })?;

        let payload = match record.kind {
            EntryKind::Directory => Payload::None,
            EntryKind::Symlink => {
                if std::str::from_utf8(&bytes[start..end]).is_err() {
                    return Err(DciError::InvalidLinkText(pos));
                }
                Payload::Shared(start..end)
            }
            EntryKind::File => Payload::Shared(start..end),
        };

        let id = tree
            .insert_child(parent, record.kind, &record.name, payload)
            .map_err(|e| match e {
                DciError::AlreadyExists(path) => DciError::DuplicateEntry(path),
                other => other,
            })?;

        if parent == root {
            top_level += 1;
        }

        if record.kind.is_directory() {
            open.push((id, end));
            pos = start;
        } else {
            pos = end;
        }
    }

    if top_level != u64::from(header.root_children) {
        return Err(DciError::ChildCountMismatch {
            declared: header.root_children,
            actual: top_level.min(u64::from(u32::MAX)) as u32,
        });
    }

    Ok((header.version, tree))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree
            .insert_child(root, EntryKind::Directory, "a", Payload::None)
            .unwrap();
        tree.insert_child(a, EntryKind::File, "b.txt", Payload::Owned(b"hello".to_vec()))
            .unwrap();
        tree
    }

    fn record(kind: u8, name: &str, size: u64) -> Vec<u8> {
        let mut bytes = vec![0u8; RECORD_HEADER_SIZE];
        bytes[0] = kind;
        bytes[1..1 + name.len()].copy_from_slice(name.as_bytes());
        bytes[64..72].copy_from_slice(&size.to_le_bytes());
        bytes
    }

    fn header(count: u32) -> Vec<u8> {
        Header::new(count).to_bytes().unwrap().to_vec()
    }

    #[test]
    fn test_empty_tree_bytes() {
        let bytes = encode(&Tree::new()).unwrap();
        assert_eq!(bytes, vec![b'D', b'C', b'I', 0x00, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_sample_size_and_layout() {
        let tree = sample_tree();
        let bytes = encode(&tree).unwrap();
        assert_eq!(bytes.len(), 8 + 72 + 72 + 5);
        assert_eq!(encoded_len(&tree), bytes.len() as u64);

        // Root count, then directory "a" whose payload is the file record
        assert_eq!(bytes[5], 1);
        assert_eq!(bytes[8], EntryKind::Directory.tag());
        assert_eq!(&bytes[8 + 64..8 + 72], &(72u64 + 5).to_le_bytes());
        assert_eq!(bytes[80], EntryKind::File.tag());
        assert_eq!(&bytes[152..], b"hello");
    }

    #[test]
    fn test_decode_sample() {
        let bytes = encode(&sample_tree()).unwrap();
        let (version, tree) = decode(Arc::from(bytes)).unwrap();

        assert_eq!(version, Version::CURRENT);
        let file = tree.lookup("/a/b.txt").unwrap();
        assert_eq!(tree.payload(file), b"hello");
        assert!(tree.payload_is_shared(file));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_write_to_reports_length() {
        let tree = sample_tree();
        let mut sink = Vec::new();
        let written = write_to(&tree, &mut sink).unwrap();
        assert_eq!(written, sink.len() as u64);
    }

    #[test]
    fn test_decode_empty_directory_and_siblings() {
        let mut bytes = header(2);
        bytes.extend(record(2, "empty", 0));
        bytes.extend(record(1, "f", 2));
        bytes.extend(b"hi");

        let (_, tree) = decode(Arc::from(bytes)).unwrap();
        assert!(tree[tree.lookup("/empty").unwrap()].children().is_empty());
        assert_eq!(tree.payload(tree.lookup("/f").unwrap()), b"hi");
    }

    #[test]
    fn test_decode_sorts_children() {
        let mut bytes = header(3);
        bytes.extend(record(1, "img11", 0));
        bytes.extend(record(1, "img2", 0));
        bytes.extend(record(1, "img1", 0));

        let (_, tree) = decode(Arc::from(bytes)).unwrap();
        let names: Vec<&str> = tree[tree.root()]
            .children()
            .iter()
            .map(|c| tree[*c].name())
            .collect();
        assert_eq!(names, vec!["img1", "img2", "img11"]);
    }

    #[test]
    fn test_decode_count_mismatch() {
        let mut bytes = header(2);
        bytes.extend(record(1, "only", 0));
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::ChildCountMismatch {
                declared: 2,
                actual: 1
            })
        ));

        let mut bytes = header(0);
        bytes.extend(record(1, "extra", 0));
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::ChildCountMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_child_overruns_directory() {
        // Directory claims 72 bytes but its child needs 72 + 3
        let mut bytes = header(1);
        bytes.extend(record(2, "d", 72));
        bytes.extend(record(1, "f", 3));
        bytes.extend(b"abc");
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::PayloadOverrun { .. })
        ));
    }

    #[test]
    fn test_decode_directory_boundary_not_on_record() {
        // Directory payload leaves 10 stray bytes after its only child
        let mut bytes = header(1);
        bytes.extend(record(2, "d", 72 + 10));
        bytes.extend(record(1, "f", 0));
        bytes.extend([0u8; 10]);
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let mut bytes = header(1);
        bytes.extend(record(1, "f", 100));
        bytes.extend(b"short");
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::PayloadOverrun { .. })
        ));
    }

    #[test]
    fn test_decode_huge_payload_size() {
        let mut bytes = header(1);
        bytes.extend(record(1, "f", u64::MAX));
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::PayloadOverrun { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_records() {
        let mut bytes = header(1);
        bytes.extend(record(9, "f", 0));
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::InvalidKind { tag: 9, .. })
        ));

        let mut bytes = header(1);
        bytes.extend(record(1, "a/b", 0));
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::InvalidRecordName { .. })
        ));

        let mut bytes = header(1);
        bytes.extend(record(3, "l", 2));
        bytes.extend([0xFF, 0xFE]);
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::InvalidLinkText(8))
        ));
    }

    #[test]
    fn test_decode_duplicate_names() {
        let mut bytes = header(2);
        bytes.extend(record(1, "same", 0));
        bytes.extend(record(2, "same", 0));
        assert!(matches!(
            decode(Arc::from(bytes)),
            Err(DciError::DuplicateEntry(p)) if p == "/same"
        ));
    }

    #[test]
    fn test_decode_deep_nesting() {
        // 2000 nested directories, built back to front
        let depth = 2000;
        let mut body = Vec::new();
        for level in (0..depth).rev() {
            let mut rec = record(2, &format!("d{}", level), body.len() as u64);
            rec.extend(body);
            body = rec;
        }
        let mut bytes = header(1);
        bytes.extend(body);

        let (_, tree) = decode(Arc::from(bytes.clone())).unwrap();
        assert_eq!(tree.len(), depth);
        assert_eq!(encode(&tree).unwrap(), bytes);
    }
}

//! Property-based tests for the archive format
//!
//! Random trees must survive encode/decode unchanged, and listings must come
//! back in natural order no matter the insertion order.

use dci_rs::catalog::natural_cmp;
use dci_rs::{Archive, EntryKind};
use proptest::prelude::*;

/// One step of building a random archive
#[derive(Debug, Clone)]
enum Op {
    Dir(usize, String),
    File(usize, String, Vec<u8>),
    Link(usize, String, String),
}

fn name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.-]{1,12}".prop_filter("dot names are reserved", |n| n != "." && n != "..")
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), name()).prop_map(|(d, n)| Op::Dir(d, n)),
        (any::<usize>(), name(), prop::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(d, n, data)| Op::File(d, n, data)),
        (any::<usize>(), name(), name()).prop_map(|(d, n, t)| Op::Link(d, n, t)),
    ]
}

/// Apply ops, picking parent directories among those created so far
fn build(ops: &[Op]) -> Archive {
    let mut archive = Archive::new();
    let mut dirs = vec!["".to_string()];

    for op in ops {
        match op {
            Op::Dir(d, n) => {
                let path = format!("{}/{}", dirs[d % dirs.len()], n);
                if archive.mkdir(&path).is_ok() {
                    dirs.push(path);
                }
            }
            Op::File(d, n, data) => {
                let path = format!("{}/{}", dirs[d % dirs.len()], n);
                let _ = archive.write_file(&path, data, false);
            }
            Op::Link(d, n, target) => {
                let path = format!("{}/{}", dirs[d % dirs.len()], n);
                let _ = archive.link(target, &path);
            }
        }
    }

    archive
}

/// Every entry as (path, kind, raw payload), sorted by path
fn snapshot(archive: &Archive) -> Vec<(String, EntryKind, Vec<u8>)> {
    let mut entries: Vec<_> = archive
        .tree()
        .paths()
        .filter(|p| *p != "/")
        .map(|p| {
            let kind = archive.kind(p).unwrap();
            let data = match kind {
                EntryKind::Directory => Vec::new(),
                _ => archive.data(p).unwrap().to_vec(),
            };
            (p.to_string(), kind, data)
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

proptest! {
    #[test]
    fn prop_round_trip(ops in prop::collection::vec(op(), 0..60)) {
        let archive = build(&ops);
        let bytes = archive.to_bytes().unwrap();
        prop_assert_eq!(bytes.len() as u64, archive.encoded_len());

        let decoded = Archive::from_bytes(bytes.clone()).unwrap();
        prop_assert_eq!(snapshot(&decoded), snapshot(&archive));

        // Re-encoding a decoded archive is byte-identical
        prop_assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn prop_children_in_natural_order(names in prop::collection::hash_set(name(), 1..40)) {
        let mut archive = Archive::new();
        for n in &names {
            archive.write_file(&format!("/{}", n), b"", false).unwrap();
        }

        let listed = archive.list("/", true).unwrap();
        prop_assert_eq!(listed.len(), names.len());
        for pair in listed.windows(2) {
            prop_assert!(natural_cmp(&pair[0], &pair[1]).is_lt());
        }
    }

    #[test]
    fn prop_failed_mutations_leave_bytes_unchanged(
        ops in prop::collection::vec(op(), 1..30),
        victim in name(),
    ) {
        let mut archive = build(&ops);
        let before = archive.to_bytes().unwrap();

        let long = format!("/{}", "x".repeat(63));
        prop_assert!(archive.mkdir(&long).is_err());
        let victim_path = format!("/{}", victim);
        prop_assert!(archive.rename(&victim_path, "/", true).is_err());
        // Generated names are at most 12 bytes, so this parent never exists
        let orphan_path = format!("/missing-parent-{}/f", victim);
        prop_assert!(archive.write_file(&orphan_path, b"", false).is_err());

        prop_assert_eq!(archive.to_bytes().unwrap(), before);
    }
}

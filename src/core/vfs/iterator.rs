//! Directory iteration

use super::pattern::NamePattern;
use crate::catalog::EntryKind;
use crate::path;
use crate::registry::ArchiveHandle;

/// Which children a directory listing yields
///
/// Symlinks count as files (they never point to directories).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirFilter {
    pub files: bool,
    pub dirs: bool,
    pub no_symlinks: bool,
    /// Name globs; empty accepts every name
    pub names: Vec<NamePattern>,
}

impl DirFilter {
    /// Files, directories and symlinks
    pub fn all() -> Self {
        DirFilter {
            files: true,
            dirs: true,
            no_symlinks: false,
            names: Vec::new(),
        }
    }

    /// Files and symlinks only
    pub fn files() -> Self {
        DirFilter {
            dirs: false,
            ..Self::all()
        }
    }

    /// Directories only
    pub fn dirs() -> Self {
        DirFilter {
            files: false,
            ..Self::all()
        }
    }

    /// Exclude symlinks
    pub fn no_symlinks(mut self) -> Self {
        self.no_symlinks = true;
        self
    }

    /// Add a name glob
    pub fn with_name(mut self, pattern: impl Into<NamePattern>) -> Self {
        self.names.push(pattern.into());
        self
    }

    pub fn accepts(&self, name: &str, kind: EntryKind) -> bool {
        let kind_ok = match kind {
            EntryKind::Directory => self.dirs,
            EntryKind::File => self.files,
            EntryKind::Symlink => self.files && !self.no_symlinks,
        };
        kind_ok && NamePattern::any_matches(&self.names, name)
    }
}

impl Default for DirFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// One directory child yielded by an iterator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Bare name
    pub name: String,
    /// Full name, qualified the same way as the listed directory
    pub path: String,
    pub kind: EntryKind,
}

/// Lazy iterator over the children of an archive directory
///
/// Children are looked up one at a time from the live tree, so entries added
/// behind the cursor are not seen. Not restartable.
#[derive(Debug)]
pub struct DirIterator {
    handle: ArchiveHandle,
    /// Internal path of the listed directory
    dir: String,
    /// Qualified prefix that child names are appended to
    prefix: String,
    filter: DirFilter,
    cursor: usize,
}

impl DirIterator {
    pub(crate) fn new(handle: ArchiveHandle, dir: String, prefix: String, filter: DirFilter) -> Self {
        DirIterator {
            handle,
            dir,
            prefix,
            filter,
            cursor: 0,
        }
    }

    /// Internal path of the listed directory
    pub fn dir(&self) -> &str {
        &self.dir
    }
}

impl Iterator for DirIterator {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        let archive = self.handle.archive();
        let tree = archive.tree();
        let dir = tree.lookup(&self.dir)?;

        while let Some(&child) = tree[dir].children().get(self.cursor) {
            self.cursor += 1;

            let node = &tree[child];
            if self.filter.accepts(node.name(), node.kind()) {
                let internal = path::join(&self.dir, node.name());
                return Some(DirEntry {
                    name: node.name().to_string(),
                    path: format!("{}{}", self.prefix, internal),
                    kind: node.kind(),
                });
            }
        }

        None
    }
}

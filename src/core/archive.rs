//! Main Archive API
//!
//! An [`Archive`] owns the decoded entry tree of one DCI image and exposes
//! path-based queries and mutations on it. Mutations are atomic: they either
//! succeed completely or leave the tree untouched and record a message that
//! [`Archive::last_error`] returns.

use crate::catalog::{EntryInfo, EntryKind, NodeId, Payload, Tree};
use crate::codec;
use crate::error::{DciError, Result};
use crate::header::Version;
use crate::io::ArchiveFile;
use crate::path;
use crate::validation;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of symlinks followed while resolving one path
pub const MAX_SYMLINK_HOPS: usize = 32;

/// An in-memory DCI archive
#[derive(Debug, Clone)]
pub struct Archive {
    tree: Tree,

    /// Format version of the loaded image
    version: Version,

    /// False after a failed load; an invalid archive refuses mutation
    valid: bool,

    /// Message of the most recent failed load or mutation
    last_error: Option<String>,

    /// Set by every successful mutation, cleared by `save`/`mark_saved`
    modified: bool,
}

impl Archive {
    /// Create an empty, valid archive
    pub fn new() -> Self {
        Archive {
            tree: Tree::new(),
            version: Version::CURRENT,
            valid: true,
            last_error: None,
            modified: false,
        }
    }

    /// Decode an archive image
    ///
    /// Fails on any structural violation; no partial tree is ever returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use dci_rs::Archive;
    ///
    /// let archive = Archive::from_bytes(vec![0x44, 0x43, 0x49, 0x00, 0x01, 0x00, 0x00, 0x00])?;
    /// assert!(archive.tree().is_empty());
    /// # Ok::<(), dci_rs::DciError>(())
    /// ```
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let (version, tree) = codec::decode(bytes.into())?;
        Ok(Archive {
            tree,
            version,
            valid: true,
            last_error: None,
            modified: false,
        })
    }

    /// Read and decode the archive stored at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = ArchiveFile::new(path);
        let bytes = file.read_all()?;
        let archive = Self::from_bytes(bytes)?;

        info!(
            "Opened archive {} ({} entries, version {})",
            file.path().display(),
            archive.tree.len(),
            archive.version
        );
        Ok(archive)
    }

    /// Replace the whole tree with the decoded contents of `bytes`
    ///
    /// On failure the archive becomes invalid: the tree is emptied and the
    /// message is kept in [`last_error`](Self::last_error).
    pub fn load(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<()> {
        match codec::decode(bytes.into()) {
            Ok((version, tree)) => {
                self.tree = tree;
                self.version = version;
                self.valid = true;
                self.last_error = None;
                self.modified = false;
                Ok(())
            }
            Err(e) => {
                warn!("Rejected archive image: {}", e);
                self.tree = Tree::new();
                self.valid = false;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Serialize the archive into a new buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.ensure_valid()?;
        codec::encode(&self.tree)
    }

    /// Stream the encoded archive into `writer`, returning the bytes written
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        self.ensure_valid()?;
        codec::write_to(&self.tree, writer)
    }

    /// Exact size of the encoded archive
    pub fn encoded_len(&self) -> u64 {
        codec::encoded_len(&self.tree)
    }

    /// Overwrite the file at `path` with the complete encoded archive
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<u64> {
        self.ensure_valid()?;

        let file = ArchiveFile::new(path);
        let tree = &self.tree;
        let written = file.write_with(|writer| codec::write_to(tree, writer))?;
        self.modified = false;

        info!("Saved archive {} ({} bytes)", file.path().display(), written);
        Ok(written)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Message of the most recent failure, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True if the tree changed since it was loaded or last saved
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn mark_saved(&mut self) {
        self.modified = false;
    }

    /// The underlying entry tree
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Raw bytes of the image the archive was last loaded from
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.tree.source()
    }

    // ---- queries -------------------------------------------------------

    /// True if an entry exists at `path` (symlinks are not followed)
    pub fn exists(&self, path: &str) -> bool {
        self.kind(path).is_some()
    }

    /// Kind of the entry at `path` (symlinks are not followed)
    pub fn kind(&self, path: &str) -> Option<EntryKind> {
        let normalized = path::normalize(path).ok()?;
        self.tree.lookup(&normalized).map(|id| self.tree[id].kind())
    }

    /// Children of a directory in stored order
    ///
    /// Returns bare names when `only_file_name` is set, absolute paths
    /// otherwise.
    pub fn list(&self, dir: &str, only_file_name: bool) -> Result<Vec<String>> {
        let (dir, id) = self.directory(dir)?;
        Ok(self.tree[id]
            .children()
            .iter()
            .map(|child| {
                let name = self.tree[*child].name();
                if only_file_name {
                    name.to_string()
                } else {
                    path::join(&dir, name)
                }
            })
            .collect())
    }

    /// Children of a directory with their kind and size
    pub fn entries(&self, dir: &str) -> Result<Vec<EntryInfo>> {
        let (dir, id) = self.directory(dir)?;
        Ok(self.tree[id]
            .children()
            .iter()
            .map(|child| self.entry_info(&dir, *child))
            .collect())
    }

    /// Stored payload of a file or symlink, without following links
    pub fn data(&self, path: &str) -> Result<&[u8]> {
        let (path, id) = self.node(path)?;
        if self.tree[id].kind().is_directory() {
            return Err(DciError::IsADirectory(path));
        }
        Ok(self.tree.payload(id))
    }

    /// File contents at `path`, following symlinks
    pub fn read(&self, path: &str) -> Result<&[u8]> {
        let resolved = self.resolve(path)?;
        let id = self
            .tree
            .lookup(&resolved)
            .ok_or_else(|| DciError::NotFound(resolved.clone()))?;

        match self.tree[id].kind() {
            EntryKind::File => Ok(self.tree.payload(id)),
            _ => Err(DciError::IsADirectory(resolved)),
        }
    }

    /// Size of the file at `path`, following symlinks
    pub fn size(&self, path: &str) -> Result<u64> {
        self.read(path).map(|data| data.len() as u64)
    }

    /// Literal text stored in the symlink at `path`
    pub fn raw_link(&self, path: &str) -> Result<String> {
        let (path, id) = self.node(path)?;
        if !self.tree[id].kind().is_symlink() {
            return Err(DciError::NotASymlink(path));
        }
        Ok(self.link_text(id))
    }

    /// Absolute path the symlink at `path` points to (one level)
    pub fn symlink_target(&self, path: &str) -> Result<String> {
        let (path, id) = self.node(path)?;
        if !self.tree[id].kind().is_symlink() {
            return Err(DciError::NotASymlink(path));
        }
        let resolved = path::resolve_link(&path, &self.link_text(id))?;
        path::normalize(&resolved)
    }

    /// Follow symlinks starting at `path` until a non-link path is reached
    ///
    /// The returned path may not exist (dangling link).
    pub fn resolve(&self, path: &str) -> Result<String> {
        let start = path::normalize(path)?;
        let mut current = start.clone();

        for _ in 0..=MAX_SYMLINK_HOPS {
            let id = match self.tree.lookup(&current) {
                Some(id) if self.tree[id].kind().is_symlink() => id,
                _ => return Ok(current),
            };
            let resolved = path::resolve_link(&current, &self.link_text(id))?;
            current = path::normalize(&resolved)?;
        }

        Err(DciError::SymlinkLoop(start))
    }

    // ---- mutations -----------------------------------------------------

    /// Create a directory; its parent must already exist
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let result = self.try_make(path, EntryKind::Directory, Payload::None);
        self.record("mkdir", path, result.map(|_| ()))
    }

    /// Create a directory and every missing ancestor
    ///
    /// Existing directories along the way are accepted, including the
    /// target itself.
    pub fn mkdir_all(&mut self, path: &str) -> Result<()> {
        let result = self.try_mkdir_all(path);
        self.record("mkdir_all", path, result)
    }

    /// Create or replace a file
    ///
    /// Replacing needs `overwrite` and an existing File. A symlink at `path`
    /// is followed and its target written (created if dangling).
    pub fn write_file(&mut self, path: &str, data: &[u8], overwrite: bool) -> Result<()> {
        let result = self.try_write_file(path, data, overwrite);
        self.record("write_file", path, result)
    }

    /// Remove an entry and its subtree; on the root, remove every child
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let result = self.try_remove(path);
        self.record("remove", path, result)
    }

    /// Move an entry, optionally replacing what is at `to`
    pub fn rename(&mut self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        let result = self.try_rename(from, to, overwrite);
        self.record("rename", from, result)
    }

    /// Deep-copy an entry to a new path
    pub fn copy(&mut self, from: &str, to: &str) -> Result<()> {
        let result = self.try_copy(from, to);
        self.record("copy", from, result)
    }

    /// Create a symlink at `to` holding the literal text `target`
    ///
    /// Relative text is resolved against the link's directory when followed.
    /// A target that resolves to an existing directory is rejected.
    pub fn link(&mut self, target: &str, to: &str) -> Result<()> {
        let result = self.try_link(target, to);
        self.record("link", to, result)
    }

    fn try_make(&mut self, path: &str, kind: EntryKind, payload: Payload) -> Result<NodeId> {
        self.ensure_valid()?;
        let path = path::normalize(path)?;
        let (parent, name) = self.free_slot(&path)?;
        self.tree.insert_child(parent, kind, &name, payload)
    }

    fn try_mkdir_all(&mut self, path: &str) -> Result<()> {
        self.ensure_valid()?;
        let path = path::normalize(path)?;

        // Find the deepest existing ancestor, then check everything below it
        // before touching the tree.
        let mut missing = Vec::new();
        let mut current = path.as_str();
        let anchor = loop {
            if let Some(id) = self.tree.lookup(current) {
                break id;
            }
            missing.push(path::file_name(current));
            current = match path::parent(current) {
                Some(parent) => parent,
                None => return Err(DciError::NotFound(path.clone())),
            };
        };

        if !self.tree[anchor].kind().is_directory() {
            return Err(DciError::NotADirectory(current.to_string()));
        }
        for name in &missing {
            validation::validate_entry_name(name)?;
        }

        let mut parent = anchor;
        for name in missing.iter().rev() {
            parent = self
                .tree
                .insert_child(parent, EntryKind::Directory, name, Payload::None)?;
        }
        Ok(())
    }

    fn try_write_file(&mut self, path: &str, data: &[u8], overwrite: bool) -> Result<()> {
        self.ensure_valid()?;
        let path = path::normalize(path)?;

        let id = match self.tree.lookup(&path) {
            None => {
                self.try_make(&path, EntryKind::File, Payload::Owned(data.to_vec()))?;
                return Ok(());
            }
            Some(id) => id,
        };

        if !overwrite {
            return Err(DciError::AlreadyExists(path));
        }

        match self.tree[id].kind() {
            EntryKind::File => {
                self.tree.set_payload(id, data.to_vec());
                Ok(())
            }
            EntryKind::Directory => Err(DciError::IsADirectory(path)),
            EntryKind::Symlink => {
                let target = self.resolve(&path)?;
                match self.tree.lookup(&target) {
                    Some(target_id) if self.tree[target_id].kind().is_file() => {
                        self.tree.set_payload(target_id, data.to_vec());
                        Ok(())
                    }
                    Some(_) => Err(DciError::SymlinkToDirectory { link: path, target }),
                    None => {
                        self.try_make(&target, EntryKind::File, Payload::Owned(data.to_vec()))?;
                        Ok(())
                    }
                }
            }
        }
    }

    fn try_remove(&mut self, path: &str) -> Result<()> {
        self.ensure_valid()?;
        let (_, id) = self.node(path)?;
        if id == self.tree.root() {
            self.tree.clear_children(id)
        } else {
            self.tree.remove(id)
        }
    }

    fn try_rename(&mut self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        self.ensure_valid()?;
        let from = path::normalize(from)?;
        let to = path::normalize(to)?;

        if from == to {
            return Err(DciError::SamePath(from));
        }
        if from == path::ROOT {
            return Err(DciError::RootOperation("renamed"));
        }
        if to == path::ROOT {
            return Err(DciError::RootOperation("replaced"));
        }

        if path::is_descendant(&to, &from) {
            return Err(DciError::MoveIntoSelf { from, to });
        }

        let (_, source) = self.node(&from)?;
        let name = path::file_name(&to).to_string();
        validation::validate_entry_name(&name)?;
        let parent = self.parent_dir(&to)?;

        if let Some(occupant) = self.tree.lookup(&to) {
            if !overwrite {
                return Err(DciError::AlreadyExists(to));
            }
            if path::is_descendant(&from, &to) {
                return Err(DciError::ReplaceAncestor { from, to });
            }
            self.tree.remove(occupant)?;
        }

        self.tree.move_node(source, parent, &name)
    }

    fn try_copy(&mut self, from: &str, to: &str) -> Result<()> {
        self.ensure_valid()?;
        let (from, source) = self.node(from)?;
        let to = path::normalize(to)?;
        if from == to {
            return Err(DciError::SamePath(from));
        }

        let (parent, name) = self.free_slot(&to)?;
        let snapshot = self.tree.detach_copy(source);
        self.tree.attach(parent, &name, snapshot)?;
        Ok(())
    }

    fn try_link(&mut self, target: &str, to: &str) -> Result<()> {
        self.ensure_valid()?;
        if target.is_empty() || target.contains('\0') {
            return Err(DciError::InvalidPath(target.to_string()));
        }
        let to = path::normalize(to)?;
        let (parent, name) = self.free_slot(&to)?;

        // Targets that do not resolve are stored anyway (dangling link).
        let pointed = path::resolve_link(&to, target)
            .and_then(|resolved| self.resolve(&resolved))
            .ok();
        if let Some(pointed) = pointed {
            if let Some(id) = self.tree.lookup(&pointed) {
                if self.tree[id].kind().is_directory() {
                    return Err(DciError::SymlinkToDirectory {
                        link: to,
                        target: pointed,
                    });
                }
            }
        }

        self.tree.insert_child(
            parent,
            EntryKind::Symlink,
            &name,
            Payload::Owned(target.as_bytes().to_vec()),
        )?;
        Ok(())
    }

    // ---- helpers -------------------------------------------------------

    fn ensure_valid(&self) -> Result<()> {
        if self.valid {
            return Ok(());
        }
        Err(DciError::InvalidArchive(
            self.last_error
                .clone()
                .unwrap_or_else(|| "load failed".to_string()),
        ))
    }

    fn record(&mut self, op: &str, path: &str, result: Result<()>) -> Result<()> {
        match &result {
            Ok(()) => {
                debug!("{} {}", op, path);
                self.modified = true;
            }
            Err(e) => {
                debug!("{} {} failed: {}", op, path, e);
                self.last_error = Some(e.to_string());
            }
        }
        result
    }

    /// Normalize `path` and look it up
    fn node(&self, path: &str) -> Result<(String, NodeId)> {
        let path = path::normalize(path)?;
        match self.tree.lookup(&path) {
            Some(id) => Ok((path, id)),
            None => Err(DciError::NotFound(path)),
        }
    }

    fn directory(&self, path: &str) -> Result<(String, NodeId)> {
        let (path, id) = self.node(path)?;
        if !self.tree[id].kind().is_directory() {
            return Err(DciError::NotADirectory(path));
        }
        Ok((path, id))
    }

    /// Existing directory that would hold `path`
    fn parent_dir(&self, path: &str) -> Result<NodeId> {
        let parent = path::parent(path).ok_or(DciError::RootOperation("created"))?;
        let id = self
            .tree
            .lookup(parent)
            .ok_or_else(|| DciError::ParentNotFound(parent.to_string()))?;
        if !self.tree[id].kind().is_directory() {
            return Err(DciError::NotADirectory(parent.to_string()));
        }
        Ok(id)
    }

    /// Parent id and validated leaf name for a path where nothing exists yet
    fn free_slot(&self, path: &str) -> Result<(NodeId, String)> {
        if self.tree.lookup(path).is_some() {
            return Err(DciError::AlreadyExists(path.to_string()));
        }
        let parent = self.parent_dir(path)?;
        let name = path::file_name(path);
        validation::validate_entry_name(name)?;
        Ok((parent, name.to_string()))
    }

    fn link_text(&self, id: NodeId) -> String {
        String::from_utf8_lossy(self.tree.payload(id)).into_owned()
    }

    fn entry_info(&self, dir: &str, id: NodeId) -> EntryInfo {
        let node = &self.tree[id];
        EntryInfo {
            path: path::join(dir, node.name()),
            name: node.name().to_string(),
            kind: node.kind(),
            size: match node.kind() {
                EntryKind::Directory => None,
                _ => Some(self.tree.payload(id).len() as u64),
            },
        }
    }
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

//! In-memory entry tree
//!
//! Entries live in an arena addressed by [`NodeId`]. Each directory owns the
//! ordered list of its children's ids, each child keeps its parent's id for
//! path reconstruction, and a flat index maps absolute paths to ids. All
//! structural changes go through [`Tree`] so the index never drifts from the
//! tree.

pub mod metadata;
pub mod order;

pub use metadata::{EntryInfo, EntryKind, Node, NodeId};
pub use order::natural_cmp;

pub(crate) use metadata::Payload;

use crate::error::{DciError, Result};
use crate::path;
use ahash::AHashMap;
use std::ops::Index;
use std::sync::Arc;

/// A detached deep copy of a subtree, used by `copy`
#[derive(Debug, Clone)]
pub(crate) struct Detached {
    kind: EntryKind,
    payload: Payload,
    children: Vec<(String, Detached)>,
}

/// Arena-backed entry tree with a path index
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    index: AHashMap<String, NodeId>,
    /// Buffer that `Payload::Shared` ranges point into
    source: Option<Arc<[u8]>>,
}

impl Tree {
    /// Create a tree holding only the root directory
    pub fn new() -> Self {
        let mut index = AHashMap::new();
        index.insert(path::ROOT.to_string(), NodeId(0));

        Tree {
            nodes: vec![Some(Node::new(
                EntryKind::Directory,
                String::new(),
                None,
                Payload::None,
            ))],
            free: Vec::new(),
            index,
            source: None,
        }
    }

    /// Create an empty tree whose payloads may borrow from `source`
    pub(crate) fn with_source(source: Arc<[u8]>) -> Self {
        let mut tree = Self::new();
        tree.source = Some(source);
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of entries, root excluded
    pub fn len(&self) -> usize {
        self.index.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Look up an entry by normalized absolute path
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    /// All indexed paths, root included, in no particular order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Build the absolute path of an entry by walking parent references
    pub fn path_of(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = id;
        while let Some(parent) = self[current].parent {
            names.push(self[current].name.as_str());
            current = parent;
        }

        if names.is_empty() {
            return path::ROOT.to_string();
        }

        let mut out = String::new();
        for name in names.iter().rev() {
            out.push(path::SEPARATOR);
            out.push_str(name);
        }
        out
    }

    /// Payload bytes of a file or symlink (empty for directories)
    pub fn payload(&self, id: NodeId) -> &[u8] {
        match &self[id].payload {
            Payload::None => &[],
            Payload::Owned(data) => data,
            Payload::Shared(range) => match &self.source {
                Some(source) => &source[range.clone()],
                None => &[],
            },
        }
    }

    /// Raw bytes the tree was decoded from, if any
    pub fn source(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }

    /// True if the payload still aliases the decoded buffer
    pub fn payload_is_shared(&self, id: NodeId) -> bool {
        self[id].payload.is_shared()
    }

    /// Replace the payload with an owned copy of `data`
    pub(crate) fn set_payload(&mut self, id: NodeId, data: Vec<u8>) {
        self.node_mut(id).payload = Payload::Owned(data);
    }

    /// Position of `name` among the children of `parent`
    ///
    /// `Ok` if a child with that name exists, `Err` with the sorted
    /// insertion point otherwise.
    pub fn find_child(&self, parent: NodeId, name: &str) -> std::result::Result<usize, usize> {
        self[parent]
            .children
            .binary_search_by(|child| natural_cmp(&self[*child].name, name))
    }

    /// Insert a new child at its natural-sort position and index it
    pub(crate) fn insert_child(
        &mut self,
        parent: NodeId,
        kind: EntryKind,
        name: &str,
        payload: Payload,
    ) -> Result<NodeId> {
        if !self[parent].kind.is_directory() {
            return Err(DciError::NotADirectory(self.path_of(parent)));
        }

        let position = match self.find_child(parent, name) {
            Ok(_) => {
                return Err(DciError::AlreadyExists(path::join(
                    &self.path_of(parent),
                    name,
                )))
            }
            Err(position) => position,
        };

        let node = Node::new(kind, name.to_string(), Some(parent), payload);
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };

        self.node_mut(parent).children.insert(position, id);
        let key = self.path_of(id);
        self.index.insert(key, id);

        Ok(id)
    }

    /// Ids of `id` and all its descendants, parents before children
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut cursor = 0;
        while cursor < out.len() {
            let current = out[cursor];
            out.extend_from_slice(&self[current].children);
            cursor += 1;
        }
        out
    }

    /// Detach a non-root entry and drop its whole subtree
    pub(crate) fn remove(&mut self, id: NodeId) -> Result<()> {
        let parent = self[id].parent.ok_or(DciError::RootOperation("removed"))?;

        self.unindex_subtree(id);
        self.node_mut(parent).children.retain(|child| *child != id);
        for node in self.subtree(id) {
            self.nodes[node.0] = None;
            self.free.push(node.0);
        }
        Ok(())
    }

    /// Drop every child of a directory
    pub(crate) fn clear_children(&mut self, id: NodeId) -> Result<()> {
        let children = self[id].children.clone();
        for child in children {
            self.remove(child)?;
        }
        Ok(())
    }

    /// Re-parent an entry under `new_parent` with `new_name`
    ///
    /// The caller must have checked that the destination is free and that
    /// `new_parent` is not inside the moved subtree.
    pub(crate) fn move_node(&mut self, id: NodeId, new_parent: NodeId, new_name: &str) -> Result<()> {
        let old_parent = self[id].parent.ok_or(DciError::RootOperation("moved"))?;
        if !self[new_parent].kind.is_directory() {
            return Err(DciError::NotADirectory(self.path_of(new_parent)));
        }

        let position = match self.find_child(new_parent, new_name) {
            Ok(_) => {
                return Err(DciError::AlreadyExists(path::join(
                    &self.path_of(new_parent),
                    new_name,
                )))
            }
            Err(position) => position,
        };

        self.unindex_subtree(id);
        self.node_mut(old_parent).children.retain(|child| *child != id);

        {
            let node = self.node_mut(id);
            node.name = new_name.to_string();
            node.parent = Some(new_parent);
        }
        // Removing `id` from the same parent may shift the insertion point.
        let position = if old_parent == new_parent {
            match self.find_child(new_parent, new_name) {
                Ok(p) | Err(p) => p,
            }
        } else {
            position
        };
        self.node_mut(new_parent).children.insert(position, id);

        self.index_subtree(id);
        Ok(())
    }

    /// Deep-copy a subtree out of the arena
    pub(crate) fn detach_copy(&self, id: NodeId) -> Detached {
        let node = &self[id];
        Detached {
            kind: node.kind,
            payload: node.payload.clone(),
            children: node
                .children
                .iter()
                .map(|child| (self[*child].name.clone(), self.detach_copy(*child)))
                .collect(),
        }
    }

    /// Insert a detached copy under `parent` as `name`
    pub(crate) fn attach(&mut self, parent: NodeId, name: &str, detached: Detached) -> Result<NodeId> {
        let id = self.insert_child(parent, detached.kind, name, detached.payload)?;
        for (child_name, child) in detached.children {
            self.attach(id, &child_name, child)?;
        }
        Ok(id)
    }

    fn unindex_subtree(&mut self, id: NodeId) {
        for node in self.subtree(id) {
            let key = self.path_of(node);
            self.index.remove(&key);
        }
    }

    fn index_subtree(&mut self, id: NodeId) {
        for node in self.subtree(id) {
            let key = self.path_of(node);
            self.index.insert(key, node);
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale node id {:?}", id),
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.nodes.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale node id {:?}", id),
        }
    }
}

//! The public, path-keyed trie handle.
//!
//! A [`Trie`] is a thin handle over a shared node arena: it carries the
//! delimiter, a logical prefix and ingestion settings. Handles created with
//! [`Trie::with_prefix`] or [`Trie::with_prefix_replaced`] share the arena,
//! so writes through one are visible through all of them. [`Trie::dup`]
//! (and `Clone`) deep-copy the nodes into an independent arena.
//!
//! Each call takes the arena lock once, so a single operation is atomic.
//! Nothing coordinates sequences of calls across handles; callers that need
//! read-modify-write consistency must serialize those sequences themselves.

use std::fmt;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use serde_json::Value;
use tracing::debug;

use crate::config::TrieConfig;
use crate::error::{Error, Result};
use crate::matcher::Location;
use crate::node::{Node, NodeArena, NodeId};
use crate::pool::{BufferPool, PooledBuf};
use crate::ttl::TtlSlot;

/// True if `path` lies at or below `key` under `delimiter`.
pub(crate) fn in_scope(path: &str, key: &str, delimiter: char) -> bool {
    if key.is_empty() || path == key {
        return true;
    }
    match path.strip_prefix(key) {
        Some(rest) => key.ends_with(delimiter) || rest.starts_with(delimiter),
        None => false,
    }
}

/// True if `path` is `key`, possibly followed by one trailing delimiter.
fn names_key(path: &str, key: &str, delimiter: char) -> bool {
    match path.strip_prefix(key) {
        Some(rest) => rest.is_empty() || rest.strip_prefix(delimiter) == Some(""),
        None => false,
    }
}

/// State shared by every handle of one tree.
pub(crate) struct Shared<T> {
    pub(crate) arena: RwLock<NodeArena<T>>,
    pub(crate) ttl: Mutex<TtlSlot<T>>,
}

impl<T> Shared<T> {
    fn new(arena: NodeArena<T>) -> Arc<Self> {
        Arc::new(Self {
            arena: RwLock::new(arena),
            ttl: Mutex::new(TtlSlot::Idle),
        })
    }
}

/// Result of [`Trie::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Queried<T> {
    /// Data stored at the path; `None` for a branch without a value.
    pub data: Option<T>,
    /// The path names a subtree.
    pub branch: bool,
}

/// Result of [`Trie::remove_ex`].
pub struct Removed<T> {
    /// Key that was removed, prefix included.
    pub path: String,
    /// Parent of the removed key in the source tree; `None` once
    /// re-compression pruned it or merged it with its remaining child.
    pub parent: Option<NodeId>,
    /// Path of that parent at the time of removal.
    pub parent_path: String,
    /// The removed nodes as an independent tree; keys keep their full path.
    pub subtree: Trie<T>,
}

/// Hierarchical key-value store over a delimiter-aware radix trie.
pub struct Trie<T> {
    pub(crate) shared: Arc<Shared<T>>,
    pub(crate) prefix: String,
    pub(crate) delimiter: char,
    pub(crate) flatten_slices: bool,
}

impl<T> Trie<T> {
    pub fn new() -> Self {
        Self::with_config(TrieConfig::default())
    }

    pub fn with_config(config: TrieConfig) -> Self {
        Self::from_arena(NodeArena::new(), config)
    }

    pub(crate) fn from_arena(arena: NodeArena<T>, config: TrieConfig) -> Self {
        Self {
            shared: Shared::new(arena),
            prefix: config.prefix,
            delimiter: config.delimiter,
            flatten_slices: config.flatten_slices,
        }
    }

    fn handle(&self, prefix: String) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            prefix,
            delimiter: self.delimiter,
            flatten_slices: self.flatten_slices,
        }
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Change the delimiter. Stored keys are reinterpreted from the next
    /// call on; no node is touched.
    pub fn set_delimiter(&mut self, delimiter: char) {
        debug!(from = %self.delimiter, to = %delimiter, "delimiter changed");
        self.delimiter = delimiter;
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
        debug!(prefix = %self.prefix, "prefix changed");
    }

    pub fn flatten_slices(&self) -> bool {
        self.flatten_slices
    }

    pub fn set_flatten_slices(&mut self, flatten: bool) {
        self.flatten_slices = flatten;
    }

    /// A handle on the same tree scoped below `prefix` (appended to the
    /// current prefix).
    pub fn with_prefix(&self, prefix: &str) -> Self {
        let joined = self.full_key(prefix);
        self.handle(joined.as_str().to_owned())
    }

    /// A handle on the same tree whose prefix is exactly `prefix`.
    pub fn with_prefix_replaced(&self, prefix: &str) -> Self {
        self.handle(prefix.to_owned())
    }

    /// True if `other` shares this handle's tree.
    pub fn shares_root_with(&self, other: &Trie<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    #[inline]
    pub(crate) fn full_key(&self, path: &str) -> PooledBuf<'static> {
        BufferPool::global().join(&self.prefix, path, self.delimiter)
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Store `data` at `path`, returning the previous value.
    pub fn insert(&self, path: &str, data: T) -> Option<T> {
        let key = self.full_key(path);
        let (_, old) = self.shared.arena.write().insert(&key, data);
        old
    }

    /// Like [`insert`](Self::insert), but marks the node as modified by the
    /// user rather than populated by a loader.
    pub fn set(&self, path: &str, data: T) -> Option<T> {
        let key = self.full_key(path);
        let mut arena = self.shared.arena.write();
        let (id, old) = arena.insert(&key, data);
        arena[id].modified = true;
        old
    }

    /// Remove `path` and everything below it.
    pub fn remove(&self, path: &str) -> bool {
        let key = self.full_key(path);
        let mut arena = self.shared.arena.write();
        let loc = arena.resolve(&key, self.delimiter);
        match loc.node {
            Some(id) if loc.is_hit() => arena.remove_at(id, &key, self.delimiter, false).is_some(),
            _ => false,
        }
    }

    /// Remove `path` and hand back the removed subtree with its parent.
    pub fn remove_ex(&self, path: &str) -> Option<Removed<T>> {
        let key = self.full_key(path);
        let mut arena = self.shared.arena.write();
        let loc = arena.resolve(&key, self.delimiter);
        let id = loc.node.filter(|_| loc.is_hit())?;
        let detached = arena.remove_at(id, &key, self.delimiter, true)?;
        let subtree = detached.subtree?;
        Some(Removed {
            path: key.as_str().to_owned(),
            parent: detached.parent,
            parent_path: detached.parent_path,
            subtree: Trie::from_arena(subtree, TrieConfig::new().delimiter(self.delimiter)),
        })
    }

    /// Set description and comment on the node at `path`.
    ///
    /// Partial matches are accepted so container paths can be annotated;
    /// returns `false` only when nothing resolves.
    pub fn set_comment(&self, path: &str, description: &str, comment: &str) -> bool {
        self.update_meta(path, |node| {
            let meta = node.meta_mut();
            meta.description = Some(description.to_owned());
            meta.comment = Some(comment.to_owned());
        })
    }

    /// Attach an opaque tag to the node at `path`. Same matching rules as
    /// [`set_comment`](Self::set_comment).
    pub fn set_tag(&self, path: &str, tag: impl Into<Value>) -> bool {
        let tag = tag.into();
        self.update_meta(path, move |node| {
            node.meta_mut().tag = Some(tag);
        })
    }

    fn update_meta(&self, path: &str, f: impl FnOnce(&mut Node<T>)) -> bool {
        let key = self.full_key(path);
        let mut arena = self.shared.arena.write();
        let loc = arena.resolve(&key, self.delimiter);
        let Some(id) = loc.node else {
            return false;
        };
        // Inside a longer fragment: give the key a node of its own.
        let node = &arena[id];
        if !names_key(&node.path, &key, self.delimiter) {
            let pos = node.fragment.len() - (node.path.len() - key.len());
            arena.split(id, pos);
        }
        let node = &mut arena[id];
        f(node);
        node.modified = true;
        true
    }

    /// Reset the modified flag on every node under this handle.
    pub fn clear_modified(&self) {
        let key = self.full_key("");
        let mut arena = self.shared.arena.write();
        let ids: Vec<NodeId> = arena
            .preorder(arena.root())
            .filter(|(_, n)| n.modified && in_scope(&n.path, &key, self.delimiter))
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            arena[id].modified = false;
        }
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Resolve `path` to a node.
    pub fn locate(&self, path: &str) -> Location {
        let key = self.full_key(path);
        self.shared.arena.read().resolve(&key, self.delimiter)
    }

    /// Borrow a node by id.
    ///
    /// The guard holds the tree's read lock: drop it before writing through
    /// any handle of this tree.
    pub fn node(&self, id: NodeId) -> Option<MappedRwLockReadGuard<'_, Node<T>>> {
        RwLockReadGuard::try_map(self.shared.arena.read(), |arena| arena.get(id)).ok()
    }

    /// Run `f` on the node `path` resolves to (full or partial match).
    pub fn with_node<R>(&self, path: &str, f: impl FnOnce(&Node<T>, Location) -> R) -> Option<R> {
        let key = self.full_key(path);
        let arena = self.shared.arena.read();
        let loc = arena.resolve(&key, self.delimiter);
        let node = arena.get(loc.node?)?;
        Some(f(node, loc))
    }

    /// The node at `path` was changed by a user-driven write since the last
    /// [`clear_modified`](Self::clear_modified).
    pub fn is_modified(&self, path: &str) -> bool {
        self.with_node(path, |node, loc| loc.is_hit() && node.modified)
            .unwrap_or(false)
    }

    /// `path` names a stored key or subtree.
    pub fn search(&self, path: &str) -> bool {
        self.locate(path).is_hit()
    }

    /// Alias of [`search`](Self::search).
    pub fn has(&self, path: &str) -> bool {
        self.search(path)
    }

    /// Some stored key begins with `path`.
    pub fn starts_with(&self, path: &str) -> bool {
        let loc = self.locate(path);
        loc.found || loc.partial
    }

    /// Number of keys carrying data under this handle's prefix.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.walk("", |_, _, node| count += usize::from(node.has_data()));
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pre-order traversal from the node `path` resolves to, in child
    /// insertion order. `f` receives `(full_path, fragment, node)`.
    ///
    /// The tree's read lock is held for the whole walk, so `f` must not call
    /// back into any handle of this tree: a write deadlocks, and a nested
    /// read deadlocks too when a writer is queued. Collect what is needed
    /// and act on it after `walk` returns.
    pub fn walk(&self, path: &str, mut f: impl FnMut(&str, &str, &Node<T>)) {
        let key = self.full_key(path);
        let arena = self.shared.arena.read();
        let loc = arena.resolve(&key, self.delimiter);
        let Some(start) = loc.node.filter(|_| loc.found) else {
            return;
        };
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = &arena[id];
            if !in_scope(&node.path, &key, self.delimiter) {
                continue;
            }
            f(&node.path, &node.fragment, node);
            stack.extend(node.children.iter().rev().copied());
        }
    }
}

impl<T: Clone> Trie<T> {
    /// Resolve `path` and clone out its state.
    ///
    /// Fails with [`Error::NotFound`] when nothing resolves or only a
    /// prefix of stored keys does.
    pub fn query(&self, path: &str) -> Result<Queried<T>> {
        let key = self.full_key(path);
        let arena = self.shared.arena.read();
        let loc = arena.resolve(&key, self.delimiter);
        match loc.node {
            Some(id) if loc.is_hit() => {
                let node = &arena[id];
                // A boundary hit lands on a node whose path runs past the key.
                let data = if names_key(&node.path, &key, self.delimiter) {
                    node.data.clone()
                } else {
                    None
                };
                Ok(Queried {
                    data,
                    branch: loc.branch,
                })
            }
            _ => Err(Error::not_found(key.as_str())),
        }
    }

    /// The data stored at `path`, if any.
    pub fn get(&self, path: &str) -> Option<T> {
        self.query(path).ok()?.data
    }

    /// The data stored at `path`, or `default`.
    pub fn get_or(&self, path: &str, default: T) -> T {
        self.get(path).unwrap_or(default)
    }

    /// Deep copy into an independent tree with the same settings.
    pub fn dup(&self) -> Self {
        let arena = self.shared.arena.read().clone();
        Self {
            shared: Shared::new(arena),
            prefix: self.prefix.clone(),
            delimiter: self.delimiter,
            flatten_slices: self.flatten_slices,
        }
    }
}

impl<T> Default for Trie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Trie<T> {
    fn clone(&self) -> Self {
        self.dup()
    }
}

impl<T> fmt::Debug for Trie<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trie")
            .field("prefix", &self.prefix)
            .field("delimiter", &self.delimiter)
            .field("flatten_slices", &self.flatten_slices)
            .field("nodes", &self.shared.arena.read().live())
            .finish()
    }
}

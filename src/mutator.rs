//! Structural mutation: insert, split, remove and re-compression.
//!
//! Every operation keeps the radix invariants:
//! - a node's `path` ends with its `fragment`;
//! - siblings never share a first character;
//! - a non-root node without data or metadata never has exactly one child.

use tracing::{debug, trace};

use crate::matcher::common_prefix_len;
use crate::node::{Node, NodeArena, NodeId};

/// Outcome of a removal.
pub(crate) struct Detached<T> {
    /// Parent of the removed key, while it survives re-compression with
    /// its path unchanged.
    pub(crate) parent: Option<NodeId>,
    /// Path of the parent as it was before the removal.
    pub(crate) parent_path: String,
    /// The removed nodes, rebuilt as an independent arena, when requested.
    pub(crate) subtree: Option<NodeArena<T>>,
    /// Nodes released from this arena.
    pub(crate) released: usize,
}

impl<T> NodeArena<T> {
    /// Store `data` at `key`, returning the node and the replaced data.
    pub(crate) fn insert(&mut self, key: &str, data: T) -> (NodeId, Option<T>) {
        let mut id = self.root();
        let mut word = key;
        loop {
            let cpl = common_prefix_len(&self[id].fragment, word);
            if cpl < self[id].fragment.len() {
                self.split(id, cpl);
            }

            if cpl < word.len() {
                let rest = &word[cpl..];
                let first = rest.chars().next().expect("non-empty remainder");
                if let Some(child) = self.child_starting_with(id, first) {
                    id = child;
                    word = rest;
                    continue;
                }
                let leaf = self.add_leaf(id, rest, key, data);
                return (leaf, None);
            }

            let node = &mut self[id];
            node.debug_check_suffix();
            return (id, node.data.replace(data));
        }
    }

    fn add_leaf(&mut self, parent: NodeId, fragment: &str, path: &str, data: T) -> NodeId {
        debug_assert!(
            fragment
                .chars()
                .next()
                .is_some_and(|c| self.child_starting_with(parent, c).is_none()),
            "sibling fragments must not share a first character"
        );
        let mut node = Node::new(fragment, path, Some(parent));
        node.data = Some(data);
        let id = self.alloc(node);
        self[parent].children.push(id);
        trace!(path, fragment, "new leaf");
        id
    }

    /// Cut the fragment of `id` at byte `pos`.
    ///
    /// `id` keeps the head and becomes a branch; a new single child takes
    /// the tail along with the old children, data, metadata and flags.
    /// The child's path is the original absolute path.
    pub(crate) fn split(&mut self, id: NodeId, pos: usize) -> NodeId {
        let head = &mut self[id];
        debug_assert!(pos < head.fragment.len() && head.fragment.is_char_boundary(pos));

        let tail_fragment = head.fragment.split_off(pos);
        let tail_path = head.path.clone();
        head.path.truncate(tail_path.len() - tail_fragment.len());
        let tail = Node {
            fragment: tail_fragment,
            path: tail_path,
            children: std::mem::take(&mut head.children),
            parent: Some(id),
            data: head.data.take(),
            meta: head.meta.take(),
            modified: std::mem::take(&mut head.modified),
        };
        head.debug_check_suffix();
        tail.debug_check_suffix();

        debug!(head = %head.path, tail = %tail.path, "split node");
        let tail_id = self.alloc(tail);
        self.reparent_children(tail_id);
        self[id].children.push(tail_id);
        tail_id
    }

    fn reparent_children(&mut self, id: NodeId) {
        for i in 0..self[id].children.len() {
            let child = self[id].children[i];
            self[child].parent = Some(id);
        }
    }

    /// `id` if it is still live and still has `path`.
    fn surviving(&self, id: NodeId, path: &str) -> Option<NodeId> {
        self.get(id).filter(|n| n.path == path).map(|_| id)
    }

    /// Unlink `id` from its parent. Returns the parent.
    fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.get(id)?.parent?;
        self[parent].children.retain(|c| *c != id);
        Some(parent)
    }

    /// Restore compression upwards from `id` after a removal.
    ///
    /// A non-root node left without data, metadata and children is pruned;
    /// one left with a single child absorbs it.
    pub(crate) fn recompress(&mut self, mut id: NodeId) {
        loop {
            if id == self.root() {
                return;
            }
            let Some(node) = self.get(id) else {
                return;
            };
            if node.data.is_some() || node.meta.is_some() {
                return;
            }
            match node.children.len() {
                0 => {
                    let Some(parent) = self.detach(id) else {
                        return;
                    };
                    self.take(id);
                    debug!(parent = %self[parent].path, "pruned empty branch");
                    id = parent;
                }
                1 => {
                    self.absorb_only_child(id);
                    return;
                }
                _ => return,
            }
        }
    }

    fn absorb_only_child(&mut self, id: NodeId) {
        let child_id = self[id].children[0];
        let Some(child) = self.take(child_id) else {
            return;
        };
        let node = &mut self[id];
        node.fragment.push_str(&child.fragment);
        node.path = child.path;
        node.children = child.children;
        node.data = child.data;
        node.meta = child.meta;
        node.modified = child.modified;
        node.debug_check_suffix();
        debug!(path = %node.path, "merged single child");
        self.reparent_children(id);
    }

    /// Remove the key `key`, resolved to node `id`.
    ///
    /// When the node's path extends past `key` or ends with the delimiter,
    /// the whole node goes. Otherwise the node's path is exactly `key` and
    /// only its data and the children continuing with the delimiter belong
    /// to the key; siblings such as `key2...` stay.
    pub(crate) fn remove_at(
        &mut self,
        id: NodeId,
        key: &str,
        delimiter: char,
        extract: bool,
    ) -> Option<Detached<T>> {
        if id == self.root() {
            return None;
        }
        let node = self.get(id)?;
        let whole = node.path.len() > key.len()
            || node.path_ends_with(delimiter)
            || node
                .children
                .iter()
                .all(|&c| self[c].first_char() == Some(delimiter));

        let parent = node.parent?;
        let parent_path = self[parent].path.clone();

        if whole {
            self.detach(id)?;
            let (subtree, released) = if extract {
                let before = self.live();
                let out = self.extract(id);
                (Some(out), before - self.live())
            } else {
                (None, self.free_subtree(id))
            };
            self.recompress(parent);
            debug!(key, released, "removed subtree");
            return Some(Detached {
                parent: self.surviving(parent, &parent_path),
                parent_path,
                subtree,
                released,
            });
        }

        let scoped: Vec<NodeId> = node
            .children
            .iter()
            .copied()
            .filter(|&c| self[c].first_char() == Some(delimiter))
            .collect();
        let node = &mut self[id];
        node.children.retain(|c| !scoped.contains(c));
        let data = node.data.take();
        let meta = node.meta.take();
        let modified = std::mem::take(&mut node.modified);
        let had_data = data.is_some();

        let before = self.live();
        let subtree = if extract {
            let mut out = NodeArena::new();
            let mut top = Node::new(key, key, Some(out.root()));
            top.data = data;
            top.meta = meta;
            top.modified = modified;
            let top = out.alloc(top);
            out[NodeId::ROOT].children.push(top);
            for &child in &scoped {
                self.move_subtree(child, &mut out, top);
            }
            out.recompress(top);
            Some(out)
        } else {
            for &child in &scoped {
                self.free_subtree(child);
            }
            None
        };
        let released = before - self.live();

        self.recompress(id);
        debug!(key, released, had_data, "removed key inside shared node");
        Some(Detached {
            parent: self.surviving(parent, &parent_path),
            parent_path,
            subtree,
            released,
        })
    }
}

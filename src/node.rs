//! Trie nodes and the slot arena that owns them.
//!
//! Nodes never point at each other directly. Each node records its children
//! and its parent as [`NodeId`]s into a [`NodeArena`], so removal is a
//! matter of detaching an id from the parent's child list and returning the
//! subtree's slots to the free list.
//!
//! Node layout:
//! - `fragment`: the run of characters this node owns;
//! - `path`: the full key from the root, always ending with `fragment`;
//! - `data`: optional payload, a node may carry one while also being a branch.

use std::ops::{Index, IndexMut};

use serde_json::Value;
use smallvec::SmallVec;

/// Handle to a node slot. Stale handles (slot freed and reused) are
/// detected through the generation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) const ROOT: NodeId = NodeId {
        index: 0,
        generation: 0,
    };

    #[inline]
    fn slot(self) -> usize {
        self.index as usize
    }
}

/// Descriptive metadata attached to a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    pub description: Option<String>,
    pub comment: Option<String>,
    /// Opaque caller-defined value.
    pub tag: Option<Value>,
}

/// Children lists are short in practice; keep the first few inline.
pub(crate) type Children = SmallVec<[NodeId; 4]>;

/// A node of the radix trie.
#[derive(Debug, Clone)]
pub struct Node<T> {
    pub(crate) fragment: String,
    pub(crate) path: String,
    pub(crate) children: Children,
    pub(crate) parent: Option<NodeId>,
    pub(crate) data: Option<T>,
    pub(crate) meta: Option<Box<Meta>>,
    pub(crate) modified: bool,
}

impl<T> Node<T> {
    pub(crate) fn new(fragment: &str, path: &str, parent: Option<NodeId>) -> Self {
        let node = Self {
            fragment: fragment.to_owned(),
            path: path.to_owned(),
            children: Children::new(),
            parent,
            data: None,
            meta: None,
            modified: false,
        };
        node.debug_check_suffix();
        node
    }

    pub(crate) fn root() -> Self {
        Self::new("", "", None)
    }

    /// Characters owned by this node.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Full key from the root to this node.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// A branch has children; it may still carry data of its own.
    pub fn is_branch(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn meta(&self) -> Option<&Meta> {
        self.meta.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.meta()?.description.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.meta()?.comment.as_deref()
    }

    pub fn tag(&self) -> Option<&Value> {
        self.meta()?.tag.as_ref()
    }

    /// Set when data or metadata changed through a user-driven mutation.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn meta_mut(&mut self) -> &mut Meta {
        self.meta.get_or_insert_with(Box::default)
    }

    #[inline]
    pub(crate) fn first_char(&self) -> Option<char> {
        self.fragment.chars().next()
    }

    #[inline]
    pub(crate) fn path_ends_with(&self, delimiter: char) -> bool {
        self.path.ends_with(delimiter)
    }

    #[inline]
    pub(crate) fn suffix_consistent(&self) -> bool {
        self.path.ends_with(self.fragment.as_str())
    }

    #[inline]
    pub(crate) fn debug_check_suffix(&self) {
        debug_assert!(
            self.suffix_consistent(),
            "path {:?} does not end with fragment {:?}",
            self.path,
            self.fragment
        );
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Slot arena owning every node of one trie.
///
/// Slot 0 is the root and is never freed. Freed slots are recycled through a
/// free list with a bumped generation.
#[derive(Debug, Clone)]
pub(crate) struct NodeArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> NodeArena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::root()),
            }],
            free: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node<T>> {
        let slot = self.slots.get(id.slot())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<T>> {
        let slot = self.slots.get_mut(id.slot())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub(crate) fn alloc(&mut self, node: Node<T>) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.node.is_none());
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).expect("node arena exceeds u32 slots");
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Take a node out of its slot and recycle the slot.
    pub(crate) fn take(&mut self, id: NodeId) -> Option<Node<T>> {
        if id == NodeId::ROOT {
            return None;
        }
        let slot = self.slots.get_mut(id.slot())?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    /// Release `id` and every node below it.
    pub(crate) fn free_subtree(&mut self, id: NodeId) -> usize {
        let mut freed = 0;
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.take(id) {
                stack.extend(node.children.iter().copied());
                freed += 1;
            }
        }
        freed
    }

    /// Number of live nodes, root included.
    pub(crate) fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Move the subtree at `id` into a fresh arena.
    ///
    /// The subtree root becomes the single child of the new root, with its
    /// full path as fragment, so every key keeps its absolute path.
    pub(crate) fn extract(&mut self, id: NodeId) -> NodeArena<T> {
        let mut out = NodeArena::new();
        if let Some(top) = self.move_subtree(id, &mut out, NodeId::ROOT) {
            let top = &mut out[top];
            top.fragment = top.path.clone();
        }
        out
    }

    /// Move the subtree at `id` under `parent` in `out`, keeping child
    /// order. Returns the new id of the subtree root.
    pub(crate) fn move_subtree(
        &mut self,
        id: NodeId,
        out: &mut NodeArena<T>,
        parent: NodeId,
    ) -> Option<NodeId> {
        let mut moved = None;
        let mut pending = vec![(id, parent)];
        while let Some((old, new_parent)) = pending.pop() {
            let Some(mut node) = self.take(old) else {
                continue;
            };
            let children = std::mem::take(&mut node.children);
            node.parent = Some(new_parent);
            let new_id = out.alloc(node);
            out[new_parent].children.push(new_id);
            moved.get_or_insert(new_id);
            pending.extend(children.into_iter().rev().map(|c| (c, new_id)));
        }
        moved
    }

    /// Pre-order iteration of `(id, node)` starting at `start`.
    pub(crate) fn preorder(&self, start: NodeId) -> Preorder<'_, T> {
        Preorder {
            arena: self,
            stack: vec![start],
        }
    }
}

impl<T> Index<NodeId> for NodeArena<T> {
    type Output = Node<T>;

    fn index(&self, id: NodeId) -> &Node<T> {
        self.get(id).expect("stale node id")
    }
}

impl<T> IndexMut<NodeId> for NodeArena<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut Node<T> {
        self.get_mut(id).expect("stale node id")
    }
}

pub(crate) struct Preorder<'a, T> {
    arena: &'a NodeArena<T>,
    stack: Vec<NodeId>,
}

impl<'a, T> Iterator for Preorder<'a, T> {
    type Item = (NodeId, &'a Node<T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let Some(node) = self.arena.get(id) else {
                continue;
            };
            self.stack.extend(node.children.iter().rev().copied());
            return Some((id, node));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(arena: &mut NodeArena<u32>, parent: NodeId, frag: &str, path: &str) -> NodeId {
        let id = arena.alloc(Node::new(frag, path, Some(parent)));
        arena[parent].children.push(id);
        id
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut arena: NodeArena<u32> = NodeArena::new();
        let root = arena.root();
        let a = leaf(&mut arena, root, "a", "a");
        assert_eq!(arena.live(), 2);

        arena[root].children.clear();
        assert_eq!(arena.free_subtree(a), 1);
        assert!(arena.get(a).is_none());

        let b = leaf(&mut arena, root, "b", "b");
        assert_eq!(a.index, b.index, "slot should be recycled");
        assert_ne!(a, b);
        assert!(arena.get(a).is_none(), "stale id must not resolve");
        assert_eq!(arena[b].path(), "b");
    }

    #[test]
    fn test_root_is_never_taken() {
        let mut arena: NodeArena<u32> = NodeArena::new();
        assert!(arena.take(NodeId::ROOT).is_none());
        assert!(arena.get(NodeId::ROOT).is_some());
    }

    #[test]
    fn test_extract_keeps_absolute_paths() {
        let mut arena: NodeArena<u32> = NodeArena::new();
        let root = arena.root();
        let app = leaf(&mut arena, root, "app.", "app.");
        let x = leaf(&mut arena, app, "x", "app.x");
        let y = leaf(&mut arena, app, "y", "app.y");
        arena[x].data = Some(1);
        arena[y].data = Some(2);

        arena[root].children.clear();
        let out = arena.extract(app);
        assert_eq!(arena.live(), 1);

        let paths: Vec<_> = out
            .preorder(out.root())
            .map(|(_, n)| (n.fragment().to_owned(), n.path().to_owned()))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("".into(), "".into()),
                ("app.".into(), "app.".into()),
                ("x".into(), "app.x".into()),
                ("y".into(), "app.y".into()),
            ]
        );
    }

    #[test]
    fn test_meta_accessors() {
        let mut node: Node<u32> = Node::new("file", "app.file", None);
        assert!(node.comment().is_none());
        node.meta_mut().comment = Some("log target".into());
        node.meta_mut().tag = Some(Value::from(7));
        assert_eq!(node.comment(), Some("log target"));
        assert_eq!(node.tag(), Some(&Value::from(7)));
        assert!(node.description().is_none());
    }
}

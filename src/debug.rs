//! Debug utilities for trie troubleshooting.

use std::collections::HashSet;
use std::fmt::{self, Write as _};

use crate::node::NodeArena;
use crate::trie::Trie;

impl<T: fmt::Debug> NodeArena<T> {
    fn render(&self, out: &mut String) -> fmt::Result {
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = &self[id];
            let marker = if node.is_branch() { "<B>" } else { "<L>" };
            write!(out, "{:indent$}{marker} {:?} [{}]", "", node.fragment, node.path, indent = depth * 2)?;
            if let Some(data) = &node.data {
                write!(out, " = {data:?}")?;
            }
            if let Some(desc) = node.description() {
                write!(out, " ({desc})")?;
            }
            if let Some(comment) = node.comment() {
                write!(out, " # {comment}")?;
            }
            if let Some(tag) = node.tag() {
                write!(out, " @{tag}")?;
            }
            if node.modified {
                out.push_str(" *");
            }
            out.push('\n');
            stack.extend(node.children.iter().rev().map(|&c| (c, depth + 1)));
        }
        Ok(())
    }
}

impl<T> NodeArena<T> {
    /// Verify tree integrity - returns list of issues found.
    pub(crate) fn verify_integrity(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut reached = 0usize;
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else {
                issues.push(format!("dangling child id {id:?}"));
                continue;
            };
            reached += 1;

            if !node.suffix_consistent() {
                issues.push(format!(
                    "path {:?} does not end with fragment {:?}",
                    node.path, node.fragment
                ));
            }
            if id != self.root() {
                if node.fragment.is_empty() {
                    issues.push(format!("non-root node {:?} has an empty fragment", node.path));
                }
                // Data-less leaves are legal: expiry clears a leaf in place.
                if node.data.is_none() && node.meta.is_none() && node.children.len() == 1 {
                    issues.push(format!("uncompressed single-child node {:?}", node.path));
                }
            }

            let mut firsts = HashSet::new();
            for &child_id in &node.children {
                let Some(child) = self.get(child_id) else {
                    issues.push(format!("{:?} links a freed child", node.path));
                    continue;
                };
                if child.parent != Some(id) {
                    issues.push(format!("{:?} has a wrong parent link", child.path));
                }
                if child.path.len() != node.path.len() + child.fragment.len()
                    || !child.path.starts_with(node.path.as_str())
                {
                    issues.push(format!(
                        "{:?} is not {:?} + {:?}",
                        child.path, node.path, child.fragment
                    ));
                }
                if let Some(c) = child.first_char() {
                    if !firsts.insert(c) {
                        issues.push(format!("{:?} has two children starting with {c:?}", node.path));
                    }
                }
                stack.push(child_id);
            }
        }
        if reached != self.live() {
            issues.push(format!("{} live nodes but {reached} reachable", self.live()));
        }
        issues
    }
}

impl<T: fmt::Debug> Trie<T> {
    /// Human-readable rendering of the whole tree, one node per line.
    ///
    /// Purely diagnostic; the format is not stable.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.shared.arena.read().render(&mut out);
        out
    }

    /// Print the tree structure for debugging.
    pub fn debug_print(&self) {
        println!("=== Trie Debug ===");
        println!("{self:?}");
        print!("{}", self.dump());
        println!("==================");
    }
}

impl<T> Trie<T> {
    /// Check every structural invariant; returns the issues found.
    pub fn verify_integrity(&self) -> Vec<String> {
        self.shared.arena.read().verify_integrity()
    }
}

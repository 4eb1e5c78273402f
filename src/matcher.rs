//! Delimiter-aware path resolution.
//!
//! Node boundaries are plain character runs; the delimiter is only consulted
//! here, at query time. A query can therefore end in the middle of a fragment
//! and still name a complete key, as long as the next stored character is the
//! live delimiter (`"app.logging"` against a fragment `"logging.file"`).
//!
//! Raw outcomes of a descent:
//! - `Full`: the query ends exactly on a node boundary;
//! - `Boundary`: the query ends inside a fragment, on a delimiter boundary;
//! - `Partial`: the query ends inside a fragment elsewhere (a key prefix);
//! - `None`: the query leaves the tree.

use tracing::trace;

use crate::node::{NodeArena, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchKind {
    None,
    Partial,
    Full,
    Boundary,
}

/// Result of [`NodeArena::resolve`]: the node a path lands on and how.
///
/// `found` and `partial` are mutually exclusive. `node` is set for every
/// outcome except a plain miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub node: Option<NodeId>,
    /// The resolved node has children, or the query named a branch that
    /// lives inside a longer fragment.
    pub branch: bool,
    /// The query is a prefix of stored keys but not a complete key.
    pub partial: bool,
    pub found: bool,
}

impl Location {
    const MISS: Location = Location {
        node: None,
        branch: false,
        partial: false,
        found: false,
    };

    fn found(node: NodeId, branch: bool) -> Self {
        Self {
            node: Some(node),
            branch,
            partial: false,
            found: true,
        }
    }

    fn partial(node: NodeId, branch: bool) -> Self {
        Self {
            node: Some(node),
            branch,
            partial: true,
            found: false,
        }
    }

    /// Found and not partial.
    pub fn is_hit(&self) -> bool {
        self.found && !self.partial
    }
}

/// Byte length of the common prefix of `a` and `b`, on a char boundary.
pub(crate) fn common_prefix_len(a: &str, b: &str) -> usize {
    let mut n = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while !a.is_char_boundary(n) {
        n -= 1;
    }
    n
}

impl<T> NodeArena<T> {
    /// Child of `id` whose fragment starts with `c`.
    pub(crate) fn child_starting_with(&self, id: NodeId, c: char) -> Option<NodeId> {
        self[id]
            .children
            .iter()
            .copied()
            .find(|&child| self[child].first_char() == Some(c))
    }

    /// Walk from `start` consuming `word`.
    pub(crate) fn descend(&self, start: NodeId, word: &str, delimiter: char) -> (MatchKind, NodeId) {
        let mut id = start;
        let mut word = word;
        loop {
            if word.is_empty() {
                return (MatchKind::Full, id);
            }
            let fragment = self[id].fragment.as_str();
            let cpl = common_prefix_len(fragment, word);

            if cpl < fragment.len() {
                if cpl < word.len() {
                    return (MatchKind::None, id);
                }
                // Query exhausted inside this fragment.
                let rest = &fragment[cpl..];
                let mut delims = [0u8; 4];
                let delim = &*delimiter.encode_utf8(&mut delims);
                if rest == delim {
                    return (MatchKind::Full, id);
                }
                if rest.starts_with(delimiter) || fragment[..cpl].ends_with(delimiter) {
                    return (MatchKind::Boundary, id);
                }
                return (MatchKind::Partial, id);
            }

            word = &word[cpl..];
            let Some(first) = word.chars().next() else {
                return (MatchKind::Full, id);
            };
            match self.child_starting_with(id, first) {
                Some(child) => id = child,
                None => return (MatchKind::None, id),
            }
        }
    }

    /// True if the path of `id` is a complete key under `delimiter`.
    ///
    /// Data-carrying nodes, the root, and leaves always are. A data-less
    /// branch only is when its path ends with the delimiter or one of its
    /// children continues with it.
    pub(crate) fn at_key_boundary(&self, id: NodeId, delimiter: char) -> bool {
        let node = &self[id];
        if id == self.root() || node.has_data() || node.is_leaf() || node.path_ends_with(delimiter) {
            return true;
        }
        node.children
            .iter()
            .any(|&c| self[c].first_char() == Some(delimiter))
    }

    /// Resolve `key` from the root and validate branch hits.
    pub(crate) fn resolve(&self, key: &str, delimiter: char) -> Location {
        let (kind, id) = self.descend(self.root(), key, delimiter);
        let loc = match kind {
            MatchKind::None => Location::MISS,
            MatchKind::Partial => Location::partial(id, self[id].is_branch()),
            MatchKind::Boundary => Location::found(id, true),
            MatchKind::Full => {
                let branch = self[id].is_branch();
                if self.at_key_boundary(id, delimiter) {
                    Location::found(id, branch)
                } else {
                    Location::partial(id, branch)
                }
            }
        };
        trace!(key, ?kind, found = loc.found, partial = loc.partial, "resolved");
        loc
    }
}

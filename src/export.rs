//! Rebuilding nested maps from a subtree.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::trie::{in_scope, Trie};

impl<T: Clone + Into<Value>> Trie<T> {
    /// Export the subtree at `path` as a nested map.
    ///
    /// Each stored key below `path` is split on the current delimiter, so
    /// the shape follows the live delimiter rather than the node layout.
    /// The value stored at `path` itself has no slot in the map and is left
    /// out. When a key carries data and also has children, the children
    /// win.
    pub fn get_map(&self, path: &str) -> Result<Map<String, Value>> {
        let key = self.full_key(path);
        let arena = self.shared.arena.read();
        let loc = arena.resolve(&key, self.delimiter);
        let start = loc
            .node
            .filter(|_| loc.is_hit())
            .ok_or_else(|| Error::not_found(key.as_str()))?;

        let mut out = Map::new();
        for (_, node) in arena.preorder(start) {
            let Some(data) = &node.data else {
                continue;
            };
            if !in_scope(&node.path, &key, self.delimiter) {
                continue;
            }
            let Some(rel) = node.path.strip_prefix(key.as_str()) else {
                continue;
            };
            let segments: Vec<&str> = rel
                .split(self.delimiter)
                .filter(|s| !s.is_empty())
                .collect();
            place(&mut out, &segments, data.clone().into());
        }
        Ok(out)
    }

    /// Export everything under this handle's prefix.
    pub fn to_map(&self) -> Result<Map<String, Value>> {
        self.get_map("")
    }
}

fn place(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = map;
    for segment in parents {
        let slot = current
            .entry(*segment)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    if !matches!(current.get(*last), Some(Value::Object(_))) {
        current.insert((*last).to_owned(), value);
    }
}

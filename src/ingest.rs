//! Merging nested maps into the trie.
//!
//! Objects recurse one level per key. Arrays either expand into indexed
//! children (`key.0`, `key.1`, ...) or are stored whole, depending on the
//! handle's `flatten_slices` setting. Everything else is converted into the
//! payload type and inserted at the accumulated position.

use std::fmt;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, IngestErrors, Result};
use crate::pool::{push_segment, BufferPool};
use crate::trie::Trie;

impl<T> Trie<T>
where
    T: TryFrom<Value>,
    T::Error: fmt::Display,
{
    /// Merge `map` into the tree below `path_at`.
    ///
    /// Entries that fail to convert are skipped and reported together as
    /// [`Error::Ingestion`]; every other entry is still inserted.
    pub fn merge(&self, path_at: &str, map: &Map<String, Value>) -> Result<()> {
        let scoped = self.with_prefix(path_at);
        let mut position = BufferPool::global().acquire(64);
        let mut errors = IngestErrors::default();
        scoped.load_map(map, &mut position, &mut errors);
        debug!(path = %scoped.prefix, keys = map.len(), failed = errors.len(), "merged map");
        errors.into_result()
    }

    /// Merge a single value at `path`. Objects and arrays are expanded the
    /// same way [`merge`](Self::merge) expands nested entries.
    pub fn merge_value(&self, path: &str, value: &Value) -> Result<()> {
        let mut position = BufferPool::global().acquire(path.len() + 16);
        push_segment(&mut position, path, self.delimiter);
        let mut errors = IngestErrors::default();
        self.load_value(value, &mut position, &mut errors);
        errors.into_result()
    }

    fn load_map(&self, map: &Map<String, Value>, position: &mut String, errors: &mut IngestErrors) {
        for (key, value) in map {
            let mark = position.len();
            push_segment(position, key, self.delimiter);
            self.load_value(value, position, errors);
            position.truncate(mark);
        }
    }

    fn load_value(&self, value: &Value, position: &mut String, errors: &mut IngestErrors) {
        match value {
            Value::Object(map) => self.load_map(map, position, errors),
            Value::Array(items) if self.flatten_slices => {
                for (i, item) in items.iter().enumerate() {
                    let mark = position.len();
                    push_segment(position, &i.to_string(), self.delimiter);
                    match item {
                        Value::Object(map) => self.load_map(map, position, errors),
                        other => self.load_leaf(other, position, errors),
                    }
                    position.truncate(mark);
                }
            }
            other => self.load_leaf(other, position, errors),
        }
    }

    fn load_leaf(&self, value: &Value, position: &str, errors: &mut IngestErrors) {
        match T::try_from(value.clone()) {
            Ok(data) => {
                self.insert(position, data);
            }
            Err(err) => {
                let path = self.full_key(position).as_str().to_owned();
                warn!(%path, %err, "skipping value that does not convert");
                errors.push(Error::Convert {
                    path,
                    message: err.to_string(),
                });
            }
        }
    }
}

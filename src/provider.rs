//! Boundary traits for feeding a trie from outside sources.
//!
//! A [`Provider`] hands over configuration in one of three shapes: an
//! already decoded map, raw bytes for a [`Codec`], or a stream of flat
//! keys. Providers implement only the groups they support; the rest answer
//! [`Error::NotImplemented`] and [`Trie::load`] falls through to the next
//! shape.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, IngestErrors, Result};
use crate::trie::Trie;

/// Encodes and decodes nested maps.
pub trait Codec: Send + Sync {
    fn marshal(&self, map: &Map<String, Value>) -> Result<Vec<u8>>;

    fn unmarshal(&self, bytes: &[u8]) -> Result<Map<String, Value>>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    /// Indent the marshalled output.
    pub pretty: bool,
}

impl Codec for JsonCodec {
    fn marshal(&self, map: &Map<String, Value>) -> Result<Vec<u8>> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(map)?
        } else {
            serde_json::to_vec(map)?
        };
        Ok(bytes)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Map<String, Value>> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A source (and optionally a sink) of configuration.
///
/// Every method defaults to [`Error::NotImplemented`].
pub trait Provider {
    /// The whole configuration as a decoded map.
    fn read(&self) -> Result<Map<String, Value>> {
        Err(Error::NotImplemented)
    }

    /// The whole configuration as raw bytes, decoded by a [`Codec`].
    fn read_bytes(&self) -> Result<Vec<u8>> {
        Err(Error::NotImplemented)
    }

    fn write(&self, _map: &Map<String, Value>) -> Result<()> {
        Err(Error::NotImplemented)
    }

    fn write_bytes(&self, _bytes: &[u8]) -> Result<()> {
        Err(Error::NotImplemented)
    }

    /// Flat keys available through [`value`](Self::value).
    fn keys(&self) -> Result<Vec<String>> {
        Err(Error::NotImplemented)
    }

    fn value(&self, _key: &str) -> Result<Value> {
        Err(Error::NotImplemented)
    }
}

/// In-memory provider holding a decoded map.
#[derive(Debug, Default)]
pub struct MapProvider {
    map: RwLock<Map<String, Value>>,
}

impl MapProvider {
    pub fn new(map: Map<String, Value>) -> Self {
        Self {
            map: RwLock::new(map),
        }
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.map.read().clone()
    }
}

impl Provider for MapProvider {
    fn read(&self) -> Result<Map<String, Value>> {
        Ok(self.snapshot())
    }

    fn write(&self, map: &Map<String, Value>) -> Result<()> {
        *self.map.write() = map.clone();
        Ok(())
    }
}

/// In-memory provider holding encoded bytes.
#[derive(Debug, Default)]
pub struct BytesProvider {
    bytes: Mutex<Vec<u8>>,
}

impl BytesProvider {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Mutex::new(bytes.into()),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl Provider for BytesProvider {
    fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.contents())
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        *self.bytes.lock() = bytes.to_vec();
        Ok(())
    }
}

/// Provider exposing flat `path -> value` pairs, in order.
#[derive(Debug, Default)]
pub struct KeyValueProvider {
    entries: Vec<(String, Value)>,
}

impl KeyValueProvider {
    pub fn new<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Provider for KeyValueProvider {
    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|(k, _)| k.clone()).collect())
    }

    fn value(&self, key: &str) -> Result<Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::not_found(key))
    }
}

/// Kind of change carried by an [`Event`]; a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Op(u8);

impl Op {
    pub const NONE: Op = Op(0);
    pub const CREATE: Op = Op(1 << 0);
    pub const WRITE: Op = Op(1 << 1);
    pub const REMOVE: Op = Op(1 << 2);
    pub const RENAME: Op = Op(1 << 3);
    pub const CHMOD: Op = Op(1 << 4);

    const NAMES: [(Op, &'static str); 5] = [
        (Op::CREATE, "CREATE"),
        (Op::WRITE, "WRITE"),
        (Op::REMOVE, "REMOVE"),
        (Op::RENAME, "RENAME"),
        (Op::CHMOD, "CHMOD"),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Every bit of `other` is set in `self`.
    pub fn contains(self, other: Op) -> bool {
        !other.is_empty() && self.0 & other.0 == other.0
    }

    /// At least one bit of `other` is set in `self`.
    pub fn intersects(self, other: Op) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Op {
    type Output = Op;

    fn bitor(self, rhs: Op) -> Op {
        Op(self.0 | rhs.0)
    }
}

impl BitOrAssign for Op {
    fn bitor_assign(&mut self, rhs: Op) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (op, name) in Op::NAMES {
            if self.contains(op) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A change reported by a watching provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub op: Op,
    /// Affected keys, relative to the receiving handle, with their new
    /// values. Values are ignored for removals.
    pub entries: Vec<(String, Value)>,
}

impl Event {
    pub fn new(op: Op, entries: Vec<(String, Value)>) -> Self {
        Self { op, entries }
    }
}

impl<T> Trie<T>
where
    T: TryFrom<Value>,
    T::Error: fmt::Display,
{
    /// Populate the tree from `provider`.
    ///
    /// Tries a decoded map first, then bytes through `codec`, then the
    /// key stream. Fails with [`Error::NotImplemented`] when the provider
    /// offers none of them.
    pub fn load(&self, provider: &dyn Provider, codec: Option<&dyn Codec>) -> Result<()> {
        match provider.read() {
            Ok(map) => return self.merge("", &map),
            Err(Error::NotImplemented) => {}
            Err(err) => return Err(err),
        }
        if let Some(codec) = codec {
            match provider.read_bytes() {
                Ok(bytes) => return self.merge("", &codec.unmarshal(&bytes)?),
                Err(Error::NotImplemented) => {}
                Err(err) => return Err(err),
            }
        }

        let keys = provider.keys()?;
        debug!(keys = keys.len(), "loading from key stream");
        let mut errors = IngestErrors::default();
        for key in keys {
            let loaded = provider
                .value(&key)
                .and_then(|value| self.merge_value(&key, &value));
            if let Err(err) = loaded {
                errors.push(err);
            }
        }
        errors.into_result()
    }

    /// Apply a provider change event.
    ///
    /// Creates and writes set each key; removes and renames drop it (a
    /// rename reports the new key in a separate create). Other ops are
    /// ignored.
    pub fn apply_event(&self, event: &Event) -> Result<()> {
        if event.op.intersects(Op::REMOVE | Op::RENAME) {
            for (key, _) in &event.entries {
                self.remove(key);
            }
            debug!(op = %event.op, keys = event.entries.len(), "applied removal");
            return Ok(());
        }
        if !event.op.intersects(Op::CREATE | Op::WRITE) {
            debug!(op = %event.op, "ignored event");
            return Ok(());
        }

        let mut errors = IngestErrors::default();
        for (key, value) in &event.entries {
            match T::try_from(value.clone()) {
                Ok(data) => {
                    self.set(key, data);
                }
                Err(err) => errors.push(Error::Convert {
                    path: self.full_key(key).as_str().to_owned(),
                    message: err.to_string(),
                }),
            }
        }
        debug!(op = %event.op, keys = event.entries.len(), failed = errors.len(), "applied update");
        errors.into_result()
    }
}

impl<T: Clone + Into<Value>> Trie<T> {
    /// Export the tree to `provider`, as a map or as bytes through `codec`.
    pub fn save(&self, provider: &dyn Provider, codec: Option<&dyn Codec>) -> Result<()> {
        let map = self.to_map()?;
        match provider.write(&map) {
            Err(Error::NotImplemented) => match codec {
                Some(codec) => provider.write_bytes(&codec.marshal(&map)?),
                None => Err(Error::NotImplemented),
            },
            other => other,
        }
    }
}

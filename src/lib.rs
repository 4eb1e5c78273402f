//! # radix-store
//!
//! A hierarchical in-memory key-value store addressed by delimited paths
//! (`"app.logging.file"`), backed by a compressed prefix trie.
//!
//! The delimiter is not baked into the node layout: `"app.logging"` is a
//! complete key of a tree holding `"app.logging.file"` even though no node
//! boundary falls after `logging`. Changing the delimiter therefore
//! reinterprets every stored key without touching a node.
//!
//! ## Example
//!
//! ```rust
//! use radix_store::Trie;
//! use serde_json::{json, Value};
//!
//! let root: Trie<Value> = Trie::new();
//! root.insert("app.debug", json!(false));
//! root.insert("app.logging.file", json!("/tmp/1.log"));
//!
//! // Handles created with a prefix share the same tree.
//! let logging = root.with_prefix("app.logging");
//! logging.insert("rotate", json!(6));
//!
//! assert_eq!(root.get("app.logging.rotate"), Some(json!(6)));
//! assert!(root.query("app.logging").unwrap().branch);
//! assert!(!root.search("app.l"));
//! assert!(root.starts_with("app.l"));
//! ```

#![deny(unsafe_code)]

mod config;
mod debug;
mod error;
mod export;
mod ingest;
mod matcher;
mod mutator;
mod node;
mod pool;
mod provider;
mod trie;
mod ttl;

pub use config::{TrieConfig, DEFAULT_DELIMITER};
pub use error::{Error, IngestErrors, Result};
pub use matcher::Location;
pub use node::{Meta, Node, NodeId};
pub use pool::{BufferPool, PooledBuf};
pub use provider::{BytesProvider, Codec, Event, JsonCodec, KeyValueProvider, MapProvider, Op, Provider};
pub use trie::{Queried, Removed, Trie};
pub use ttl::{Expired, TtlCallback};

pub use serde_json::{Map, Value};

#[cfg(test)]
mod proptests;

//! Error types shared by the trie, the ingestor and the provider boundary.

use std::fmt;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by [`Trie`](crate::Trie) operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path resolved to no node, or only to a partial match.
    #[error("path `{path}` not found")]
    NotFound {
        /// The fully prefixed path that was looked up.
        path: String,
    },

    /// One or more entries failed while merging a nested map.
    #[error(transparent)]
    Ingestion(#[from] IngestErrors),

    /// A decoded value could not be converted into the payload type.
    #[error("cannot convert value at `{path}`: {message}")]
    Convert {
        /// Path the value was destined for.
        path: String,
        /// Conversion failure rendered by the payload type.
        message: String,
    },

    /// A codec failed to encode or decode a nested map.
    #[error("codec failure: {0}")]
    Codec(#[from] serde_json::Error),

    /// The provider does not support this capability group.
    #[error("operation not implemented by this provider")]
    NotImplemented,

    /// The TTL scheduler was closed.
    #[error("ttl scheduler is closed")]
    Closed,
}

impl Error {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// True for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Aggregate of the failures collected while ingesting a nested map.
///
/// Ingestion never stops at the first bad entry; every sibling branch is
/// still visited and each failure lands here.
#[derive(Debug, Default)]
pub struct IngestErrors {
    errors: Vec<Error>,
}

impl IngestErrors {
    pub(crate) fn push(&mut self, err: Error) {
        match err {
            // Flatten nested aggregates so callers see one level.
            Error::Ingestion(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
    }

    pub(crate) fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Ingestion(self))
        }
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.errors.iter()
    }
}

impl fmt::Display for IngestErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} entries failed to ingest", self.errors.len())?;
        for err in &self.errors {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for IngestErrors {}

impl<'a> IntoIterator for &'a IngestErrors {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

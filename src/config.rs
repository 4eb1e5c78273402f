//! Construction-time settings for a [`Trie`](crate::Trie).

/// Default path delimiter.
pub const DEFAULT_DELIMITER: char = '.';

/// Configuration for a trie handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieConfig {
    /// Character splitting a flat path into levels.
    pub delimiter: char,
    /// Logical prefix prepended to every path passed to the handle.
    pub prefix: String,
    /// Expand arrays into indexed child paths (`key.0`, `key.1`, ...)
    /// while merging nested maps.
    pub flatten_slices: bool,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            prefix: String::new(),
            flatten_slices: true,
        }
    }
}

impl TrieConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn flatten_slices(mut self, flatten: bool) -> Self {
        self.flatten_slices = flatten;
        self
    }
}

//! The `Context` type and id-based helpers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// Metadata attached to a context: string keys to scalar JSON values.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Separator placed between context texts when they are joined into one blob.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// A unit of retrievable text.
///
/// The `id` is the only identity a context has: two values with the same id
/// are the same unit even when their text differs, which happens when the
/// same chunk is stored raw in one tier and summarized in another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Stable identifier, unique within a document version.
    pub id: String,
    /// The text.
    pub text: String,
    /// Scalar metadata such as `section`, `source` and `type`.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Context {
    /// Creates a new context.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }

    /// Creates a context whose id is derived from its source, position and text.
    #[must_use]
    pub fn derived(source: &str, position: usize, text: impl Into<String>, metadata: Metadata) -> Self {
        let text = text.into();
        let id = Self::derive_id(source, position, &text);
        Self { id, text, metadata }
    }

    /// Derives a stable id from the source, the chunk position and the text.
    #[must_use]
    pub fn derive_id(source: &str, position: usize, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(position.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..16])
    }

    /// Returns a new context with the same id and metadata but different text.
    #[must_use]
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            text: text.into(),
            metadata: self.metadata.clone(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a string metadata value.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Removes later occurrences of an id, keeping the first object at its
/// first-seen position.
#[must_use]
pub fn dedup_by_id(contexts: Vec<Context>) -> Vec<Context> {
    let mut seen = HashSet::with_capacity(contexts.len());
    contexts
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect()
}

/// Joins context texts with a blank line.
#[must_use]
pub fn join_texts(contexts: &[Context]) -> String {
    contexts
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

//! Canonical hash of a tag set
//!
//! Issues are identified by the hash of their primary question, answer
//! type and optional tags. The hash is over the *set* of tags: insertion
//! order and duplicates do not affect the result.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Accumulator for a deterministic tag-set hash
#[derive(Debug, Clone, Default)]
pub struct TagHash {
    tags: BTreeSet<String>,
}

impl TagHash {
    /// Start a tag set from an initial tag
    pub fn new(initial_tag: impl Into<String>) -> Self {
        let mut tag_hash = Self::default();
        tag_hash.add_tag(initial_tag);
        tag_hash
    }

    /// Add a tag; duplicates are absorbed
    pub fn add_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.insert(tag.into());
        self
    }

    /// The hex digest of the tag set
    ///
    /// Tags are hashed in sorted order with a separator byte, so no
    /// concatenation of distinct tags can collide with another set.
    pub fn get(&self) -> String {
        let mut hasher = Sha256::new();
        for tag in &self.tags {
            hasher.update(tag.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }
}

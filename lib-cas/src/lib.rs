//! Hivemind Content-Addressed Store
//!
//! Immutable records serialized as canonical UTF-8 JSON (sorted keys) and
//! addressed by the multihash of their bytes. Publishing is idempotent:
//! identical content always maps to the identical multihash, so the store
//! doubles as the hash-linked history of every record that references
//! another record by hash.

pub mod codec;
pub mod multihash;
pub mod store;

// Re-export commonly used types
pub use codec::{from_canonical_json, to_canonical_json};
pub use multihash::Multihash;
pub use store::{get_record, put_record, Cas, MemoryCas};

/// Result type alias for store operations
pub type CasResult<T> = Result<T, CasError>;

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    #[error("record not found: {0}")]
    NotFound(Multihash),

    #[error("corrupt record {0}: {1}")]
    Corrupt(Multihash, String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(String),
}

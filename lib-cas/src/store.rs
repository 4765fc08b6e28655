//! Store interface and in-memory reference implementation

use crate::codec::{from_canonical_json, to_canonical_json};
use crate::{CasError, CasResult, Multihash};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Content-addressed store of immutable byte records
///
/// `put` is idempotent: storing the same bytes twice returns the same
/// multihash and keeps a single copy. Implementations backed by remote
/// storage may fail with transient `Io` errors; the engine surfaces
/// those to the caller without retrying.
pub trait Cas {
    /// Store a byte record and return its multihash
    fn put(&mut self, bytes: &[u8]) -> CasResult<Multihash>;

    /// Fetch the byte record stored under a multihash
    fn get(&self, hash: &Multihash) -> CasResult<Vec<u8>>;
}

/// Serialize a record to canonical JSON and store it
pub fn put_record<T: Serialize>(cas: &mut dyn Cas, record: &T) -> CasResult<Multihash> {
    let bytes = to_canonical_json(record)?;
    cas.put(&bytes)
}

/// Fetch and deserialize the record stored under a multihash
pub fn get_record<T: DeserializeOwned>(cas: &dyn Cas, hash: &Multihash) -> CasResult<T> {
    let bytes = cas.get(hash)?;
    from_canonical_json(hash, &bytes)
}

/// In-memory store, used in tests and single-process embeddings
#[derive(Debug, Default)]
pub struct MemoryCas {
    records: HashMap<Multihash, Vec<u8>>,
}

impl MemoryCas {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Cas for MemoryCas {
    fn put(&mut self, bytes: &[u8]) -> CasResult<Multihash> {
        let hash = Multihash::for_bytes(bytes);
        if self.records.insert(hash.clone(), bytes.to_vec()).is_none() {
            debug!("stored record {} ({} bytes)", hash, bytes.len());
        }
        Ok(hash)
    }

    fn get(&self, hash: &Multihash) -> CasResult<Vec<u8>> {
        self.records
            .get(hash)
            .cloned()
            .ok_or_else(|| CasError::NotFound(hash.clone()))
    }
}

//! Canonical JSON codec
//!
//! Records are persisted as UTF-8 JSON with object keys sorted at every
//! nesting level, so equal records always serialize to equal bytes and
//! therefore equal multihashes. Sorting is achieved by routing values
//! through `serde_json::Value`, whose object map keeps keys ordered.
//! Derived or cached struct fields are excluded from the persisted form
//! with `#[serde(skip)]`.

use crate::{CasError, CasResult, Multihash};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a record to canonical JSON bytes
pub fn to_canonical_json<T: Serialize>(record: &T) -> CasResult<Vec<u8>> {
    let value = serde_json::to_value(record)?;
    Ok(serde_json::to_string(&value)?.into_bytes())
}

/// Deserialize a record fetched under the given multihash
///
/// Decode failures are reported as `Corrupt` so callers can distinguish
/// a damaged record from a missing one.
pub fn from_canonical_json<T: DeserializeOwned>(hash: &Multihash, bytes: &[u8]) -> CasResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CasError::Corrupt(hash.clone(), e.to_string()))
}

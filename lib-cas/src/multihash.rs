//! Multihash identifier for stored records
//!
//! The store's native addressing scheme: SHA-256 of the record bytes,
//! prefixed with the multihash function/length header and rendered as
//! Base58 text. Callers treat the value as opaque.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Multihash function code for SHA-256
const MULTIHASH_SHA256: u8 = 0x12;
/// Digest length of SHA-256 in bytes
const SHA256_LEN: u8 = 0x20;

/// Content-derived identifier of a stored record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multihash(String);

impl Multihash {
    /// Derive the multihash of a byte string
    pub fn for_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut prefixed = Vec::with_capacity(2 + digest.len());
        prefixed.push(MULTIHASH_SHA256);
        prefixed.push(SHA256_LEN);
        prefixed.extend_from_slice(&digest);
        Multihash(bs58::encode(prefixed).into_string())
    }

    /// Wrap an externally produced multihash string without re-deriving it
    pub fn from_string(hash: impl Into<String>) -> Self {
        Multihash(hash.into())
    }

    /// The Base58 text form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the text decodes to a well-formed SHA-256 multihash
    pub fn is_well_formed(&self) -> bool {
        match bs58::decode(&self.0).into_vec() {
            Ok(bytes) => {
                bytes.len() == 2 + SHA256_LEN as usize
                    && bytes[0] == MULTIHASH_SHA256
                    && bytes[1] == SHA256_LEN
            }
            Err(_) => false,
        }
    }
}

impl fmt::Display for Multihash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Multihash {
    fn from(hash: &str) -> Self {
        Multihash(hash.to_string())
    }
}

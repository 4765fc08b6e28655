//! Message signature verification
//!
//! The engine binds sensitive actions to an address with a signature over
//! a canonical text message. Signing keys and the production cryptosystem
//! are managed outside the core; embedders supply a `SignatureVerifier`.
//! A deterministic development-mode scheme is provided so tests and local
//! setups can mint signatures without a wallet.

use crate::Address;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// Opaque textual signature over `(address, message)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Wrap a signature string
    pub fn from_string(signature: impl Into<String>) -> Self {
        Signature(signature.into())
    }

    /// The textual form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verifier of message signatures
pub trait SignatureVerifier {
    /// Check that `signature` binds `address` to `message`
    fn verify(&self, address: &Address, message: &str, signature: &Signature) -> bool;
}

/// Development-mode signature scheme
///
/// The valid signature for `(address, message)` is the hex SHA-256 of
/// `"<address>|<message>"`. Deterministic and unkeyed: anyone can forge
/// it, so it is only suitable for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct DevModeVerifier;

impl DevModeVerifier {
    /// Create the development-mode verifier
    pub fn new() -> Self {
        Self
    }

    /// Produce the signature that `verify` will accept
    pub fn sign(address: &Address, message: &str) -> Signature {
        let digest = Sha256::digest(format!("{}|{}", address, message).as_bytes());
        Signature(hex::encode(digest))
    }
}

impl SignatureVerifier for DevModeVerifier {
    fn verify(&self, address: &Address, message: &str, signature: &Signature) -> bool {
        let valid = *signature == Self::sign(address, message);
        if !valid {
            debug!("rejected signature by {} over {:?}", address, message);
        }
        valid
    }
}

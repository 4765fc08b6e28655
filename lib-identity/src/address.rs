//! Participant addresses
//!
//! Two textual formats are accepted: legacy Base58Check (25-byte payload
//! with a double-SHA-256 checksum) and Bech32 (separator, checksummed
//! data part, witness version + program). Both are normalized as strings
//! and compared byte-exact.

use crate::{IdentityError, IdentityResult};
use bech32::FromBase32;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Human-readable parts accepted for Bech32 addresses
const KNOWN_HRPS: [&str; 3] = ["bc", "tb", "bcrt"];

/// Participant address in legacy Base58Check or Bech32 form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Validate and wrap an address string
    pub fn from_string(address: impl Into<String>) -> IdentityResult<Self> {
        let address = address.into();
        if is_valid_address(&address) || is_valid_bech32_address(&address) {
            Ok(Address(address))
        } else {
            Err(IdentityError::InvalidAddress(address))
        }
    }

    /// The normalized string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check whether a string is a well-formed legacy Base58Check address
pub fn is_valid_address(address: &str) -> bool {
    let payload = match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    if payload.len() != 25 {
        return false;
    }

    let checksum = Sha256::digest(Sha256::digest(&payload[..21]));
    payload[21..] == checksum[..4]
}

/// Check whether a string is a well-formed Bech32 address
pub fn is_valid_bech32_address(address: &str) -> bool {
    let (hrp, data, _variant) = match bech32::decode(address) {
        Ok(decoded) => decoded,
        Err(_) => return false,
    };
    if !KNOWN_HRPS.contains(&hrp.as_str()) || data.is_empty() {
        return false;
    }

    let version = data[0].to_u8();
    let program = match Vec::<u8>::from_base32(&data[1..]) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    match version {
        // Version 0 programs are the 20-byte key hash or 32-byte script hash
        0 => program.len() == 20 || program.len() == 32,
        1..=16 => (2..=40).contains(&program.len()),
        _ => false,
    }
}

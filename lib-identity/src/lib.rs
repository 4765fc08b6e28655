//! Hivemind Participant Identity
//!
//! Participants are identified by a public-key-hash address in either
//! legacy Base58Check or Bech32 form. Sensitive actions are bound to an
//! address by a signature over a canonical text message; the concrete
//! cryptosystem lives outside the core behind the `SignatureVerifier`
//! trait.

pub mod address;
pub mod verification;

// Re-export commonly used types
pub use address::{is_valid_address, is_valid_bech32_address, Address};
pub use verification::{DevModeVerifier, Signature, SignatureVerifier};

/// Result type alias for identity operations
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Identity error types
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

//! Hivemind Decision Engine
//!
//! A group of identified participants propose options for one or more
//! questions, rank them, and the engine computes a consensus ranking by
//! stake-weighted pairwise comparison. Every immutable artifact — the
//! issue, each option, each opinion — lives in a content-addressed store
//! and is referenced by multihash; the evolving state is snapshotted into
//! the same store, forming a hash-linked chain of historical states.

pub mod engine;
pub mod issue;
pub mod opinion;
pub mod option;
pub mod oracle;
pub mod ranking;
pub mod state;
pub mod tag_hash;

// Re-export commonly used types
pub use engine::{Consensus, HivemindEngine};
pub use issue::{
    AnswerType, ConsensusType, Constraints, HivemindIssue, OnSelection, Restrictions, SpecType,
};
pub use opinion::{AutoComplete, HivemindOpinion};
pub use option::{HivemindOption, OptionValue, Scalar};
pub use oracle::{AddressListOracle, LalEntry, NullOracle, SilEntry, StaticListOracle};
pub use state::{HivemindState, OpinionEntry, ResultEntry, Selection, Support};
pub use tag_hash::TagHash;

use lib_cas::CasError;
use lib_identity::IdentityError;

/// Result type alias for engine operations
pub type HivemindResult<T> = Result<T, HivemindError>;

/// Engine error types
#[derive(Debug, thiserror::Error)]
pub enum HivemindError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("state is final")]
    StateFinal,

    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("unsupported operation: {0}")]
    Unimplemented(String),

    #[error("storage error: {0}")]
    Cas(#[from] CasError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("system time error: {0}")]
    Time(#[from] std::time::SystemTimeError),
}

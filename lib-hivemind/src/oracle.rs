//! Address list oracles
//!
//! Issues with an address answer type may gate permitted values on an
//! externally maintained list: the simplified input list (SIL) of an
//! address, or the linked address list (LAL) derived from an address and
//! an extended public key. The engine only needs membership; list
//! maintenance is an external concern.

use crate::{HivemindError, HivemindResult};
use lib_identity::Address;
use std::collections::BTreeMap;

/// One entry of a simplified input list
#[derive(Debug, Clone, PartialEq)]
pub struct SilEntry {
    /// The input address; gates SIL-constrained option values
    pub address: Address,
    /// Relative share of the input
    pub amount: u64,
}

/// One entry of a linked address list
#[derive(Debug, Clone, PartialEq)]
pub struct LalEntry {
    /// The input address the link was derived from
    pub address: Address,
    /// The linked address; gates LAL-constrained option values
    pub linked: Address,
}

/// Provider of SIL and LAL lookups
///
/// A block height of 0 means the latest block. An unreachable or failing
/// backend surfaces as `OracleUnavailable`.
pub trait AddressListOracle {
    /// The simplified input list of an address
    fn sil(&self, address: &Address, block_height: u64) -> HivemindResult<Vec<SilEntry>>;

    /// The linked address list of an address and extended public key
    fn lal(
        &self,
        address: &Address,
        xpub: &str,
        block_height: u64,
    ) -> HivemindResult<Vec<LalEntry>>;
}

/// Oracle with no backend; every lookup is unavailable
#[derive(Debug, Clone, Default)]
pub struct NullOracle;

impl AddressListOracle for NullOracle {
    fn sil(&self, address: &Address, _block_height: u64) -> HivemindResult<Vec<SilEntry>> {
        Err(HivemindError::OracleUnavailable(format!(
            "no SIL backend configured, cannot resolve {}",
            address
        )))
    }

    fn lal(
        &self,
        address: &Address,
        _xpub: &str,
        _block_height: u64,
    ) -> HivemindResult<Vec<LalEntry>> {
        Err(HivemindError::OracleUnavailable(format!(
            "no LAL backend configured, cannot resolve {}",
            address
        )))
    }
}

/// In-memory oracle for tests and single-process embeddings
#[derive(Debug, Clone, Default)]
pub struct StaticListOracle {
    sils: BTreeMap<Address, Vec<SilEntry>>,
    lals: BTreeMap<Address, Vec<LalEntry>>,
}

impl StaticListOracle {
    /// Create an empty oracle
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the SIL of an address
    pub fn with_sil(mut self, address: Address, entries: Vec<SilEntry>) -> Self {
        self.sils.insert(address, entries);
        self
    }

    /// Register the LAL of an address
    pub fn with_lal(mut self, address: Address, entries: Vec<LalEntry>) -> Self {
        self.lals.insert(address, entries);
        self
    }
}

impl AddressListOracle for StaticListOracle {
    fn sil(&self, address: &Address, _block_height: u64) -> HivemindResult<Vec<SilEntry>> {
        self.sils.get(address).cloned().ok_or_else(|| {
            HivemindError::OracleUnavailable(format!("no SIL registered for {}", address))
        })
    }

    fn lal(
        &self,
        address: &Address,
        _xpub: &str,
        _block_height: u64,
    ) -> HivemindResult<Vec<LalEntry>> {
        self.lals.get(address).cloned().ok_or_else(|| {
            HivemindError::OracleUnavailable(format!("no LAL registered for {}", address))
        })
    }
}

//! State records
//!
//! The state is the only evolving aggregate: the option pool, the
//! per-question opinion/result/contribution maps, supporter tuples,
//! participant weights and the selection history. Snapshots are persisted
//! to the store and each snapshot references its predecessor, forming a
//! hash-linked chain.

use crate::option::OptionValue;
use crate::{HivemindError, HivemindResult};
use lib_cas::{get_record, put_record, Cas, Multihash};
use lib_identity::{Address, Signature};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One recorded selection: the winning value per question, `None` where a
/// question had no consensus at selection time
pub type Selection = Vec<Option<OptionValue>>;

/// Supporter tuple binding an address to an option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Support {
    /// The supported option
    pub option_hash: Multihash,
    /// The supporting address
    pub address: Address,
    /// Signature of `IPFS=<option_hash>` by the address
    pub signature: Signature,
}

/// Accepted opinion of one participant at one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpinionEntry {
    /// Hash of the opinion record
    pub opinion_hash: Multihash,
    /// Signature of `IPFS=<opinion_hash>` by the opinionator
    pub signature: Signature,
    /// Unix seconds at the moment the opinion was accepted
    pub timestamp: u64,
}

/// Pairwise tally of one option at one question
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Weighted comparisons won
    pub win: f64,
    /// Weighted comparisons lost
    pub loss: f64,
    /// Weighted comparisons with no winner
    pub unknown: f64,
    /// `win / (win + loss + unknown)`, 0 on an empty denominator
    pub score: f64,
}

/// Evolving aggregate of one hivemind issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HivemindState {
    /// The issue this state tracks
    pub hivemind_issue_hash: Multihash,
    /// Hash of the predecessor snapshot, `None` for the first
    pub previous_state_hash: Option<Multihash>,
    /// Option hashes in insertion order, no duplicates
    pub options: Vec<Multihash>,
    /// Per-question map of opinionator to accepted opinion
    pub opinions: Vec<BTreeMap<Address, OpinionEntry>>,
    /// Participant weights
    pub weights: BTreeMap<Address, f64>,
    /// Per-question pairwise results
    pub results: Vec<BTreeMap<Multihash, ResultEntry>>,
    /// Per-question contribution attribution
    pub contributions: Vec<BTreeMap<Address, f64>>,
    /// Supporter tuples in insertion order
    pub supporters: Vec<Support>,
    /// Selection history
    pub selected: Vec<Selection>,
    /// Frozen flag; a finalized state absorbs mutations as no-ops
    pub finalized: bool,
    /// Multihash this snapshot was last stored under, maintained to link
    /// the successor snapshot
    #[serde(skip)]
    pub(crate) cached_hash: Option<Multihash>,
}

impl HivemindState {
    /// Create an empty state bound to an issue with the given number of
    /// questions
    pub fn new(hivemind_issue_hash: Multihash, question_count: usize) -> Self {
        Self {
            hivemind_issue_hash,
            previous_state_hash: None,
            options: Vec::new(),
            opinions: vec![BTreeMap::new(); question_count],
            weights: BTreeMap::new(),
            results: vec![BTreeMap::new(); question_count],
            contributions: vec![BTreeMap::new(); question_count],
            supporters: Vec::new(),
            selected: Vec::new(),
            finalized: false,
            cached_hash: None,
        }
    }

    /// Number of questions this state tracks
    pub fn question_count(&self) -> usize {
        self.opinions.len()
    }

    /// Reset one question's result entries to zeroes
    pub fn clear_results(&mut self, question_index: usize) {
        if let Some(results) = self.results.get_mut(question_index) {
            for entry in results.values_mut() {
                *entry = ResultEntry::default();
            }
        }
    }

    /// Set a participant's weight
    pub fn set_weight(&mut self, opinionator: &Address, weight: f64) {
        self.weights.insert(opinionator.clone(), weight);
    }

    /// A participant's weight, 0 when absent
    pub fn get_weight(&self, opinionator: &Address) -> f64 {
        self.weights.get(opinionator).copied().unwrap_or(0.0)
    }

    /// The accepted opinion entry of a participant at a question
    pub fn get_opinion(
        &self,
        opinionator: &Address,
        question_index: usize,
    ) -> Option<&OpinionEntry> {
        self.opinions.get(question_index)?.get(opinionator)
    }

    /// Whether the address already supports the option
    pub fn has_support(&self, option_hash: &Multihash, address: &Address) -> bool {
        self.supporters
            .iter()
            .any(|s| &s.option_hash == option_hash && &s.address == address)
    }

    /// Number of supporter tuples recorded for an address
    pub fn supported_count(&self, address: &Address) -> usize {
        self.supporters
            .iter()
            .filter(|s| &s.address == address)
            .count()
    }

    /// Empty every per-question opinion map
    pub(crate) fn reset_opinions(&mut self) {
        for opinions in &mut self.opinions {
            opinions.clear();
        }
    }

    /// The multihash this snapshot was last stored under
    pub fn multihash(&self) -> Option<&Multihash> {
        self.cached_hash.as_ref()
    }

    /// Persist a snapshot, linking it to the previously stored one
    pub fn save(&mut self, cas: &mut dyn Cas) -> HivemindResult<Multihash> {
        self.previous_state_hash = self.cached_hash.clone();
        let hash = put_record(cas, self)?;
        self.cached_hash = Some(hash.clone());
        Ok(hash)
    }

    /// Load a snapshot from the store
    pub fn load(cas: &dyn Cas, hash: &Multihash) -> HivemindResult<Self> {
        let mut state: Self = get_record(cas, hash)?;
        if state.opinions.len() != state.results.len()
            || state.opinions.len() != state.contributions.len()
        {
            return Err(HivemindError::InvalidInput(format!(
                "state {} has mismatched per-question maps",
                hash
            )));
        }
        state.cached_hash = Some(hash.clone());
        Ok(state)
    }
}

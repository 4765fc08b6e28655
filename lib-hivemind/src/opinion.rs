//! Opinion records
//!
//! An opinion is an immutable ranked list of option hashes submitted by
//! one participant against a named state snapshot. Numeric issues allow a
//! single-pick opinion with an auto-complete rule; the effective ranking
//! is then derived over all options in the state.

use crate::issue::AnswerType;
use crate::state::HivemindState;
use crate::{HivemindError, HivemindResult};
use lib_cas::{get_record, put_record, Cas, Multihash};
use lib_identity::Address;
use serde::{Deserialize, Serialize};

/// Auto-complete rule for single-pick opinions on numeric issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoComplete {
    /// Prefer values at or below the pick, nearest first
    Max,
    /// Prefer values at or above the pick, nearest first
    Min,
    /// Sort by absolute distance to the pick
    Closest,
    /// Sort by absolute distance, higher value first at equal distance
    ClosestHigh,
    /// Sort by absolute distance, lower value first at equal distance
    ClosestLow,
}

/// Immutable ranked list over option hashes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HivemindOpinion {
    /// Address of the participant expressing the opinion
    pub opinionator: Option<Address>,
    /// State snapshot the ranking was made against
    pub hivemind_state_hash: Multihash,
    /// Question the ranking applies to
    pub question_index: usize,
    /// Option hashes, best first
    pub ranked_choice: Vec<Multihash>,
    /// Optional expansion rule for numeric single-pick opinions
    pub auto_complete: Option<AutoComplete>,
}

impl HivemindOpinion {
    /// Create an empty opinion bound to a state snapshot
    pub fn new(hivemind_state_hash: Multihash, question_index: usize) -> Self {
        Self {
            opinionator: None,
            hivemind_state_hash,
            question_index,
            ranked_choice: Vec::new(),
            auto_complete: None,
        }
    }

    /// Set the opinionator and ranked choice, validated against the state
    pub fn set(
        &mut self,
        opinionator: Address,
        ranked_choice: Vec<Multihash>,
        state: &HivemindState,
    ) -> HivemindResult<()> {
        self.opinionator = Some(opinionator);
        self.ranked_choice = ranked_choice;
        self.validate(&state.options)
    }

    /// Set the auto-complete rule
    pub fn set_auto_complete(&mut self, auto_complete: AutoComplete) {
        self.auto_complete = Some(auto_complete);
    }

    /// Whether the ranked choice contains the same hash twice
    pub fn contains_duplicates(&self) -> bool {
        for (i, hash) in self.ranked_choice.iter().enumerate() {
            if self.ranked_choice[i + 1..].contains(hash) {
                return true;
            }
        }
        false
    }

    /// Check the ranked choice against an option set
    pub fn validate(&self, options: &[Multihash]) -> HivemindResult<()> {
        if self.contains_duplicates() {
            return Err(HivemindError::InvalidInput(
                "ranked choice contains duplicate options".to_string(),
            ));
        }
        for hash in &self.ranked_choice {
            if !options.contains(hash) {
                return Err(HivemindError::InvalidInput(format!(
                    "ranked choice references unknown option {}",
                    hash
                )));
            }
        }
        Ok(())
    }

    /// Whether every option of the state is ranked
    pub fn is_complete(&self, options: &[Multihash]) -> bool {
        options.iter().all(|hash| self.ranked_choice.contains(hash))
    }

    /// The options of the state this opinion leaves unranked
    pub fn unranked_options(&self, options: &[Multihash]) -> Vec<Multihash> {
        options
            .iter()
            .filter(|hash| !self.ranked_choice.contains(hash))
            .cloned()
            .collect()
    }

    /// The effective ranked list
    ///
    /// For non-numeric answers, or when no auto-complete rule applies,
    /// this is the ranked choice verbatim. A single-pick opinion on a
    /// numeric issue expands over all options per its rule; more than one
    /// explicit entry overrules the auto-complete.
    pub fn ranking(
        &self,
        answer_type: AnswerType,
        option_values: &[(Multihash, f64)],
    ) -> Vec<Multihash> {
        if !answer_type.is_numeric() {
            return self.ranked_choice.clone();
        }
        let rule = match self.auto_complete {
            Some(rule) if self.ranked_choice.len() == 1 => rule,
            _ => return self.ranked_choice.clone(),
        };

        let pick_hash = &self.ranked_choice[0];
        let pick = match option_values.iter().find(|(hash, _)| hash == pick_hash) {
            Some((_, value)) => *value,
            None => return self.ranked_choice.clone(),
        };

        let mut ordered: Vec<(Multihash, f64)> = option_values.to_vec();
        match rule {
            AutoComplete::Max => {
                ordered.retain(|(_, value)| *value <= pick);
                ordered.sort_by(|a, b| (pick - a.1).total_cmp(&(pick - b.1)));
            }
            AutoComplete::Min => {
                ordered.retain(|(_, value)| *value >= pick);
                ordered.sort_by(|a, b| (a.1 - pick).total_cmp(&(b.1 - pick)));
            }
            AutoComplete::Closest => {
                ordered.sort_by(|a, b| (a.1 - pick).abs().total_cmp(&(b.1 - pick).abs()));
            }
            AutoComplete::ClosestHigh => {
                ordered.sort_by(|a, b| {
                    (a.1 - pick)
                        .abs()
                        .total_cmp(&(b.1 - pick).abs())
                        .then(b.1.total_cmp(&a.1))
                });
            }
            AutoComplete::ClosestLow => {
                ordered.sort_by(|a, b| {
                    (a.1 - pick)
                        .abs()
                        .total_cmp(&(b.1 - pick).abs())
                        .then(a.1.total_cmp(&b.1))
                });
            }
        }
        ordered.into_iter().map(|(hash, _)| hash).collect()
    }

    /// Persist the opinion
    pub fn save(&self, cas: &mut dyn Cas) -> HivemindResult<Multihash> {
        if self.opinionator.is_none() {
            return Err(HivemindError::InvalidInput(
                "opinion has no opinionator set".to_string(),
            ));
        }
        Ok(put_record(cas, self)?)
    }

    /// Load an opinion from the store
    pub fn load(cas: &dyn Cas, hash: &Multihash) -> HivemindResult<Self> {
        Ok(get_record(cas, hash)?)
    }
}

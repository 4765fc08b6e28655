//! Decision engine
//!
//! All state mutations run through the engine, which owns the store, the
//! signature verifier and the address list oracle. Artifacts are looked
//! up by multihash on demand and loaded issues are cached; the records
//! themselves never hold object references to each other.
//!
//! The engine is single-writer and synchronous: operations either
//! complete fully or abort without partial mutation, and the only silent
//! no-ops are the finalized-state guards.

use crate::issue::{AnswerType, ConsensusType, HivemindIssue, OnSelection};
use crate::opinion::HivemindOpinion;
use crate::option::{HivemindOption, OptionValue};
use crate::oracle::AddressListOracle;
use crate::ranking::{calculate_contributions, compare, ranked_by_score};
use crate::state::{HivemindState, OpinionEntry, ResultEntry, Selection, Support};
use crate::{HivemindError, HivemindResult};
use lib_cas::{Cas, Multihash};
use lib_identity::{Address, Signature, SignatureVerifier};
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Consensus result dispatched on the issue's consensus type
#[derive(Debug, Clone, PartialEq)]
pub enum Consensus {
    /// The single winning value, `None` on a tie or empty pool
    Single(Option<OptionValue>),
    /// All available values in descending score order
    Ranked(Vec<OptionValue>),
}

/// Canonical message a signature must bind to an artifact
fn signed_message(hash: &Multihash) -> String {
    format!("IPFS={}", hash)
}

fn now_unix() -> HivemindResult<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Single-writer decision engine over content-addressed artifacts
pub struct HivemindEngine {
    cas: Box<dyn Cas>,
    verifier: Box<dyn SignatureVerifier>,
    oracle: Box<dyn AddressListOracle>,
    /// Loaded issues keyed by multihash; issues are immutable so cache
    /// entries never expire
    issues: HashMap<Multihash, HivemindIssue>,
}

impl HivemindEngine {
    /// Create an engine from its external collaborators
    pub fn new(
        cas: Box<dyn Cas>,
        verifier: Box<dyn SignatureVerifier>,
        oracle: Box<dyn AddressListOracle>,
    ) -> Self {
        Self {
            cas,
            verifier,
            oracle,
            issues: HashMap::new(),
        }
    }

    /// Mutable access to the store, for publishing artifacts
    pub fn cas_mut(&mut self) -> &mut dyn Cas {
        self.cas.as_mut()
    }

    /// Read access to the store
    pub fn cas(&self) -> &dyn Cas {
        self.cas.as_ref()
    }

    /// Load an issue through the cache, validating it on first load
    pub fn issue(&mut self, hash: &Multihash) -> HivemindResult<HivemindIssue> {
        if let Some(issue) = self.issues.get(hash) {
            return Ok(issue.clone());
        }
        let issue = HivemindIssue::load(self.cas.as_ref(), hash)?;
        issue.valid()?;
        self.issues.insert(hash.clone(), issue.clone());
        Ok(issue)
    }

    /// Create an empty state bound to a stored issue
    pub fn new_state(&mut self, issue_hash: &Multihash) -> HivemindResult<HivemindState> {
        let issue = self.issue(issue_hash)?;
        Ok(HivemindState::new(issue_hash.clone(), issue.questions.len()))
    }

    /// Add an option to the state
    ///
    /// A finalized state absorbs the call silently. When the issue
    /// restricts proposers, an address and signature are mandatory; when
    /// credentials accompany a fresh append the address is registered as
    /// a supporter of its own option.
    pub fn add_option(
        &mut self,
        state: &mut HivemindState,
        option_hash: &Multihash,
        address: Option<&Address>,
        signature: Option<&Signature>,
    ) -> HivemindResult<()> {
        if state.finalized {
            debug!("state is final, ignoring option {}", option_hash);
            return Ok(());
        }
        let issue = self.issue(&state.hivemind_issue_hash)?;

        if let (Some(address), Some(signature)) = (address, signature) {
            if !self
                .verifier
                .verify(address, &signed_message(option_hash), signature)
            {
                return Err(HivemindError::SignatureInvalid(format!(
                    "cannot add option {}: signature by {} is not valid",
                    option_hash, address
                )));
            }
        }

        if let Some(allowed) = issue.restrictions.as_ref().and_then(|r| r.addresses.as_ref()) {
            let address = match (address, signature) {
                (Some(address), Some(_)) => address,
                _ => {
                    return Err(HivemindError::Forbidden(
                        "cannot add option: this issue restricts proposers and no address \
                         or signature was given"
                            .to_string(),
                    ))
                }
            };
            if !allowed.contains(address) {
                return Err(HivemindError::Forbidden(format!(
                    "cannot add option: address {} is not allowed to add options",
                    address
                )));
            }
        }

        if let Some(cap) = issue
            .restrictions
            .as_ref()
            .and_then(|r| r.options_per_address)
        {
            if let Some(address) = address {
                let count = state.supported_count(address);
                if count >= cap as usize {
                    return Err(HivemindError::Forbidden(format!(
                        "cannot add option: address {} already added {} options",
                        address, count
                    )));
                }
            }
        }

        let option = HivemindOption::load(self.cas.as_ref(), option_hash)?;
        if option.hivemind_issue_hash != state.hivemind_issue_hash {
            return Err(HivemindError::InvalidInput(format!(
                "option {} references a different issue",
                option_hash
            )));
        }
        self.validate_option(&option)?;

        if !state.options.contains(option_hash) {
            state.options.push(option_hash.clone());
            for results in &mut state.results {
                results.insert(option_hash.clone(), ResultEntry::default());
            }
            info!("added option {}", option_hash);

            if let (Some(address), Some(signature)) = (address, signature) {
                self.support_option(state, option_hash, address, signature)?;
            }
        }
        Ok(())
    }

    /// Register support of an address for an option already in the state
    pub fn support_option(
        &mut self,
        state: &mut HivemindState,
        option_hash: &Multihash,
        address: &Address,
        signature: &Signature,
    ) -> HivemindResult<()> {
        if state.finalized {
            debug!("state is final, ignoring support for {}", option_hash);
            return Ok(());
        }
        if !self
            .verifier
            .verify(address, &signed_message(option_hash), signature)
        {
            return Err(HivemindError::SignatureInvalid(format!(
                "cannot support option {}: signature by {} is not valid",
                option_hash, address
            )));
        }
        if !state.options.contains(option_hash) {
            return Err(HivemindError::NotFound(format!(
                "cannot support option: {} is not part of this state",
                option_hash
            )));
        }
        if state.has_support(option_hash, address) {
            return Ok(());
        }
        state.supporters.push(Support {
            option_hash: option_hash.clone(),
            address: address.clone(),
            signature: signature.clone(),
        });
        Ok(())
    }

    /// Accept an opinion for one question
    ///
    /// The signature must bind the opinion's own opinionator to the
    /// opinion hash. A prior opinion of the same participant at the same
    /// question is replaced; the participant's weight is recorded.
    pub fn add_opinion(
        &mut self,
        state: &mut HivemindState,
        opinion_hash: &Multihash,
        signature: &Signature,
        weight: f64,
        question_index: usize,
    ) -> HivemindResult<()> {
        if state.finalized {
            debug!("state is final, ignoring opinion {}", opinion_hash);
            return Ok(());
        }
        self.check_question(state, question_index)?;

        let opinion = HivemindOpinion::load(self.cas.as_ref(), opinion_hash)?;
        let opinionator = opinion.opinionator.clone().ok_or_else(|| {
            HivemindError::InvalidInput(format!("opinion {} has no opinionator", opinion_hash))
        })?;

        if !self
            .verifier
            .verify(&opinionator, &signed_message(opinion_hash), signature)
        {
            return Err(HivemindError::SignatureInvalid(format!(
                "cannot add opinion {}: signature by {} is not valid",
                opinion_hash, opinionator
            )));
        }

        opinion.validate(&state.options)?;

        let entry = OpinionEntry {
            opinion_hash: opinion_hash.clone(),
            signature: signature.clone(),
            timestamp: now_unix()?,
        };
        state.opinions[question_index].insert(opinionator.clone(), entry);
        state.set_weight(&opinionator, weight);
        info!(
            "accepted opinion {} by {} at question {}",
            opinion_hash, opinionator, question_index
        );
        Ok(())
    }

    /// Recompute one question's results and contributions
    pub fn calculate_results(
        &mut self,
        state: &mut HivemindState,
        question_index: usize,
    ) -> HivemindResult<()> {
        self.check_question(state, question_index)?;
        let issue = self.issue(&state.hivemind_issue_hash)?;
        info!("calculating results for question {}", question_index);

        state.clear_results(question_index);
        let available = self.available_options(state, &issue, question_index)?;

        // Preload every voter's ranked choice and weight once
        let mut ranked_choices: BTreeMap<Address, Vec<Multihash>> = BTreeMap::new();
        let mut voters: Vec<(Address, f64)> = Vec::new();
        for (address, entry) in &state.opinions[question_index] {
            let opinion = HivemindOpinion::load(self.cas.as_ref(), &entry.opinion_hash)?;
            ranked_choices.insert(address.clone(), opinion.ranked_choice);
            voters.push((address.clone(), state.get_weight(address)));
        }

        let results = &mut state.results[question_index];
        for i in 0..available.len() {
            for j in i + 1..available.len() {
                let (a, b) = (&available[i], &available[j]);
                for (address, weight) in &voters {
                    match compare(a, b, &ranked_choices[address]) {
                        Some(winner) => {
                            let loser = if winner == a { b } else { a };
                            results.entry(winner.clone()).or_default().win += weight;
                            results.entry(loser.clone()).or_default().loss += weight;
                        }
                        None => {
                            results.entry(a.clone()).or_default().unknown += weight;
                            results.entry(b.clone()).or_default().unknown += weight;
                        }
                    }
                }
            }
        }

        for entry in results.values_mut() {
            let total = entry.win + entry.loss + entry.unknown;
            entry.score = if total > 0.0 { entry.win / total } else { 0.0 };
        }

        let ranked_options = ranked_by_score(&state.results[question_index], &state.options);
        state.contributions[question_index] = calculate_contributions(
            &state.opinions[question_index],
            &state.weights,
            &ranked_choices,
            &ranked_options,
        );
        Ok(())
    }

    /// The single winning value of a question, `None` on a tie or an
    /// empty available pool
    pub fn consensus(
        &mut self,
        state: &HivemindState,
        question_index: usize,
    ) -> HivemindResult<Option<OptionValue>> {
        self.check_question(state, question_index)?;
        let issue = self.issue(&state.hivemind_issue_hash)?;
        let available = self.available_options(state, &issue, question_index)?;

        let results = &state.results[question_index];
        let mut ranked = ranked_by_score(results, &state.options);
        ranked.retain(|hash| available.contains(hash));

        match ranked.len() {
            0 => Ok(None),
            1 => Ok(Some(self.option_value(&ranked[0])?)),
            _ => {
                let top = results[&ranked[0]].score;
                let runner_up = results[&ranked[1]].score;
                if top > runner_up {
                    Ok(Some(self.option_value(&ranked[0])?))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// All available values of a question in descending score order
    pub fn ranked_consensus(
        &mut self,
        state: &HivemindState,
        question_index: usize,
    ) -> HivemindResult<Vec<OptionValue>> {
        self.check_question(state, question_index)?;
        let issue = self.issue(&state.hivemind_issue_hash)?;
        let available = self.available_options(state, &issue, question_index)?;

        let mut ranked = ranked_by_score(&state.results[question_index], &state.options);
        ranked.retain(|hash| available.contains(hash));

        let mut values = Vec::with_capacity(ranked.len());
        for hash in &ranked {
            values.push(self.option_value(hash)?);
        }
        Ok(values)
    }

    /// Consensus dispatched on the issue's consensus type
    pub fn get_consensus(
        &mut self,
        state: &HivemindState,
        question_index: usize,
    ) -> HivemindResult<Consensus> {
        let issue = self.issue(&state.hivemind_issue_hash)?;
        match issue.consensus_type {
            ConsensusType::Single => Ok(Consensus::Single(self.consensus(state, question_index)?)),
            ConsensusType::Ranked => {
                Ok(Consensus::Ranked(self.ranked_consensus(state, question_index)?))
            }
        }
    }

    /// Record the current consensus as selected and apply the issue's
    /// selection lifecycle effect
    ///
    /// Only meaningful for `Single` consensus issues and a no-op on a
    /// finalized state; results are recomputed first so the recorded
    /// selection can never be stale. A new state snapshot is persisted.
    pub fn select_consensus(
        &mut self,
        state: &mut HivemindState,
    ) -> HivemindResult<Option<Selection>> {
        let issue = self.issue(&state.hivemind_issue_hash)?;
        if issue.consensus_type != ConsensusType::Single {
            return Ok(None);
        }
        if state.finalized {
            debug!("state is final, ignoring selection");
            return Ok(None);
        }

        for question_index in 0..state.question_count() {
            self.calculate_results(state, question_index)?;
        }

        let mut selection: Selection = Vec::with_capacity(state.question_count());
        for question_index in 0..state.question_count() {
            selection.push(self.consensus(state, question_index)?);
        }
        state.selected.push(selection.clone());

        match issue.on_selection {
            OnSelection::None => {}
            OnSelection::Finalize => {
                state.finalized = true;
                info!("state finalized by selection");
            }
            OnSelection::Exclude => {
                // Exclusion takes effect on the next result calculation
            }
            OnSelection::Reset => {
                state.reset_opinions();
                info!("opinions reset by selection");
            }
        }

        state.save(self.cas.as_mut())?;
        info!("recorded selection {:?}", selection);
        Ok(Some(selection))
    }

    /// The effective ranking of an opinion under this state
    pub fn opinion_ranking(
        &mut self,
        state: &HivemindState,
        opinion: &HivemindOpinion,
    ) -> HivemindResult<Vec<Multihash>> {
        let issue = self.issue(&state.hivemind_issue_hash)?;
        if !issue.answer_type.is_numeric() {
            return Ok(opinion.ranking(issue.answer_type, &[]));
        }
        let values = self.numeric_option_values(state)?;
        Ok(opinion.ranking(issue.answer_type, &values))
    }

    /// Validate an option against its issue, completing the checks that
    /// need the oracle or the store
    pub fn validate_option(&mut self, option: &HivemindOption) -> HivemindResult<()> {
        let issue = self.issue(&option.hivemind_issue_hash)?;
        option.validate(&issue)?;

        match issue.answer_type {
            AnswerType::Address => self.validate_address_gates(option, &issue),
            AnswerType::Hivemind => {
                let text = option
                    .value
                    .as_ref()
                    .and_then(OptionValue::as_text)
                    .unwrap_or_default();
                let referenced = Multihash::from(text);
                self.issue(&referenced).map(|_| ()).map_err(|e| {
                    HivemindError::InvalidInput(format!(
                        "value {} does not resolve to a valid issue: {}",
                        text, e
                    ))
                })
            }
            _ => Ok(()),
        }
    }

    fn validate_address_gates(
        &mut self,
        option: &HivemindOption,
        issue: &HivemindIssue,
    ) -> HivemindResult<()> {
        let constraints = match &issue.constraints {
            Some(constraints) => constraints,
            None => return Ok(()),
        };
        let value = option
            .value
            .as_ref()
            .and_then(OptionValue::as_text)
            .unwrap_or_default();
        let block_height = constraints.block_height.unwrap_or(0);

        if let Some(sil_address) = &constraints.sil {
            let entries = self.oracle.sil(sil_address, block_height)?;
            if entries.iter().any(|entry| entry.address.as_str() == value) {
                Ok(())
            } else {
                Err(HivemindError::InvalidInput(format!(
                    "address {} is not in the SIL of {}",
                    value, sil_address
                )))
            }
        } else if let Some(lal_address) = &constraints.lal {
            let xpub = constraints.xpub.as_deref().unwrap_or_default();
            let entries = self.oracle.lal(lal_address, xpub, block_height)?;
            if entries.iter().any(|entry| entry.linked.as_str() == value) {
                Ok(())
            } else {
                Err(HivemindError::InvalidInput(format!(
                    "address {} is not in the LAL of {}",
                    value, lal_address
                )))
            }
        } else {
            Ok(())
        }
    }

    /// The option pool a calculation may draw from
    ///
    /// Exclude-mode issues strip every option whose value was previously
    /// selected at this question; all other modes use the full pool.
    fn available_options(
        &mut self,
        state: &HivemindState,
        issue: &HivemindIssue,
        question_index: usize,
    ) -> HivemindResult<Vec<Multihash>> {
        if issue.on_selection != OnSelection::Exclude || state.selected.is_empty() {
            return Ok(state.options.clone());
        }

        let excluded: Vec<OptionValue> = state
            .selected
            .iter()
            .filter_map(|selection| selection.get(question_index).cloned().flatten())
            .collect();

        let mut available = Vec::new();
        for hash in &state.options {
            let value = self.option_value(hash)?;
            if !excluded.contains(&value) {
                available.push(hash.clone());
            }
        }
        Ok(available)
    }

    fn option_value(&mut self, hash: &Multihash) -> HivemindResult<OptionValue> {
        let option = HivemindOption::load(self.cas.as_ref(), hash)?;
        option.value.ok_or_else(|| {
            HivemindError::InvalidInput(format!("option {} has no value", hash))
        })
    }

    /// Numeric values of all state options, in insertion order
    fn numeric_option_values(
        &mut self,
        state: &HivemindState,
    ) -> HivemindResult<Vec<(Multihash, f64)>> {
        let mut values = Vec::with_capacity(state.options.len());
        for hash in &state.options {
            if let Some(number) = self.option_value(hash)?.as_f64() {
                values.push((hash.clone(), number));
            }
        }
        Ok(values)
    }

    fn check_question(&self, state: &HivemindState, question_index: usize) -> HivemindResult<()> {
        if question_index >= state.question_count() {
            return Err(HivemindError::InvalidInput(format!(
                "question index {} is out of range for {} questions",
                question_index,
                state.question_count()
            )));
        }
        Ok(())
    }

    /// Human-readable summary of the option pool
    pub fn options_info(&mut self, state: &HivemindState) -> HivemindResult<String> {
        let mut info = String::from("Options\n=======\n");
        for (i, hash) in state.options.iter().enumerate() {
            let option = HivemindOption::load(self.cas.as_ref(), hash)?;
            info += &format!("Option {}: {}\n{}\n", i + 1, hash, option.info());
        }
        Ok(info)
    }

    /// Human-readable summary of one question's opinions
    pub fn opinions_info(
        &mut self,
        state: &HivemindState,
        question_index: usize,
    ) -> HivemindResult<String> {
        self.check_question(state, question_index)?;
        let mut info = String::from("Opinions\n========\n");
        for (address, entry) in &state.opinions[question_index] {
            let opinion = HivemindOpinion::load(self.cas.as_ref(), &entry.opinion_hash)?;
            info += &format!(
                "{} at {}: {} ranked options\n",
                address,
                entry.timestamp,
                opinion.ranked_choice.len()
            );
        }
        Ok(info)
    }

    /// Human-readable summary of one question's results
    pub fn results_info(
        &mut self,
        state: &HivemindState,
        question_index: usize,
    ) -> HivemindResult<String> {
        self.check_question(state, question_index)?;
        let mut info = String::from("Results\n=======\n");
        let ranked = ranked_by_score(&state.results[question_index], &state.options);
        for (i, hash) in ranked.iter().enumerate() {
            let score = state.results[question_index][hash].score;
            let value = self.option_value(hash)?;
            info += &format!("{}: ({:.2}%) : {}\n", i + 1, score * 100.0, value);
        }
        for (address, contribution) in &state.contributions[question_index] {
            info += &format!("Contribution {}: {}\n", address, contribution);
        }
        Ok(info)
    }
}

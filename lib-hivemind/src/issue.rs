//! Issue records
//!
//! An issue is the immutable question specification: one or more question
//! strings, the expected answer type, option constraints, proposer
//! restrictions and the lifecycle effect of selecting a consensus. All
//! mutators validate their input and fail loudly; once saved to the store
//! the record never changes.

use crate::option::OptionValue;
use crate::tag_hash::TagHash;
use crate::{HivemindError, HivemindResult};
use lib_cas::{get_record, put_record, Cas, Multihash};
use lib_identity::Address;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Answer type of an issue's options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerType {
    String,
    Bool,
    Integer,
    Float,
    Hivemind,
    Image,
    Video,
    Complex,
    Address,
}

impl AnswerType {
    /// Whether options of this type carry a numeric value
    pub fn is_numeric(&self) -> bool {
        matches!(self, AnswerType::Integer | AnswerType::Float)
    }
}

impl fmt::Display for AnswerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnswerType::String => "String",
            AnswerType::Bool => "Bool",
            AnswerType::Integer => "Integer",
            AnswerType::Float => "Float",
            AnswerType::Hivemind => "Hivemind",
            AnswerType::Image => "Image",
            AnswerType::Video => "Video",
            AnswerType::Complex => "Complex",
            AnswerType::Address => "Address",
        };
        write!(f, "{}", name)
    }
}

/// Whether the expected result is a single answer or a ranked list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusType {
    Single,
    Ranked,
}

/// Lifecycle effect applied when a consensus is selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnSelection {
    /// Nothing happens
    None,
    /// The state is frozen, no new options or opinions can be added
    Finalize,
    /// The selected option is excluded from future results
    Exclude,
    /// All opinions are reset
    Reset,
}

/// Field types allowed in a complex value specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecType {
    String,
    Integer,
    Float,
}

/// Option constraints, all optional, all checked when set
///
/// The record is closed: unknown keys are rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Constraints {
    /// Minimum string length in characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Maximum string length in characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Minimum numeric value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Maximum numeric value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Exact number of fractional digits in the decimal text form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    /// Pattern the string value must match from its start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// Finite allow-list of permitted values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<OptionValue>>,
    /// Field specification for complex values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specs: Option<BTreeMap<String, SpecType>>,
    /// Address whose input list gates permitted address values
    #[serde(rename = "SIL", skip_serializing_if = "Option::is_none")]
    pub sil: Option<Address>,
    /// Address whose linked address list gates permitted address values
    #[serde(rename = "LAL", skip_serializing_if = "Option::is_none")]
    pub lal: Option<Address>,
    /// Extended public key, required when `LAL` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpub: Option<String>,
    /// Block height at which the SIL/LAL is evaluated (0 = latest)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
}

/// Restrictions on who may propose options
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Restrictions {
    /// Allow-list of addresses that may add options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Address>>,
    /// Cap on the number of options a single address may add
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options_per_address: Option<u32>,
}

/// Immutable question specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HivemindIssue {
    /// Canonical tag hash of the primary question, answer type and tags
    pub hivemind_id: Option<String>,
    /// Question strings; the first is primary, additional questions share
    /// the option pool but have independent opinions and results
    pub questions: Vec<String>,
    /// Free-form description
    pub description: String,
    /// Optional tags feeding the issue identifier
    pub tags: Option<String>,
    /// Answer type of all options
    pub answer_type: AnswerType,
    /// Single answer or ranked list
    pub consensus_type: ConsensusType,
    /// Option constraints
    pub constraints: Option<Constraints>,
    /// Proposer restrictions
    pub restrictions: Option<Restrictions>,
    /// Lifecycle effect of selecting a consensus
    pub on_selection: OnSelection,
}

impl Default for HivemindIssue {
    fn default() -> Self {
        Self {
            hivemind_id: None,
            questions: Vec::new(),
            description: String::new(),
            tags: None,
            answer_type: AnswerType::String,
            consensus_type: ConsensusType::Single,
            constraints: None,
            restrictions: None,
            on_selection: OnSelection::None,
        }
    }
}

impl HivemindIssue {
    /// Create an empty issue with default answer and consensus types
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a question; duplicates are ignored
    pub fn add_question(&mut self, question: impl Into<String>) {
        let question = question.into();
        if !self.questions.contains(&question) {
            self.questions.push(question);
        }
    }

    /// Set the description
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Set the tags
    pub fn set_tags(&mut self, tags: impl Into<String>) {
        self.tags = Some(tags.into());
    }

    /// Set the answer type
    pub fn set_answer_type(&mut self, answer_type: AnswerType) {
        self.answer_type = answer_type;
    }

    /// Set the consensus type
    pub fn set_consensus_type(&mut self, consensus_type: ConsensusType) {
        self.consensus_type = consensus_type;
    }

    /// Set the selection lifecycle effect
    pub fn set_on_selection(&mut self, on_selection: OnSelection) {
        self.on_selection = on_selection;
    }

    /// Set and validate option constraints
    pub fn set_constraints(&mut self, constraints: Constraints) -> HivemindResult<()> {
        if constraints.lal.is_some() && constraints.xpub.is_none() {
            return Err(HivemindError::InvalidInput(
                "constraints that include a LAL must also have a xpub".to_string(),
            ));
        }
        if let Some(pattern) = &constraints.regex {
            Regex::new(pattern).map_err(|e| {
                HivemindError::InvalidInput(format!("regex constraint does not compile: {}", e))
            })?;
        }
        self.constraints = Some(constraints);
        Ok(())
    }

    /// Set and validate proposer restrictions
    pub fn set_restrictions(&mut self, restrictions: Restrictions) -> HivemindResult<()> {
        if restrictions.options_per_address == Some(0) {
            return Err(HivemindError::InvalidInput(
                "options_per_address must be at least 1".to_string(),
            ));
        }
        self.restrictions = Some(restrictions);
        Ok(())
    }

    /// Check the issue invariants
    pub fn valid(&self) -> HivemindResult<()> {
        if self.questions.is_empty() {
            return Err(HivemindError::InvalidInput(
                "an issue needs at least one question".to_string(),
            ));
        }
        if let Some(constraints) = &self.constraints {
            if constraints.lal.is_some() && constraints.xpub.is_none() {
                return Err(HivemindError::InvalidInput(
                    "constraints that include a LAL must also have a xpub".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Derive the canonical issue identifier
    pub fn id(&self) -> HivemindResult<String> {
        let primary = self.questions.first().ok_or_else(|| {
            HivemindError::InvalidInput("an issue needs at least one question".to_string())
        })?;
        let mut tag_hash = TagHash::new(primary.clone());
        tag_hash.add_tag(self.answer_type.to_string());
        if let Some(tags) = &self.tags {
            tag_hash.add_tag(tags.clone());
        }
        Ok(tag_hash.get())
    }

    /// Compute the identifier and persist the issue
    pub fn save(&mut self, cas: &mut dyn Cas) -> HivemindResult<Multihash> {
        self.valid()?;
        self.hivemind_id = Some(self.id()?);
        Ok(put_record(cas, self)?)
    }

    /// Load an issue from the store
    pub fn load(cas: &dyn Cas, hash: &Multihash) -> HivemindResult<Self> {
        Ok(get_record(cas, hash)?)
    }

    /// Human-readable summary of the issue
    pub fn info(&self) -> String {
        let mut info = format!(
            "Hivemind ID: {}\n",
            self.hivemind_id.as_deref().unwrap_or("(unsaved)")
        );
        if let Some(question) = self.questions.first() {
            info += &format!("Hivemind question: {}\n", question);
        }
        info += &format!("Hivemind description: {}\n", self.description);
        if let Some(tags) = &self.tags {
            info += &format!("Hivemind tags: {}\n", tags);
        }
        info += &format!("Answer type: {}\n", self.answer_type);
        for (i, question) in self.questions.iter().enumerate().skip(1) {
            info += &format!("Additional question {}: {}\n", i, question);
        }
        info
    }
}

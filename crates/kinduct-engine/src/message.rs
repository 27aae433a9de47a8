//! Messages exchanged between engines through the director.

use std::fmt;

use serde::Serialize;

use crate::invariant::Invariant;
use crate::result::Counterexample;

/// Engine roles. `Director` appears only as the result of
/// [`crate::director::Director::next_responsible`] once no engine role is
/// left to process a `Valid` verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    Bmc,
    KInduction,
    InvariantGeneration,
    InvariantReduction,
    Director,
}

impl EngineType {
    /// Reactive roles only act on messages and never start work on their own.
    pub fn is_reactive(self) -> bool {
        matches!(self, EngineType::InvariantReduction)
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineType::Bmc => "bmc",
            EngineType::KInduction => "k-induction",
            EngineType::InvariantGeneration => "invariant-generation",
            EngineType::InvariantReduction => "invariant-reduction",
            EngineType::Director => "director",
        };
        f.write_str(name)
    }
}

/// The base case holds for `properties` on every path of length `step`.
#[derive(Debug, Clone)]
pub struct BaseStepMessage {
    pub step: usize,
    pub properties: Vec<String>,
}

/// The inductive step failed for `properties` at depth `k`.
#[derive(Debug, Clone)]
pub struct InductiveCounterexampleMessage {
    pub properties: Vec<String>,
    pub k: usize,
}

#[derive(Debug, Clone)]
pub struct InvalidMessage {
    pub source: EngineType,
    pub properties: Vec<String>,
    pub counterexample: Counterexample,
}

/// Proven auxiliary invariants.
#[derive(Debug, Clone)]
pub struct InvariantMessage {
    pub invariants: Vec<Invariant>,
}

#[derive(Debug, Clone)]
pub struct UnknownMessage {
    pub source: EngineType,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ValidMessage {
    pub source: EngineType,
    pub properties: Vec<String>,
    pub k: usize,
    pub invariants: Vec<Invariant>,
    /// Responsibility round, stamped by the director on broadcast.
    pub round: usize,
}

impl ValidMessage {
    pub fn new(source: EngineType, properties: Vec<String>, k: usize, invariants: Vec<Invariant>) -> Self {
        Self {
            source,
            properties,
            k,
            invariants,
            round: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    BaseStep(BaseStepMessage),
    InductiveCounterexample(InductiveCounterexampleMessage),
    Invalid(InvalidMessage),
    Invariant(InvariantMessage),
    Unknown(UnknownMessage),
    Valid(ValidMessage),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::BaseStep(_) => "base-step",
            Message::InductiveCounterexample(_) => "inductive-counterexample",
            Message::Invalid(_) => "invalid",
            Message::Invariant(_) => "invariant",
            Message::Unknown(_) => "unknown",
            Message::Valid(_) => "valid",
        }
    }

    /// Property names the message concerns.
    pub fn properties(&self) -> &[String] {
        match self {
            Message::BaseStep(m) => &m.properties,
            Message::InductiveCounterexample(m) => &m.properties,
            Message::Invalid(m) => &m.properties,
            Message::Invariant(_) => &[],
            Message::Unknown(m) => &m.properties,
            Message::Valid(m) => &m.properties,
        }
    }
}

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use kinduct_smt::solver::{Model, ModelValue};
use kinduct_smt::sorts::SmtSort;
use serde::Serialize;

use crate::invariant::Invariant;
use crate::specification::step_var;

/// Concrete execution violating a property: state values at steps `0..=k`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counterexample {
    pub steps: Vec<BTreeMap<String, ModelValue>>,
}

impl Counterexample {
    /// Read steps `0..=k` of `vars` out of a step-instantiated model.
    pub fn from_model(model: &Model, vars: &[(String, SmtSort)], k: usize) -> Self {
        let steps = (0..=k as i64)
            .map(|step| {
                vars.iter()
                    .filter_map(|(name, _)| {
                        model
                            .get(&step_var(name, step))
                            .map(|value| (name.clone(), value))
                    })
                    .collect()
            })
            .collect();
        Self { steps }
    }

    /// Index of the last step.
    pub fn length(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, state) in self.steps.iter().enumerate() {
            write!(f, "step {i}:")?;
            for (name, value) in state {
                write!(f, " {name}={value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Terminal verdict for one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PropertyResult {
    /// Proven by k-induction at depth `k`, strengthened by `invariants`.
    Valid { k: usize, invariants: Vec<Invariant> },
    Invalid { counterexample: Counterexample },
    Unknown,
}

impl PropertyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, PropertyResult::Valid { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, PropertyResult::Invalid { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            PropertyResult::Valid { .. } => "valid",
            PropertyResult::Invalid { .. } => "invalid",
            PropertyResult::Unknown => "unknown",
        }
    }

    /// Whether two verdicts disagree on the property's status.
    pub fn conflicts_with(&self, other: &PropertyResult) -> bool {
        self.label() != other.label()
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyResult::Valid { k, invariants } => {
                write!(f, "VALID (k = {k}")?;
                if !invariants.is_empty() {
                    let names: Vec<&str> = invariants.iter().map(Invariant::name).collect();
                    write!(f, ", invariants: {}", names.join(", "))?;
                }
                write!(f, ")")
            }
            PropertyResult::Invalid { counterexample } => {
                write!(f, "INVALID (counterexample of length {})", counterexample.length())
            }
            PropertyResult::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Outcome of a verification session, one entry per property in
/// specification order.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub properties: IndexMap<String, PropertyResult>,
}

impl SessionReport {
    pub fn get(&self, property: &str) -> Option<&PropertyResult> {
        self.properties.get(property)
    }

    pub fn all_valid(&self) -> bool {
        self.properties.values().all(PropertyResult::is_valid)
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, result) in &self.properties {
            writeln!(f, "{name}: {result}")?;
        }
        Ok(())
    }
}

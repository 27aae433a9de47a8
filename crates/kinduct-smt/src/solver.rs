//! Backend interface shared by every solver the engines can run on.
//!
//! Engines never talk to a backend directly; they go through
//! [`SolverSession`](crate::session::SolverSession), which owns the label
//! bookkeeping. A backend only has to honour SMT-LIB scoping and
//! `check-sat-assuming` over declared Boolean constants.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    /// The backend gave up; carries its reason (timeout, resource limit, ...).
    Unknown(String),
}

/// Values of step-instantiated variables read back after a `Sat` check.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ModelValue {
    Int(i64),
    Bool(bool),
}

impl Model {
    pub fn get(&self, name: &str) -> Option<ModelValue> {
        self.values.get(name).copied()
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ModelValue::Int(n) => Some(n),
            ModelValue::Bool(_) => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            ModelValue::Bool(b) => Some(b),
            ModelValue::Int(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, ModelValue)> for Model {
    fn from_iter<I: IntoIterator<Item = (String, ModelValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ModelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelValue::Int(n) => write!(f, "{n}"),
            ModelValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// An incremental SMT backend.
///
/// Declarations and assertions belong to the innermost open scope and are
/// discarded by the matching `pop`. Assumption names passed to
/// [`check_sat_assuming`](SmtSolver::check_sat_assuming) are Boolean
/// constants declared through [`declare_var`](SmtSolver::declare_var); they
/// hold for that one check only.
pub trait SmtSolver {
    type Error: std::error::Error + Send + Sync + 'static;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    fn push(&mut self) -> Result<(), Self::Error>;

    fn pop(&mut self) -> Result<(), Self::Error>;

    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Self::Error>;

    /// Subset of the assumptions of the last `Unsat` check that is already
    /// unsatisfiable together with the assertions. Backends without core
    /// extraction may return every assumption.
    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, Self::Error>;

    /// Values of `var_names` after the last check returned `Sat`. Variables
    /// the backend cannot evaluate are left out of the model.
    fn get_model(&mut self, var_names: &[(&str, SmtSort)]) -> Result<Model, Self::Error>;

    /// Drop every scope, declaration and assertion.
    fn reset(&mut self) -> Result<(), Self::Error>;
}

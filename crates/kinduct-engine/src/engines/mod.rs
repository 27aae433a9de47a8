//! Concrete engine roles.

pub mod bmc;
pub mod invariant_generation;
pub mod invariant_reduction;
pub mod k_induction;

pub use bmc::BmcEngine;
pub use invariant_generation::InvariantGenerationEngine;
pub use invariant_reduction::InvariantReductionEngine;
pub use k_induction::KInductionEngine;

use kinduct_smt::eval::eval_bool;
use kinduct_smt::solver::Model;
use kinduct_smt::terms::SmtTerm;

use crate::error::EngineError;

/// Whether `term` is false under `model`. A model that leaves the term
/// undecided counts as not falsifying it.
pub(crate) fn is_false_in(term: &SmtTerm, model: &Model) -> Result<bool, EngineError> {
    eval_bool(term, model)
        .map(|value| value == Some(false))
        .map_err(|err| EngineError::Solver(format!("cannot evaluate `{term}` in model: {err}")))
}

//! Enumerative backend over a bounded integer domain.
//!
//! Integer variables range over `domain`; Boolean variables over both truth
//! values. The search assigns variables in declaration order and prunes as soon
//! as any assertion evaluates to false under the partial assignment. When the
//! search visits more than `budget` nodes the check returns `Unknown` instead
//! of running on.
//!
//! `Sat` answers are genuine integer models. A refutation over `domain` is
//! searched again over a domain widened by a quarter of its width on each
//! side, so a counter-model just past the edge turns the answer into `Sat`.
//! `Unsat` therefore only means unsatisfiable over the widened domain; use a
//! process or z3 backend when verdicts must hold over all integers.
//!
//! Unsat cores are trivial: every assumption of the failed check is reported.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use thiserror::Error;
use tracing::debug;

use crate::eval::{eval_bool, EvalError};
use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Default integer domain for [`BoundedSolver::new`].
pub const DEFAULT_DOMAIN: RangeInclusive<i64> = -32..=32;
/// Default search-node budget for [`BoundedSolver::new`].
pub const DEFAULT_BUDGET: u64 = 20_000_000;

#[derive(Debug, Error)]
pub enum BoundedError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Sort mismatch for variable {0}")]
    SortMismatch(String),
    #[error("pop without matching push")]
    ScopeUnderflow,
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),
}

#[derive(Debug, Default)]
struct Frame {
    vars: Vec<(String, SmtSort)>,
    assertions: Vec<SmtTerm>,
}

pub struct BoundedSolver {
    domain: RangeInclusive<i64>,
    budget: u64,
    frames: Vec<Frame>,
    last_model: Option<HashMap<String, ModelValue>>,
    last_assumptions: Vec<String>,
}

impl BoundedSolver {
    pub fn new() -> Self {
        Self::with_domain(DEFAULT_DOMAIN, DEFAULT_BUDGET)
    }

    pub fn with_domain(domain: RangeInclusive<i64>, budget: u64) -> Self {
        Self {
            domain,
            budget,
            frames: vec![Frame::default()],
            last_model: None,
            last_assumptions: Vec::new(),
        }
    }

    fn sort_of(&self, name: &str) -> Option<SmtSort> {
        self.frames
            .iter()
            .flat_map(|f| f.vars.iter())
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
    }

    /// `domain` grown by a quarter of its width, at least one value, on
    /// each side.
    fn widened(&self) -> RangeInclusive<i64> {
        let (lo, hi) = (*self.domain.start(), *self.domain.end());
        let margin = hi.saturating_sub(lo).max(0) / 4 + 1;
        lo.saturating_sub(margin)..=hi.saturating_add(margin)
    }

    fn search(&mut self, assumptions: &[String]) -> Result<SatResult, BoundedError> {
        let assertions: Vec<&SmtTerm> = self.frames.iter().flat_map(|f| f.assertions.iter()).collect();

        let mut env: HashMap<String, ModelValue> = HashMap::new();
        for name in assumptions {
            env.insert(name.clone(), ModelValue::Bool(true));
        }

        let mut referenced = std::collections::HashSet::new();
        for a in &assertions {
            referenced.extend(a.referenced_vars());
        }

        // Free variables nobody mentions get a default value without branching.
        let mut open: Vec<(String, SmtSort)> = Vec::new();
        for (name, sort) in self.frames.iter().flat_map(|f| f.vars.iter()) {
            if env.contains_key(name) {
                continue;
            }
            if referenced.contains(name.as_str()) {
                open.push((name.clone(), *sort));
            } else {
                env.insert(name.clone(), sort.witness());
            }
        }

        let mut domains = vec![self.domain.clone()];
        if open.iter().any(|(_, sort)| *sort == SmtSort::Int) {
            domains.push(self.widened());
        }

        let mut nodes = 0;
        let mut outcome = Outcome::Exhausted;
        for domain in domains {
            let mut search = Search {
                assertions: &assertions,
                open: &open,
                ints: int_candidates(&domain),
                nodes,
                budget: self.budget,
            };
            outcome = search.run(0, &mut env)?;
            nodes = search.nodes;
            debug!(nodes, open = open.len(), ?domain, "bounded search finished");
            if !matches!(outcome, Outcome::Exhausted) {
                break;
            }
        }
        match outcome {
            Outcome::Found => {
                self.last_model = Some(env);
                Ok(SatResult::Sat)
            }
            Outcome::Exhausted => {
                self.last_model = None;
                Ok(SatResult::Unsat)
            }
            Outcome::OutOfBudget => {
                self.last_model = None;
                Ok(SatResult::Unknown(format!(
                    "bounded search exceeded {} nodes",
                    self.budget
                )))
            }
        }
    }
}

impl Default for BoundedSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Integer candidates ordered by distance from zero.
fn int_candidates(domain: &RangeInclusive<i64>) -> Vec<i64> {
    let mut values: Vec<i64> = domain.clone().collect();
    values.sort_by_key(|v| (v.unsigned_abs(), *v < 0));
    values
}

enum Outcome {
    Found,
    Exhausted,
    OutOfBudget,
}

struct Search<'a> {
    assertions: &'a [&'a SmtTerm],
    open: &'a [(String, SmtSort)],
    ints: Vec<i64>,
    nodes: u64,
    budget: u64,
}

impl Search<'_> {
    fn consistent(&self, env: &HashMap<String, ModelValue>) -> Result<bool, BoundedError> {
        for assertion in self.assertions {
            if eval_bool(assertion, env)? == Some(false) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run(&mut self, depth: usize, env: &mut HashMap<String, ModelValue>) -> Result<Outcome, BoundedError> {
        self.nodes += 1;
        if self.nodes > self.budget {
            return Ok(Outcome::OutOfBudget);
        }
        if !self.consistent(env)? {
            return Ok(Outcome::Exhausted);
        }
        let open = self.open;
        let Some((name, sort)) = open.get(depth) else {
            return Ok(Outcome::Found);
        };
        let candidates: Vec<ModelValue> = match sort {
            SmtSort::Bool => vec![ModelValue::Bool(false), ModelValue::Bool(true)],
            SmtSort::Int => self.ints.iter().map(|n| ModelValue::Int(*n)).collect(),
        };
        for value in candidates {
            env.insert(name.clone(), value);
            match self.run(depth + 1, env)? {
                Outcome::Exhausted => {}
                done => return Ok(done),
            }
        }
        env.remove(name);
        Ok(Outcome::Exhausted)
    }
}

impl SmtSolver for BoundedSolver {
    type Error = BoundedError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), BoundedError> {
        match self.sort_of(name) {
            Some(existing) if existing == *sort => Ok(()),
            Some(_) => Err(BoundedError::SortMismatch(name.to_string())),
            None => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.vars.push((name.to_string(), *sort));
                }
                Ok(())
            }
        }
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), BoundedError> {
        for name in term.referenced_vars() {
            if self.sort_of(name).is_none() {
                return Err(BoundedError::UnknownVariable(name.to_string()));
            }
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.assertions.push(term.clone());
        }
        Ok(())
    }

    fn push(&mut self) -> Result<(), BoundedError> {
        self.frames.push(Frame::default());
        Ok(())
    }

    fn pop(&mut self) -> Result<(), BoundedError> {
        if self.frames.len() <= 1 {
            return Err(BoundedError::ScopeUnderflow);
        }
        self.frames.pop();
        self.last_model = None;
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, BoundedError> {
        self.check_sat_assuming(&[])
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, BoundedError> {
        for name in assumptions {
            match self.sort_of(name) {
                Some(SmtSort::Bool) => {}
                Some(SmtSort::Int) => return Err(BoundedError::SortMismatch(name.clone())),
                None => return Err(BoundedError::UnknownVariable(name.clone())),
            }
        }
        self.last_assumptions = assumptions.to_vec();
        self.search(assumptions)
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, BoundedError> {
        Ok(self.last_assumptions.clone())
    }

    fn get_model(&mut self, var_names: &[(&str, SmtSort)]) -> Result<Model, BoundedError> {
        let mut values = HashMap::new();
        if let Some(last) = &self.last_model {
            for (name, _) in var_names {
                if let Some(v) = last.get(*name) {
                    values.insert(name.to_string(), *v);
                }
            }
        }
        Ok(Model { values })
    }

    fn reset(&mut self) -> Result<(), BoundedError> {
        self.frames = vec![Frame::default()];
        self.last_model = None;
        self.last_assumptions.clear();
        Ok(())
    }
}

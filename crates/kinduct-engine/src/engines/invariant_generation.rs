//! Houdini-style generation of auxiliary invariants.
//!
//! Candidates are simple bounds over the state variables: `v >= c` and
//! `v <= c` for integer variables and every constant of the initial predicate
//! and transition relation, and `v` / `not v` for Boolean variables. At each
//! depth the candidates refuted on an initial path are discarded for good;
//! the largest subset that is `k`-inductive is then proven and broadcast.

use std::collections::BTreeSet;

use indexmap::IndexSet;
use kinduct_smt::session::QueryResult;
use kinduct_smt::solver::SmtSolver;
use kinduct_smt::sorts::SmtSort;
use kinduct_smt::terms::SmtTerm;
use tracing::{debug, info, warn};

use crate::director::Director;
use crate::engine::{Engine, EngineCore, Progress};
use crate::engines::is_false_in;
use crate::error::EngineError;
use crate::invariant::{conjoin, Invariant};
use crate::message::{EngineType, InvariantMessage, Message};
use crate::options::SessionOptions;
use crate::outstanding::OutstandingProperties;
use crate::specification::Specification;

pub struct InvariantGenerationEngine<'a, S: SmtSolver> {
    core: EngineCore<'a, S>,
    k: usize,
    candidates: Vec<Invariant>,
    /// Invariants known to hold, assumed while checking candidates.
    proven: IndexSet<Invariant>,
}

/// Bound templates over the state variables of `spec`.
pub fn candidate_invariants(spec: &Specification) -> Vec<Invariant> {
    let mut constants: BTreeSet<i64> = spec.init.int_literals();
    constants.extend(spec.transition.int_literals());
    constants.insert(0);

    let mut candidates = Vec::new();
    for (name, sort) in &spec.state_vars {
        match sort {
            SmtSort::Int => {
                for c in &constants {
                    candidates.push(Invariant::generated(SmtTerm::var(name.clone()).ge(SmtTerm::int(*c))));
                    candidates.push(Invariant::generated(SmtTerm::var(name.clone()).le(SmtTerm::int(*c))));
                }
            }
            SmtSort::Bool => {
                candidates.push(Invariant::generated(SmtTerm::var(name.clone())));
                candidates.push(Invariant::generated(SmtTerm::var(name.clone()).not()));
            }
        }
    }
    candidates
}

impl<'a, S: SmtSolver> InvariantGenerationEngine<'a, S> {
    pub fn new(spec: &'a Specification, director: &'a Director, options: &'a SessionOptions, solver: S) -> Self {
        Self {
            core: EngineCore::new(EngineType::InvariantGeneration, spec, director, options, solver),
            k: 0,
            candidates: candidate_invariants(spec),
            proven: IndexSet::new(),
        }
    }

    /// Drop every candidate refuted on an initial path of `k` states.
    /// Returns `false` when the solver gave up.
    fn prune_base(&mut self, k: usize) -> Result<bool, EngineError> {
        self.core.session.push()?;
        let outcome = self.prune_base_in_scope(k as i64);
        self.core.session.pop()?;
        outcome
    }

    fn prune_base_in_scope(&mut self, k: i64) -> Result<bool, EngineError> {
        let last = k - 1;
        self.core.declare_steps(0, last)?;
        let init = self.core.spec.init_at(0);
        self.core.session.assert(&init)?;
        for step in 1..=last {
            let transition = self.core.spec.transition_at(step);
            self.core.session.assert(&transition)?;
        }

        while !self.candidates.is_empty() {
            let goal = SmtTerm::and((0..=last).map(|step| conjoin(&self.candidates, step)).collect());
            match self.core.query_with_steps(&goal, 0, last)? {
                (QueryResult::Unsat(_), _) => break,
                (QueryResult::Sat, model) => {
                    let model = model.unwrap_or_default();
                    let before = self.candidates.len();
                    let mut kept = Vec::with_capacity(before);
                    for candidate in std::mem::take(&mut self.candidates) {
                        let mut refuted = false;
                        for step in 0..=last {
                            if is_false_in(&candidate.instantiate(step), &model)? {
                                refuted = true;
                                break;
                            }
                        }
                        if !refuted {
                            kept.push(candidate);
                        }
                    }
                    self.candidates = kept;
                    if self.candidates.len() == before {
                        return Err(EngineError::Solver(format!(
                            "base path of length {k} refutes no candidate"
                        )));
                    }
                }
                (QueryResult::Unknown(reason), _) => {
                    warn!(engine = %EngineType::InvariantGeneration, k, %reason, "solver returned unknown, stopping");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Largest `k`-inductive subset of the candidates, or `None` when the
    /// solver gave up.
    fn inductive_subset(&mut self, k: usize) -> Result<Option<Vec<Invariant>>, EngineError> {
        self.core.session.push()?;
        let outcome = self.inductive_subset_in_scope(k as i64);
        self.core.session.pop()?;
        outcome
    }

    fn inductive_subset_in_scope(&mut self, k: i64) -> Result<Option<Vec<Invariant>>, EngineError> {
        self.core.declare_steps(0, k)?;
        for step in 1..=k {
            let transition = self.core.spec.transition_at(step);
            self.core.session.assert(&transition)?;
        }
        for step in 0..k {
            let facts = conjoin(&self.proven, step);
            self.core.session.assert(&facts)?;
        }

        let mut survivors = self.candidates.clone();
        while !survivors.is_empty() {
            let hypothesis = SmtTerm::and((0..k).map(|step| conjoin(&survivors, step)).collect());
            let query = hypothesis.implies(conjoin(&survivors, k));
            match self.core.query_with_steps(&query, k, k)? {
                (QueryResult::Unsat(_), _) => break,
                (QueryResult::Sat, model) => {
                    let model = model.unwrap_or_default();
                    let before = survivors.len();
                    let mut kept = Vec::with_capacity(before);
                    for candidate in survivors {
                        if !is_false_in(&candidate.instantiate(k), &model)? {
                            kept.push(candidate);
                        }
                    }
                    survivors = kept;
                    if survivors.len() == before {
                        return Err(EngineError::Solver(format!(
                            "inductive counterexample at k = {k} refutes no candidate"
                        )));
                    }
                }
                (QueryResult::Unknown(reason), _) => {
                    warn!(engine = %EngineType::InvariantGeneration, k, %reason, "solver returned unknown, stopping");
                    return Ok(None);
                }
            }
        }
        Ok(Some(survivors))
    }
}

impl<S: SmtSolver> Engine for InvariantGenerationEngine<'_, S> {
    fn engine_type(&self) -> EngineType {
        EngineType::InvariantGeneration
    }

    fn outstanding(&self) -> &OutstandingProperties {
        &self.core.outstanding
    }

    fn handle_message(&mut self, message: &Message) -> Result<(), EngineError> {
        match message {
            Message::Invalid(im) => self.core.outstanding.remove_all(&im.properties),
            Message::Unknown(um) => self.core.outstanding.remove_all(&um.properties),
            Message::Valid(vm) => {
                self.core.outstanding.remove_all(&vm.properties);
                self.proven.extend(vm.invariants.iter().cloned());
            }
            Message::Invariant(im) => self.proven.extend(im.invariants.iter().cloned()),
            // Candidates are refuted by this engine's own queries only.
            Message::BaseStep(_) | Message::InductiveCounterexample(_) => {}
        }
        Ok(())
    }

    fn work(&mut self) -> Result<Progress, EngineError> {
        self.k += 1;
        let k = self.k;
        if k > self.core.options.max_k || self.candidates.is_empty() {
            return Ok(Progress::Done);
        }
        if !self.prune_base(k)? {
            return Ok(Progress::Done);
        }
        let Some(invariants) = self.inductive_subset(k)? else {
            return Ok(Progress::Done);
        };
        if invariants.is_empty() {
            debug!(engine = %EngineType::InvariantGeneration, k, candidates = self.candidates.len(), "nothing inductive yet");
            return Ok(Progress::Busy);
        }

        info!(
            engine = %EngineType::InvariantGeneration,
            k,
            invariants = ?invariants.iter().map(Invariant::name).collect::<Vec<_>>(),
            "invariants proven"
        );
        self.candidates.retain(|c| !invariants.contains(c));
        self.proven.extend(invariants.iter().cloned());
        self.core
            .broadcast(Message::Invariant(InvariantMessage { invariants }));
        Ok(Progress::Busy)
    }
}

//! Inductive step of k-induction.
//!
//! At depth `k` the engine checks, from an arbitrary state, that `k`
//! consecutive steps satisfying every candidate property force the candidates
//! at step `k`. Proven invariants, including properties already proven here or
//! elsewhere, are assumed at steps `0..k`, and so are properties whose step has
//! closed but whose base case is still pending. A closed step only becomes a
//! `Valid` verdict once the bounded engine has confirmed the base case up to
//! step `k-1`.

use indexmap::IndexSet;
use kinduct_smt::session::QueryResult;
use kinduct_smt::solver::SmtSolver;
use kinduct_smt::terms::SmtTerm;
use tracing::{debug, info, warn};

use crate::director::Director;
use crate::engine::{Engine, EngineCore, Progress};
use crate::engines::is_false_in;
use crate::error::EngineError;
use crate::invariant::{conjoin, Invariant};
use crate::message::{EngineType, InductiveCounterexampleMessage, Message, ValidMessage};
use crate::options::SessionOptions;
use crate::outstanding::OutstandingProperties;
use crate::specification::Specification;

/// Properties whose inductive step closed at `k`, awaiting the base case.
#[derive(Debug)]
struct Pending {
    k: usize,
    properties: Vec<String>,
    /// Pending properties assumed as lemmas when the step closed.
    lemmas: Vec<String>,
}

pub struct KInductionEngine<'a, S: SmtSolver> {
    core: EngineCore<'a, S>,
    k: usize,
    invariants: IndexSet<Invariant>,
    pending: Vec<Pending>,
    /// Deepest step for which the base case is known to hold.
    base_step: Option<usize>,
    exhausted: bool,
}

impl<'a, S: SmtSolver> KInductionEngine<'a, S> {
    pub fn new(spec: &'a Specification, director: &'a Director, options: &'a SessionOptions, solver: S) -> Self {
        Self {
            core: EngineCore::new(EngineType::KInduction, spec, director, options, solver),
            k: 1,
            invariants: IndexSet::new(),
            pending: Vec::new(),
            base_step: None,
            exhausted: false,
        }
    }

    fn is_pending(&self, name: &str) -> bool {
        self.pending
            .iter()
            .any(|p| p.properties.iter().any(|q| q == name))
    }

    fn pending_properties(&self) -> Vec<String> {
        self.pending
            .iter()
            .flat_map(|p| p.properties.iter().cloned())
            .collect()
    }

    fn property_invariants(&self, names: &[String]) -> Vec<Invariant> {
        names
            .iter()
            .filter_map(|name| self.core.spec.property(name))
            .map(Invariant::from)
            .collect()
    }

    /// Try to close the inductive step at depth `k` for as many candidates as
    /// possible. Returns `None` when the solver gave up.
    fn inductive_step(&mut self, k: usize, lemmas: &[String]) -> Result<Option<Vec<String>>, EngineError> {
        self.core.session.push()?;
        let outcome = self.inductive_step_in_scope(k, lemmas);
        self.core.session.pop()?;
        outcome
    }

    fn inductive_step_in_scope(&mut self, k: usize, lemmas: &[String]) -> Result<Option<Vec<String>>, EngineError> {
        let depth = k as i64;
        self.core.declare_steps(0, depth)?;
        for step in 1..=depth {
            let transition = self.core.spec.transition_at(step);
            self.core.session.assert(&transition)?;
        }
        let mut assumed: Vec<Invariant> = self.invariants.iter().cloned().collect();
        assumed.extend(self.property_invariants(lemmas));
        for step in 0..depth {
            let facts = conjoin(&assumed, step);
            self.core.session.assert(&facts)?;
        }

        let mut candidates: Vec<String> = self
            .core
            .outstanding
            .iter()
            .filter(|name| !self.is_pending(name))
            .map(str::to_string)
            .collect();
        while !candidates.is_empty() {
            let targets = self.property_invariants(&candidates);
            let hypothesis = SmtTerm::and((0..depth).map(|step| conjoin(&targets, step)).collect());
            let query = hypothesis.implies(conjoin(&targets, depth));
            match self.core.query_with_steps(&query, depth, depth)? {
                (QueryResult::Unsat(_), _) => return Ok(Some(candidates)),
                (QueryResult::Sat, model) => {
                    let model = model.unwrap_or_default();
                    let mut falsified = Vec::new();
                    for target in &targets {
                        if is_false_in(&target.instantiate(depth), &model)? {
                            falsified.push(target.name().to_string());
                        }
                    }
                    if falsified.is_empty() {
                        return Err(EngineError::Solver(format!(
                            "inductive counterexample at k = {k} falsifies no candidate"
                        )));
                    }
                    debug!(engine = %EngineType::KInduction, k, properties = ?falsified, "inductive counterexample");
                    candidates.retain(|name| !falsified.contains(name));
                    self.core
                        .broadcast(Message::InductiveCounterexample(InductiveCounterexampleMessage {
                            properties: falsified,
                            k,
                        }));
                }
                (QueryResult::Unknown(reason), _) => {
                    warn!(engine = %EngineType::KInduction, k, %reason, "solver returned unknown, stopping");
                    return Ok(None);
                }
            }
        }
        Ok(Some(candidates))
    }

    /// Turn pending proofs whose base case is now covered into verdicts.
    fn release_pending(&mut self) {
        let Some(base_step) = self.base_step else {
            return;
        };
        let (ready, waiting): (Vec<Pending>, Vec<Pending>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.k <= base_step + 1);
        self.pending = waiting;

        for pending in ready {
            let properties: Vec<String> = pending
                .properties
                .into_iter()
                .filter(|name| self.core.outstanding.contains(name))
                .collect();
            if properties.is_empty() {
                continue;
            }
            let proved = self.property_invariants(&properties);
            let mut invariants = self.invariants.clone();
            invariants.extend(self.property_invariants(&pending.lemmas));
            invariants.extend(proved.iter().cloned());
            info!(engine = %EngineType::KInduction, k = pending.k, properties = ?properties, "proved");
            self.core.outstanding.remove_all(&properties);
            self.core.broadcast(Message::Valid(ValidMessage::new(
                EngineType::KInduction,
                properties,
                pending.k,
                invariants.into_iter().collect(),
            )));
            self.invariants.extend(proved);
        }
    }

    fn forget(&mut self, names: &[String]) {
        self.core.outstanding.remove_all(names);
        for pending in &mut self.pending {
            pending.properties.retain(|name| !names.contains(name));
        }
        self.pending.retain(|p| !p.properties.is_empty());
    }

    /// Like `forget`, for properties that will never be proven. Steps that
    /// leaned on them as lemmas are void; their properties become candidates
    /// again.
    fn refute(&mut self, names: &[String]) {
        self.forget(names);
        let (void, kept): (Vec<Pending>, Vec<Pending>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.lemmas.iter().any(|lemma| names.contains(lemma)));
        self.pending = kept;
        for pending in void {
            debug!(engine = %EngineType::KInduction, k = pending.k, properties = ?pending.properties, "lemma lost, step reopened");
        }
    }
}

impl<S: SmtSolver> Engine for KInductionEngine<'_, S> {
    fn engine_type(&self) -> EngineType {
        EngineType::KInduction
    }

    fn outstanding(&self) -> &OutstandingProperties {
        &self.core.outstanding
    }

    fn handle_message(&mut self, message: &Message) -> Result<(), EngineError> {
        match message {
            Message::BaseStep(bsm) => {
                self.base_step = Some(self.base_step.map_or(bsm.step, |s| s.max(bsm.step)));
                self.release_pending();
            }
            Message::Invalid(im) => self.refute(&im.properties),
            Message::Unknown(um) => self.refute(&um.properties),
            Message::Invariant(im) => {
                self.invariants.extend(im.invariants.iter().cloned());
            }
            Message::Valid(vm) => {
                self.forget(&vm.properties);
                let proved = self.property_invariants(&vm.properties);
                self.invariants.extend(proved);
                self.invariants.extend(vm.invariants.iter().cloned());
            }
            // Only this engine produces inductive counterexamples.
            Message::InductiveCounterexample(_) => {}
        }
        Ok(())
    }

    fn work(&mut self) -> Result<Progress, EngineError> {
        if self.exhausted || self.k > self.core.options.max_k {
            return Ok(if self.pending.is_empty() {
                Progress::Done
            } else {
                Progress::Idle
            });
        }
        let k = self.k;
        let lemmas = self.pending_properties();
        match self.inductive_step(k, &lemmas)? {
            Some(proved) if !proved.is_empty() => {
                debug!(engine = %EngineType::KInduction, k, properties = ?proved, "inductive step closed");
                self.pending.push(Pending {
                    k,
                    properties: proved,
                    lemmas,
                });
                self.release_pending();
            }
            Some(_) => {}
            None => self.exhausted = true,
        }
        self.k += 1;
        Ok(Progress::Busy)
    }
}

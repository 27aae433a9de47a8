//! Reduction of the invariant set backing a `Valid` verdict.
//!
//! Given a property `P` proven with invariants `I`, the engine searches for a
//! locally minimal subset of `I` that still lets `P` close by induction. It
//! keeps an `irreducible` set, seeded with `{P}`, and a depth `k`, and asks
//!
//! ```text
//! (T_0 ∧ … ∧ T_k ∧ irreducible@0 ∧ … ∧ irreducible@(k-1)) ⇒ irreducible@k
//! ```
//!
//! where `T_0 = INIT@0 ∨ TRANSITION@0` and `T_i = TRANSITION@i`. Every member
//! of `I` is available as a labelled fact over steps `0..k-1`. A satisfiable
//! query deepens the search; an unsatisfiable one yields a core of facts,
//! which is shrunk one label at a time and merged into `irreducible` until
//! the core adds nothing new.
//!
//! A solver `unknown` anywhere in this loop is fatal: an unchecked reduced
//! set could make later proofs unsound.

use std::collections::VecDeque;

use indexmap::IndexSet;
use kinduct_smt::session::{Label, QueryResult};
use kinduct_smt::solver::SmtSolver;
use kinduct_smt::terms::SmtTerm;
use tracing::{debug, info};

use crate::director::Director;
use crate::engine::{Engine, EngineCore, Progress};
use crate::error::EngineError;
use crate::invariant::{conjoin, Invariant, Labelling};
use crate::message::{EngineType, Message, ValidMessage};
use crate::options::SessionOptions;
use crate::outstanding::OutstandingProperties;
use crate::specification::Specification;

pub struct InvariantReductionEngine<'a, S: SmtSolver> {
    core: EngineCore<'a, S>,
}

/// Outcome of reducing one property.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub k: usize,
    /// Invariants still needed, excluding the property itself.
    pub invariants: Vec<Invariant>,
}

impl<'a, S: SmtSolver> InvariantReductionEngine<'a, S> {
    pub fn new(spec: &'a Specification, director: &'a Director, options: &'a SessionOptions, solver: S) -> Self {
        Self {
            core: EngineCore::new(EngineType::InvariantReduction, spec, director, options, solver),
        }
    }

    fn degraded(reason: String) -> EngineError {
        EngineError::SolverDegraded {
            engine: EngineType::InvariantReduction,
            reason,
        }
    }

    fn reduce_message(&mut self, vm: &ValidMessage) -> Result<(), EngineError> {
        for property in &vm.properties {
            let target = vm
                .invariants
                .iter()
                .find(|inv| inv.name() == property)
                .ok_or_else(|| {
                    EngineError::ProtocolViolation(format!(
                        "property `{property}` is missing from the invariants of a valid message from {}",
                        vm.source
                    ))
                })?;
            let reduction = self.reduce(target, &vm.invariants)?;
            info!(
                engine = %EngineType::InvariantReduction,
                property = %property,
                k = reduction.k,
                before = vm.invariants.len().saturating_sub(1),
                after = reduction.invariants.len(),
                "reduced invariant set"
            );
            self.core.outstanding.remove(property);
            self.core.broadcast(Message::Valid(ValidMessage::new(
                EngineType::InvariantReduction,
                vec![property.clone()],
                reduction.k,
                reduction.invariants,
            )));
        }
        Ok(())
    }

    /// Reduce `invariants` for `property`, which must be one of them.
    pub fn reduce(&mut self, property: &Invariant, invariants: &[Invariant]) -> Result<Reduction, EngineError> {
        debug!(engine = %EngineType::InvariantReduction, property = %property, "reducing");
        self.core.session.push()?;
        let outcome = self.reduce_in_scope(property, invariants);
        self.core.session.pop()?;
        let (k, mut irreducible) = outcome?;
        irreducible.shift_remove(property);
        Ok(Reduction {
            k,
            invariants: irreducible.into_iter().collect(),
        })
    }

    fn reduce_in_scope(
        &mut self,
        property: &Invariant,
        invariants: &[Invariant],
    ) -> Result<(usize, IndexSet<Invariant>), EngineError> {
        let mut irreducible = IndexSet::from([property.clone()]);
        let mut labelling = Labelling::new();
        let mut k = 0;

        self.core.declare_step(-1)?;
        self.core.declare_step(0)?;
        loop {
            let query = self.induction_query(k, &irreducible);
            match self.core.session.query(&query)? {
                QueryResult::Sat => {
                    k += 1;
                    self.assert_invariants(k - 1, invariants, &mut labelling)?;
                    self.core.declare_step(k as i64)?;
                }
                QueryResult::Unsat(core) => {
                    let core = self.minimize_core(&query, core, &labelling)?;
                    let found: Vec<Invariant> = core
                        .iter()
                        .filter_map(|label| labelling.invariant(*label))
                        .cloned()
                        .collect();
                    if found.iter().all(|inv| irreducible.contains(inv)) {
                        break;
                    }
                    irreducible.extend(found);
                }
                QueryResult::Unknown(reason) => return Err(Self::degraded(reason)),
            }
        }
        Ok((k, irreducible))
    }

    fn induction_query(&self, k: usize, irreducible: &IndexSet<Invariant>) -> SmtTerm {
        let spec = self.core.spec;
        let k = k as i64;
        let mut hypotheses = Vec::new();
        for step in 0..=k {
            if step == 0 {
                hypotheses.push(SmtTerm::or(vec![spec.init_at(0), spec.transition_at(0)]));
            } else {
                hypotheses.push(spec.transition_at(step));
            }
            if step < k {
                hypotheses.push(conjoin(irreducible, step));
            }
        }
        SmtTerm::and(hypotheses).implies(conjoin(irreducible, k))
    }

    /// Assert every invariant over steps `0..=last_step`, replacing its stale
    /// label.
    fn assert_invariants(
        &mut self,
        last_step: usize,
        invariants: &[Invariant],
        labelling: &mut Labelling,
    ) -> Result<(), EngineError> {
        for invariant in invariants {
            if let Some(stale) = labelling.remove_invariant(invariant) {
                self.core.session.retract(stale);
            }
            let label = self
                .core
                .session
                .labelled_assert(&invariant.instantiate_range(0, last_step as i64))?;
            labelling.insert(label, invariant.clone());
        }
        Ok(())
    }

    /// Drop core labels one at a time while the query stays unsatisfiable.
    /// No single label of the result can be removed.
    fn minimize_core(
        &mut self,
        query: &SmtTerm,
        core: Vec<Label>,
        labelling: &Labelling,
    ) -> Result<Vec<Label>, EngineError> {
        self.core.session.push()?;
        let outcome = self.minimize_core_in_scope(query, core, labelling);
        self.core.session.pop()?;
        outcome
    }

    fn minimize_core_in_scope(
        &mut self,
        query: &SmtTerm,
        core: Vec<Label>,
        labelling: &Labelling,
    ) -> Result<Vec<Label>, EngineError> {
        let session = &mut self.core.session;
        for label in labelling.labels() {
            if !core.contains(&label) {
                session.retract(label);
            }
        }

        let mut kept = Vec::with_capacity(core.len());
        let mut remaining: VecDeque<Label> = core.into();
        while let Some(label) = remaining.pop_front() {
            session.push()?;
            session.retract(label);
            let result = session.query(query);
            session.pop()?;
            match result? {
                QueryResult::Unsat(smaller) => {
                    session.retract(label);
                    // Labels outside the new core are redundant as well.
                    for &dropped in remaining.iter().filter(|l| !smaller.contains(*l)) {
                        session.retract(dropped);
                    }
                    remaining.retain(|l| smaller.contains(l));
                }
                QueryResult::Sat => kept.push(label),
                QueryResult::Unknown(reason) => return Err(Self::degraded(reason)),
            }
        }
        Ok(kept)
    }
}

impl<S: SmtSolver> Engine for InvariantReductionEngine<'_, S> {
    fn engine_type(&self) -> EngineType {
        EngineType::InvariantReduction
    }

    fn outstanding(&self) -> &OutstandingProperties {
        &self.core.outstanding
    }

    fn handle_message(&mut self, message: &Message) -> Result<(), EngineError> {
        match message {
            Message::Valid(vm) => {
                if self.core.director.next_responsible(vm) == EngineType::InvariantReduction {
                    self.reduce_message(vm)?;
                } else {
                    self.core.outstanding.remove_all(&vm.properties);
                }
            }
            Message::Invalid(im) => self.core.outstanding.remove_all(&im.properties),
            Message::Unknown(um) => self.core.outstanding.remove_all(&um.properties),
            // Reduction only starts from proofs.
            Message::BaseStep(_) | Message::InductiveCounterexample(_) | Message::Invariant(_) => {}
        }
        Ok(())
    }

    fn work(&mut self) -> Result<Progress, EngineError> {
        Ok(Progress::Idle)
    }
}

//! Bounded model checking: falsifies properties on initial paths and
//! reports the depths at which the base case holds.

use kinduct_smt::session::QueryResult;
use kinduct_smt::solver::SmtSolver;
use kinduct_smt::terms::SmtTerm;
use tracing::{debug, info, warn};

use crate::director::Director;
use crate::engine::{Engine, EngineCore, Progress};
use crate::engines::is_false_in;
use crate::error::EngineError;
use crate::message::{BaseStepMessage, EngineType, InvalidMessage, Message, UnknownMessage};
use crate::options::SessionOptions;
use crate::outstanding::OutstandingProperties;
use crate::result::Counterexample;
use crate::specification::{instantiate, Specification};

pub struct BmcEngine<'a, S: SmtSolver> {
    core: EngineCore<'a, S>,
    /// Next depth to check.
    k: usize,
    initialized: bool,
}

impl<'a, S: SmtSolver> BmcEngine<'a, S> {
    pub fn new(spec: &'a Specification, director: &'a Director, options: &'a SessionOptions, solver: S) -> Self {
        Self {
            core: EngineCore::new(EngineType::Bmc, spec, director, options, solver),
            k: 0,
            initialized: false,
        }
    }

    fn property_term(&self, name: &str, step: i64) -> Option<SmtTerm> {
        self.core
            .spec
            .property(name)
            .map(|p| instantiate(&p.formula, step))
    }

    /// Check every outstanding property at the current depth, reporting
    /// counterexamples until the remaining ones hold.
    fn check_depth(&mut self) -> Result<Progress, EngineError> {
        let k = self.k as i64;
        loop {
            let remaining = self.core.outstanding.to_vec();
            if remaining.is_empty() {
                return Ok(Progress::Busy);
            }
            let goal = SmtTerm::and(
                remaining
                    .iter()
                    .filter_map(|name| self.property_term(name, k))
                    .collect(),
            );
            match self.core.query_with_steps(&goal, 0, k)? {
                (QueryResult::Sat, model) => {
                    let model = model.unwrap_or_default();
                    let mut falsified = Vec::new();
                    for name in &remaining {
                        if let Some(term) = self.property_term(name, k) {
                            if is_false_in(&term, &model)? {
                                falsified.push(name.clone());
                            }
                        }
                    }
                    if falsified.is_empty() {
                        return Err(EngineError::Solver(format!(
                            "bmc model at k = {k} falsifies no property"
                        )));
                    }
                    let counterexample = Counterexample::from_model(&model, &self.core.spec.state_vars, self.k);
                    info!(engine = %EngineType::Bmc, k, properties = ?falsified, "counterexample found");
                    self.core.outstanding.remove_all(&falsified);
                    self.core.broadcast(Message::Invalid(InvalidMessage {
                        source: EngineType::Bmc,
                        properties: falsified,
                        counterexample,
                    }));
                }
                (QueryResult::Unsat(_), _) => {
                    debug!(engine = %EngineType::Bmc, k, "base case holds");
                    self.core.broadcast(Message::BaseStep(BaseStepMessage {
                        step: self.k,
                        properties: remaining,
                    }));
                    self.k += 1;
                    return Ok(Progress::Busy);
                }
                (QueryResult::Unknown(reason), _) => {
                    warn!(engine = %EngineType::Bmc, k, %reason, "solver returned unknown");
                    self.give_up(remaining);
                    return Ok(Progress::Done);
                }
            }
        }
    }

    fn give_up(&mut self, properties: Vec<String>) {
        self.core.outstanding.remove_all(&properties);
        self.core.broadcast(Message::Unknown(UnknownMessage {
            source: EngineType::Bmc,
            properties,
        }));
    }
}

impl<S: SmtSolver> Engine for BmcEngine<'_, S> {
    fn engine_type(&self) -> EngineType {
        EngineType::Bmc
    }

    fn outstanding(&self) -> &OutstandingProperties {
        &self.core.outstanding
    }

    fn handle_message(&mut self, message: &Message) -> Result<(), EngineError> {
        match message {
            Message::Invalid(im) => self.core.outstanding.remove_all(&im.properties),
            Message::Unknown(um) => self.core.outstanding.remove_all(&um.properties),
            Message::Valid(vm) => self.core.outstanding.remove_all(&vm.properties),
            // Nothing in these narrows the search for counterexamples.
            Message::BaseStep(_) | Message::InductiveCounterexample(_) | Message::Invariant(_) => {}
        }
        Ok(())
    }

    fn work(&mut self) -> Result<Progress, EngineError> {
        if !self.initialized {
            self.core.declare_step(0)?;
            let init = self.core.spec.init_at(0);
            self.core.session.assert(&init)?;
            self.initialized = true;
        }
        if self.k > self.core.options.max_k {
            if !self.core.options.k_induction {
                let survivors = self.core.outstanding.to_vec();
                info!(engine = %EngineType::Bmc, max_k = self.core.options.max_k, "bound reached without induction");
                self.give_up(survivors);
            }
            return Ok(Progress::Done);
        }
        if self.k > 0 {
            let k = self.k as i64;
            self.core.declare_step(k)?;
            let transition = self.core.spec.transition_at(k);
            self.core.session.assert(&transition)?;
        }
        self.check_depth()
    }
}

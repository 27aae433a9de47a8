//! Shared engine state and the message/work loop every role runs.

use std::sync::mpsc::TryRecvError;

use kinduct_smt::session::{QueryResult, SolverSession};
use kinduct_smt::solver::{Model, SmtSolver};
use kinduct_smt::terms::SmtTerm;
use tracing::{debug, trace};

use crate::director::{Director, Inbox};
use crate::error::EngineError;
use crate::message::{EngineType, Message};
use crate::options::SessionOptions;
use crate::outstanding::OutstandingProperties;
use crate::specification::Specification;

/// What one unit of role work achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More work is ready; run again after draining the inbox.
    Busy,
    /// Nothing to do until a message arrives.
    Idle,
    /// The role has exhausted its search and stops.
    Done,
}

/// A proof engine role. Implementations must close every solver scope they
/// open before `handle_message` or `work` returns.
pub trait Engine {
    fn engine_type(&self) -> EngineType;

    fn outstanding(&self) -> &OutstandingProperties;

    /// React to one message. Implementations match exhaustively on
    /// [`Message`]; kinds a role does not care about are explicit no-ops.
    fn handle_message(&mut self, message: &Message) -> Result<(), EngineError>;

    fn work(&mut self) -> Result<Progress, EngineError>;
}

/// State every engine carries: its private solver session and outstanding
/// set, plus read-only access to the specification and the director.
pub struct EngineCore<'a, S: SmtSolver> {
    pub engine: EngineType,
    pub spec: &'a Specification,
    pub director: &'a Director,
    pub options: &'a SessionOptions,
    pub outstanding: OutstandingProperties,
    pub session: SolverSession<S>,
}

impl<'a, S: SmtSolver> EngineCore<'a, S> {
    pub fn new(
        engine: EngineType,
        spec: &'a Specification,
        director: &'a Director,
        options: &'a SessionOptions,
        solver: S,
    ) -> Self {
        Self {
            engine,
            spec,
            director,
            options,
            outstanding: OutstandingProperties::new(spec.property_names()),
            session: SolverSession::new(solver),
        }
    }

    /// Declare the state variables of `step` in the current scope.
    pub fn declare_step(&mut self, step: i64) -> Result<(), EngineError> {
        for (name, sort) in self.spec.step_vars(step) {
            self.session.declare(&name, sort)?;
        }
        Ok(())
    }

    /// Declare every step in `from..=to`.
    pub fn declare_steps(&mut self, from: i64, to: i64) -> Result<(), EngineError> {
        for step in from..=to {
            self.declare_step(step)?;
        }
        Ok(())
    }

    /// Query `term`, reading the state variables of steps `from..=to` out of
    /// the counter-model on `Sat`.
    pub fn query_with_steps(
        &mut self,
        term: &SmtTerm,
        from: i64,
        to: i64,
    ) -> Result<(QueryResult, Option<Model>), EngineError> {
        let vars: Vec<_> = (from..=to).flat_map(|step| self.spec.step_vars(step)).collect();
        let refs: Vec<_> = vars.iter().map(|(name, sort)| (name.as_str(), *sort)).collect();
        Ok(self.session.query_with_model(term, &refs)?)
    }

    pub fn broadcast(&self, message: Message) {
        self.director.broadcast(self.engine, message);
    }
}

/// Drive `engine` until its outstanding set is empty, it reports
/// [`Progress::Done`], the session aborts, or its inbox is closed.
pub fn run_engine<E: Engine>(engine: &mut E, inbox: &Inbox, director: &Director) -> Result<(), EngineError> {
    let name = engine.engine_type();
    debug!(engine = %name, "engine started");
    loop {
        loop {
            match inbox.try_recv() {
                Ok(message) => {
                    trace!(engine = %name, kind = message.kind(), "handling message");
                    engine.handle_message(&message)?;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!(engine = %name, "inbox closed");
                    return Ok(());
                }
            }
        }

        if engine.outstanding().is_empty() || director.is_aborted() {
            debug!(engine = %name, aborted = director.is_aborted(), "engine finished");
            return Ok(());
        }

        match engine.work()? {
            Progress::Busy => {}
            Progress::Done => {
                debug!(engine = %name, remaining = engine.outstanding().len(), "search exhausted");
                return Ok(());
            }
            Progress::Idle => match inbox.recv() {
                Ok(message) => engine.handle_message(&message)?,
                Err(_) => {
                    debug!(engine = %name, "inbox closed");
                    return Ok(());
                }
            },
        }
    }
}

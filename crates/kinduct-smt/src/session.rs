//! Incremental solver session with scoped, individually retractable
//! assertions.
//!
//! A labelled assertion `t` is encoded as `act!N => t` for a fresh Boolean
//! `act!N`; queries pass the active labels as assumptions, so the backend's
//! unsat core over assumptions is exactly a core over labels.
//!
//! Scoping rules:
//! - `pop` kills every label created since the matching `push`.
//! - a retraction made while a frame is open is undone when that frame pops.
//! - retracting a dead or already retracted label does nothing.
//! - declarations made inside a frame disappear with it.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::solver::{Model, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Prefix reserved for activation literals.
pub const LABEL_PREFIX: &str = "act!";

/// Handle for one labelled assertion, unique within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u64);

impl Label {
    pub fn id(self) -> u64 {
        self.0
    }

    fn symbol(self) -> String {
        format!("{LABEL_PREFIX}{}", self.0)
    }

    fn from_symbol(name: &str) -> Option<Label> {
        name.strip_prefix(LABEL_PREFIX)?.parse().ok().map(Label)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{LABEL_PREFIX}{}", self.0)
    }
}

/// Outcome of [`SolverSession::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// The negated query is satisfiable: the implication does not hold.
    Sat,
    /// The implication holds; the labels form an unsat core.
    Unsat(Vec<Label>),
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum SessionError<E: std::error::Error + 'static> {
    #[error("solver backend error: {0}")]
    Backend(#[from] E),
    #[error("pop without matching push")]
    ScopeUnderflow,
    #[error("variable `{0}` redeclared with a different sort")]
    SortConflict(String),
}

#[derive(Debug, Default)]
struct Frame {
    labels: Vec<Label>,
    retracted: Vec<Label>,
    declared: Vec<String>,
}

pub struct SolverSession<S: SmtSolver> {
    solver: S,
    next_label: u64,
    frames: Vec<Frame>,
    live: BTreeSet<Label>,
    active: BTreeSet<Label>,
    declared: HashMap<String, SmtSort>,
}

impl<S: SmtSolver> SolverSession<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            next_label: 0,
            frames: vec![Frame::default()],
            live: BTreeSet::new(),
            active: BTreeSet::new(),
            declared: HashMap::new(),
        }
    }

    /// Number of currently open `push` scopes.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    fn top(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Declare `name` unless it is already visible with the same sort.
    pub fn declare(&mut self, name: &str, sort: SmtSort) -> Result<(), SessionError<S::Error>> {
        match self.declared.get(name) {
            Some(existing) if *existing == sort => return Ok(()),
            Some(_) => return Err(SessionError::SortConflict(name.to_string())),
            None => {}
        }
        self.solver.declare_var(name, &sort)?;
        self.declared.insert(name.to_string(), sort);
        self.top().declared.push(name.to_string());
        Ok(())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    /// Assert `term` permanently for the current scope.
    pub fn assert(&mut self, term: &SmtTerm) -> Result<(), SessionError<S::Error>> {
        self.solver.assert(term)?;
        Ok(())
    }

    pub fn labelled_assert(&mut self, term: &SmtTerm) -> Result<Label, SessionError<S::Error>> {
        let label = Label(self.next_label);
        self.next_label += 1;
        let symbol = label.symbol();
        self.declare(&symbol, SmtSort::Bool)?;
        self.solver
            .assert(&SmtTerm::var(symbol).implies(term.clone()))?;
        self.live.insert(label);
        self.active.insert(label);
        self.top().labels.push(label);
        trace!(%label, depth = self.depth(), "labelled assert");
        Ok(label)
    }

    /// Disable `label` until the current scope is popped. No-op for labels
    /// that are dead or already retracted.
    pub fn retract(&mut self, label: Label) {
        if self.active.remove(&label) {
            self.top().retracted.push(label);
            trace!(%label, depth = self.depth(), "retract");
        }
    }

    pub fn push(&mut self) -> Result<(), SessionError<S::Error>> {
        self.solver.push()?;
        self.frames.push(Frame::default());
        Ok(())
    }

    pub fn pop(&mut self) -> Result<(), SessionError<S::Error>> {
        if self.frames.len() <= 1 {
            return Err(SessionError::ScopeUnderflow);
        }
        self.solver.pop()?;
        let Some(frame) = self.frames.pop() else {
            return Err(SessionError::ScopeUnderflow);
        };
        for label in &frame.labels {
            self.live.remove(label);
            self.active.remove(label);
        }
        for label in frame.retracted {
            if self.live.contains(&label) {
                self.active.insert(label);
            }
        }
        for name in &frame.declared {
            self.declared.remove(name);
        }
        Ok(())
    }

    pub fn is_live(&self, label: Label) -> bool {
        self.live.contains(&label)
    }

    pub fn is_active(&self, label: Label) -> bool {
        self.active.contains(&label)
    }

    /// Active labels in creation order.
    pub fn active_labels(&self) -> Vec<Label> {
        self.active.iter().copied().collect()
    }

    /// Check whether `term` follows from the current assertions and active
    /// labels.
    pub fn query(&mut self, term: &SmtTerm) -> Result<QueryResult, SessionError<S::Error>> {
        let (result, _) = self.query_inner(term, None)?;
        Ok(result)
    }

    /// Like [`SolverSession::query`], additionally extracting the values of
    /// `vars` from the counter-model when the result is `Sat`.
    pub fn query_with_model(
        &mut self,
        term: &SmtTerm,
        vars: &[(&str, SmtSort)],
    ) -> Result<(QueryResult, Option<Model>), SessionError<S::Error>> {
        self.query_inner(term, Some(vars))
    }

    fn query_inner(
        &mut self,
        term: &SmtTerm,
        vars: Option<&[(&str, SmtSort)]>,
    ) -> Result<(QueryResult, Option<Model>), SessionError<S::Error>> {
        self.solver.push()?;
        let outcome = self.check_negated(term, vars);
        self.solver.pop()?;
        outcome
    }

    fn check_negated(
        &mut self,
        term: &SmtTerm,
        vars: Option<&[(&str, SmtSort)]>,
    ) -> Result<(QueryResult, Option<Model>), SessionError<S::Error>> {
        self.solver.assert(&term.clone().not())?;
        let assumptions: Vec<String> = self.active.iter().map(|l| l.symbol()).collect();
        match self.solver.check_sat_assuming(&assumptions)? {
            SatResult::Sat => {
                let model = match vars {
                    Some(vars) => Some(self.solver.get_model(vars)?),
                    None => None,
                };
                Ok((QueryResult::Sat, model))
            }
            SatResult::Unsat => {
                let core = self
                    .solver
                    .get_unsat_core_assumptions()?
                    .iter()
                    .filter_map(|name| Label::from_symbol(name))
                    .filter(|label| self.active.contains(label))
                    .collect();
                Ok((QueryResult::Unsat(core), None))
            }
            SatResult::Unknown(reason) => Ok((QueryResult::Unknown(reason), None)),
        }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn into_inner(self) -> S {
        self.solver
    }
}

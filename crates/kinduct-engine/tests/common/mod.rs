#![allow(dead_code)]

use std::sync::Arc;

use kinduct_engine::engine::Engine;
use kinduct_engine::error::EngineError;
use kinduct_engine::invariant::{conjoin, Invariant};
use kinduct_engine::message::{EngineType, Message};
use kinduct_engine::{RunError, Session, SessionOptions, SessionReport, SolverChoice, Specification};
use kinduct_smt::backends::bounded::BoundedSolver;
use kinduct_smt::solver::{Model, SatResult, SmtSolver};
use kinduct_smt::sorts::SmtSort;
use kinduct_smt::terms::SmtTerm;

fn x() -> SmtTerm {
    SmtTerm::var("x")
}

fn pre_x() -> SmtTerm {
    SmtTerm::pre("x")
}

/// `x` starts at 3 and counts down to 0, where it stays.
pub fn counter() -> Specification {
    Specification::new(
        vec![("x".into(), SmtSort::Int)],
        x().eq(SmtTerm::int(3)),
        x().eq(SmtTerm::ite(
            pre_x().eq(SmtTerm::int(0)),
            SmtTerm::int(0),
            pre_x().sub(SmtTerm::int(1)),
        )),
    )
    .with_property("nonneg", x().ge(SmtTerm::int(0)))
}

/// `x` cycles through `0..=10`. Negative values climb back towards zero,
/// except `-1`, which jumps to 20. `nonneg` is inductive on its own;
/// `bounded` only closes once `nonneg` rules out the jump.
pub fn dependent() -> Specification {
    Specification::new(
        vec![("x".into(), SmtSort::Int)],
        x().eq(SmtTerm::int(0)),
        x().eq(SmtTerm::ite(
            pre_x().lt(SmtTerm::int(0)),
            SmtTerm::ite(
                pre_x().eq(SmtTerm::int(-1)),
                SmtTerm::int(20),
                pre_x().add(SmtTerm::int(1)),
            ),
            SmtTerm::ite(
                pre_x().ge(SmtTerm::int(10)),
                SmtTerm::int(0),
                pre_x().add(SmtTerm::int(1)),
            ),
        )),
    )
    .with_property("nonneg", x().ge(SmtTerm::int(0)))
    .with_property("bounded", x().le(SmtTerm::int(10)))
}

/// `x` counts up from 0; `small` fails at step 4.
pub fn runaway() -> Specification {
    Specification::new(
        vec![("x".into(), SmtSort::Int)],
        x().eq(SmtTerm::int(0)),
        x().eq(pre_x().add(SmtTerm::int(1))),
    )
    .with_property("small", x().le(SmtTerm::int(3)))
    .with_property("nonneg", x().ge(SmtTerm::int(0)))
}

/// `x` cycles through `0..=10`. `11` and `12` lead to `30`, and negative
/// values climb to `-1`, which also jumps to `30`. `nonneg` closes at depth
/// one; `le12` needs `nonneg` as a lemma and closes at depth three.
pub fn detour() -> Specification {
    Specification::new(
        vec![("x".into(), SmtSort::Int)],
        x().eq(SmtTerm::int(0)),
        x().eq(SmtTerm::ite(
            pre_x().eq(SmtTerm::int(10)),
            SmtTerm::int(0),
            SmtTerm::ite(
                SmtTerm::or(vec![pre_x().eq(SmtTerm::int(12)), pre_x().eq(SmtTerm::int(-1))]),
                SmtTerm::int(30),
                pre_x().add(SmtTerm::int(1)),
            ),
        )),
    )
    .with_property("nonneg", x().ge(SmtTerm::int(0)))
    .with_property("le12", x().le(SmtTerm::int(12)))
}

/// `x` counts up from 0 forever; `le40` first fails at step 41.
pub fn climb() -> Specification {
    Specification::new(
        vec![("x".into(), SmtSort::Int)],
        x().eq(SmtTerm::int(0)),
        x().eq(pre_x().add(SmtTerm::int(1))),
    )
    .with_property("le40", x().le(SmtTerm::int(40)))
}

pub fn options() -> SessionOptions {
    SessionOptions {
        solver: SolverChoice::Bounded,
        max_k: 5,
        ..SessionOptions::default()
    }
}

pub fn run(spec: &Specification, options: &SessionOptions) -> (SessionReport, Vec<Arc<Message>>) {
    Session::new(spec, options)
        .run_with_history(|| {
            Ok(BoundedSolver::with_domain(
                options.bounded_domain.clone(),
                options.bounded_budget,
            ))
        })
        .unwrap_or_else(|e| panic!("session failed: {e}"))
}

pub fn run_err(spec: &Specification, options: &SessionOptions) -> RunError {
    match Session::new(spec, options).run(|| Ok(UnknownOnAssumptions(BoundedSolver::new()))) {
        Ok(report) => panic!("expected the session to fail, got:\n{report}"),
        Err(err) => err,
    }
}

/// Valid messages sent by `source` for `property`, in delivery order.
pub fn valid_messages<'a>(
    history: &'a [Arc<Message>],
    source: EngineType,
    property: &'a str,
) -> impl Iterator<Item = &'a kinduct_engine::message::ValidMessage> + 'a {
    history.iter().filter_map(move |m| match m.as_ref() {
        Message::Valid(vm) if vm.source == source && vm.properties.iter().any(|p| p == property) => Some(vm),
        _ => None,
    })
}

/// Bounded backend that gives up on every check made under assumptions,
/// i.e. on every query involving labelled facts.
pub struct UnknownOnAssumptions(pub BoundedSolver);

impl SmtSolver for UnknownOnAssumptions {
    type Error = <BoundedSolver as SmtSolver>::Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error> {
        self.0.declare_var(name, sort)
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error> {
        self.0.assert(term)
    }

    fn push(&mut self) -> Result<(), Self::Error> {
        self.0.push()
    }

    fn pop(&mut self) -> Result<(), Self::Error> {
        self.0.pop()
    }

    fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
        self.0.check_sat()
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Self::Error> {
        if assumptions.is_empty() {
            self.0.check_sat_assuming(assumptions)
        } else {
            Ok(SatResult::Unknown("refusing assumptions".into()))
        }
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, Self::Error> {
        self.0.get_unsat_core_assumptions()
    }

    fn get_model(&mut self, var_names: &[(&str, SmtSort)]) -> Result<Model, Self::Error> {
        self.0.get_model(var_names)
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.0.reset()
    }
}

/// Bounded backend whose unsat cores are shrunk by deletion until no
/// assumption can be dropped.
pub struct MinimalCores(pub BoundedSolver);

impl SmtSolver for MinimalCores {
    type Error = <BoundedSolver as SmtSolver>::Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error> {
        self.0.declare_var(name, sort)
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error> {
        self.0.assert(term)
    }

    fn push(&mut self) -> Result<(), Self::Error> {
        self.0.push()
    }

    fn pop(&mut self) -> Result<(), Self::Error> {
        self.0.pop()
    }

    fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
        self.0.check_sat()
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Self::Error> {
        self.0.check_sat_assuming(assumptions)
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, Self::Error> {
        let mut core = self.0.get_unsat_core_assumptions()?;
        let mut i = 0;
        while i < core.len() {
            let mut without = core.clone();
            without.remove(i);
            if self.0.check_sat_assuming(&without)? == SatResult::Unsat {
                core = without;
            } else {
                i += 1;
            }
        }
        Ok(core)
    }

    fn get_model(&mut self, var_names: &[(&str, SmtSort)]) -> Result<Model, Self::Error> {
        self.0.get_model(var_names)
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.0.reset()
    }
}

/// Whether `premises ⇒ goal` holds over the state variables of `steps`,
/// checked with a fresh solver.
fn entails(spec: &Specification, steps: std::ops::RangeInclusive<i64>, premises: Vec<SmtTerm>, goal: SmtTerm) -> bool {
    let mut solver = BoundedSolver::new();
    for step in steps {
        for (name, sort) in spec.step_vars(step) {
            solver.declare_var(&name, &sort).expect("declare");
        }
    }
    for premise in &premises {
        solver.assert(premise).expect("assert premise");
    }
    solver.assert(&goal.not()).expect("assert goal");
    match solver.check_sat().expect("check") {
        SatResult::Unsat => true,
        SatResult::Sat => false,
        SatResult::Unknown(reason) => panic!("independent check gave up: {reason}"),
    }
}

/// The k-induction query for `set` at depth `k`, with step 0 either initial
/// or reached from an arbitrary predecessor.
pub fn step_closes(spec: &Specification, set: &[Invariant], k: usize) -> bool {
    let k = k as i64;
    let mut premises = vec![SmtTerm::or(vec![spec.init_at(0), spec.transition_at(0)])];
    for step in 1..=k {
        premises.push(spec.transition_at(step));
    }
    for step in 0..k {
        premises.push(conjoin(set, step));
    }
    entails(spec, -1..=k, premises, conjoin(set, k))
}

/// Re-check a reported proof of `property` at depth `k` with `invariants`:
/// the base case on initial paths of `k` states and the inductive step.
pub fn independently_valid(spec: &Specification, property: &str, k: usize, invariants: &[Invariant]) -> bool {
    let prop = spec.property(property).expect("known property");
    let mut set = vec![Invariant::from(prop)];
    set.extend(invariants.iter().cloned());

    for last in 0..k as i64 {
        let mut premises = vec![spec.init_at(0)];
        for step in 1..=last {
            premises.push(spec.transition_at(step));
        }
        if !entails(spec, 0..=last, premises, conjoin(&set, last)) {
            return false;
        }
    }
    step_closes(spec, &set, k)
}

/// Feed one message to an engine the way its run loop would.
pub fn deliver<E: Engine>(engine: &mut E, message: Message) -> Result<(), EngineError> {
    engine.handle_message(&message)
}

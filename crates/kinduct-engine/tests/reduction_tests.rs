mod common;

use common::*;
use kinduct_engine::director::Director;
use kinduct_engine::engine::Engine;
use kinduct_engine::engines::InvariantReductionEngine;
use kinduct_engine::error::{EngineError, RunError};
use kinduct_engine::invariant::Invariant;
use kinduct_engine::message::{EngineType, Message, ValidMessage};
use kinduct_engine::{PropertyResult, SessionOptions, Specification};
use kinduct_smt::backends::bounded::BoundedSolver;
use kinduct_smt::terms::SmtTerm;

fn property(spec: &Specification, name: &str) -> Invariant {
    Invariant::from(spec.property(name).expect("known property"))
}

fn reduction_engine<'a>(
    spec: &'a Specification,
    director: &'a Director,
    options: &'a SessionOptions,
    solver: BoundedSolver,
) -> InvariantReductionEngine<'a, BoundedSolver> {
    InvariantReductionEngine::new(spec, director, options, solver)
}

#[test]
fn counter_reduces_to_empty_set_at_depth_one() {
    let spec = counter();
    let options = options();
    let director = Director::new(spec.property_names(), vec![]);
    let mut engine = reduction_engine(&spec, &director, &options, BoundedSolver::new());

    let nonneg = property(&spec, "nonneg");
    let helper = Invariant::generated(SmtTerm::var("x").le(SmtTerm::int(3)));
    let reduction = engine
        .reduce(&nonneg, &[nonneg.clone(), helper])
        .expect("reduction succeeds");

    assert_eq!(reduction.k, 1);
    assert!(reduction.invariants.is_empty());
}

#[test]
fn dependent_property_keeps_its_support_and_drops_itself() {
    let spec = dependent();
    let options = options();
    let director = Director::new(spec.property_names(), vec![]);
    let mut engine = reduction_engine(&spec, &director, &options, BoundedSolver::new());

    let nonneg = property(&spec, "nonneg");
    let bounded = property(&spec, "bounded");
    let all = vec![nonneg.clone(), bounded.clone()];

    let for_bounded = engine.reduce(&bounded, &all).expect("reduce bounded");
    assert_eq!(for_bounded.invariants, vec![nonneg.clone()]);
    assert!(!for_bounded.invariants.contains(&bounded));

    let for_nonneg = engine.reduce(&nonneg, &all).expect("reduce nonneg");
    assert!(for_nonneg.invariants.is_empty());
}

#[test]
fn reduced_sets_survive_independent_reverification() {
    let spec = dependent();
    let options = options();
    let director = Director::new(spec.property_names(), vec![]);
    let mut engine = reduction_engine(&spec, &director, &options, BoundedSolver::new());
    let all = vec![property(&spec, "nonneg"), property(&spec, "bounded")];

    for name in ["nonneg", "bounded"] {
        let reduction = engine.reduce(&property(&spec, name), &all).expect("reduce");
        assert!(
            independently_valid(&spec, name, reduction.k, &reduction.invariants),
            "{name} at k = {} with {:?} does not re-verify",
            reduction.k,
            reduction.invariants
        );
    }
}

#[test]
fn no_member_of_a_reduced_set_is_redundant() {
    let spec = dependent();
    let options = options();
    let director = Director::new(spec.property_names(), vec![]);
    let mut engine = reduction_engine(&spec, &director, &options, BoundedSolver::new());

    let bounded = property(&spec, "bounded");
    let redundant = Invariant::generated(SmtTerm::var("x").le(SmtTerm::int(20)));
    let all = vec![property(&spec, "nonneg"), bounded.clone(), redundant];
    let reduction = engine.reduce(&bounded, &all).expect("reduce");

    for dropped in 0..reduction.invariants.len() {
        let mut set = vec![bounded.clone()];
        set.extend(
            reduction
                .invariants
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != dropped)
                .map(|(_, inv)| inv.clone()),
        );
        assert!(
            !step_closes(&spec, &set, reduction.k),
            "{} is redundant",
            reduction.invariants[dropped]
        );
    }
}

#[test]
fn solver_unknown_during_reduction_is_fatal() {
    let spec = counter();
    let options = options();
    let director = Director::new(spec.property_names(), vec![]);
    let mut engine = reduction_engine(&spec, &director, &options, BoundedSolver::with_domain(-32..=32, 10));

    let nonneg = property(&spec, "nonneg");
    match engine.reduce(&nonneg, &[nonneg.clone()]) {
        Err(EngineError::SolverDegraded { engine, .. }) => {
            assert_eq!(engine, EngineType::InvariantReduction);
        }
        other => panic!("expected a degraded solver, got {other:?}"),
    }
}

#[test]
fn valid_without_its_own_property_is_a_protocol_violation() {
    let spec = counter();
    let options = options();
    let director = Director::new(spec.property_names(), vec![EngineType::InvariantReduction]);
    let mut engine = reduction_engine(&spec, &director, &options, BoundedSolver::new());

    let unrelated = Invariant::generated(SmtTerm::var("x").le(SmtTerm::int(3)));
    let message = Message::Valid(ValidMessage::new(
        EngineType::KInduction,
        vec!["nonneg".into()],
        1,
        vec![unrelated],
    ));
    assert!(matches!(
        deliver(&mut engine, message),
        Err(EngineError::ProtocolViolation(_))
    ));
}

#[test]
fn valid_for_another_role_only_retires_the_property() {
    let spec = counter();
    let options = options();
    let director = Director::new(spec.property_names(), vec![]);
    let mut engine = reduction_engine(&spec, &director, &options, BoundedSolver::new());

    // With an empty itinerary the director finalizes every Valid, so a
    // missing property invariant must not even be looked at.
    let message = Message::Valid(ValidMessage::new(EngineType::KInduction, vec!["nonneg".into()], 1, vec![]));
    deliver(&mut engine, message).expect("ignored");

    assert!(engine.outstanding().is_empty());
    assert!(director.history().is_empty());
}

#[test]
fn session_reports_reduced_sets_and_reduces_each_property_once() {
    let spec = dependent();
    let options = SessionOptions {
        invariant_generation: false,
        ..options()
    };
    let (report, history) = run(&spec, &options);

    match report.get("bounded") {
        Some(PropertyResult::Valid { k, invariants }) => {
            let names: Vec<&str> = invariants.iter().map(Invariant::name).collect();
            assert_eq!(names, vec!["nonneg"]);
            assert!(independently_valid(&spec, "bounded", *k, invariants));
        }
        other => panic!("bounded: expected valid, got {other:?}"),
    }
    match report.get("nonneg") {
        Some(PropertyResult::Valid { invariants, .. }) => assert!(invariants.is_empty()),
        other => panic!("nonneg: expected valid, got {other:?}"),
    }

    for name in ["nonneg", "bounded"] {
        assert_eq!(
            valid_messages(&history, EngineType::InvariantReduction, name).count(),
            1,
            "{name} must be reduced exactly once"
        );
        for vm in valid_messages(&history, EngineType::InvariantReduction, name) {
            assert_eq!(vm.round, 1);
        }
    }
}

#[test]
fn precise_cores_reach_the_same_reduced_set() {
    let spec = dependent();
    let options = options();
    let director = Director::new(spec.property_names(), vec![]);
    let mut engine = InvariantReductionEngine::new(&spec, &director, &options, MinimalCores(BoundedSolver::new()));

    let nonneg = property(&spec, "nonneg");
    let bounded = property(&spec, "bounded");
    let loose = Invariant::generated(SmtTerm::var("x").le(SmtTerm::int(20)));
    let reduction = engine
        .reduce(&bounded, &[loose, nonneg.clone(), bounded.clone()])
        .expect("reduce bounded");

    assert_eq!(reduction.k, 1);
    assert_eq!(reduction.invariants, vec![nonneg]);
}

#[test]
fn property_closing_deeper_than_its_support_is_proven_with_it() {
    let spec = detour();
    let options = SessionOptions {
        invariant_generation: false,
        ..options()
    };
    let (report, history) = run(&spec, &options);
    let nonneg = property(&spec, "nonneg");

    match report.get("nonneg") {
        Some(PropertyResult::Valid { k, invariants }) => {
            assert_eq!(*k, 1);
            assert!(invariants.is_empty());
        }
        other => panic!("nonneg: expected valid, got {other:?}"),
    }

    let step = valid_messages(&history, EngineType::KInduction, "le12")
        .next()
        .expect("k-induction proves le12");
    assert_eq!(step.k, 3);
    assert!(step.invariants.contains(&nonneg));

    // Step 0 of the reduction query starts from an initial state or a
    // successor, and 11 is neither, so the reduced proof is one step shorter.
    match report.get("le12") {
        Some(PropertyResult::Valid { k, invariants }) => {
            assert_eq!(*k, 2);
            assert_eq!(invariants, &vec![nonneg]);
            assert!(independently_valid(&spec, "le12", *k, invariants));
        }
        other => panic!("le12: expected valid, got {other:?}"),
    }
}

#[test]
fn reduction_failure_aborts_the_whole_session() {
    let spec = counter();
    let options = SessionOptions {
        invariant_generation: false,
        ..options()
    };
    match run_err(&spec, &options) {
        RunError::Fatal(EngineError::SolverDegraded { engine, .. }) => {
            assert_eq!(engine, EngineType::InvariantReduction);
        }
        other => panic!("expected a fatal degraded solver, got {other:?}"),
    }
}

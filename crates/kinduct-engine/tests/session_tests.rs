mod common;

use common::*;
use kinduct_engine::message::{EngineType, Message};
use kinduct_engine::{verify, PropertyResult, RunError, SessionOptions, SolverChoice, Specification, SpecificationError};
use kinduct_smt::solver::ModelValue;
use kinduct_smt::sorts::SmtSort;
use kinduct_smt::terms::SmtTerm;
use proptest::prelude::*;

#[test]
fn counter_is_valid_through_verify() {
    let spec = counter();
    let report = verify(&spec, &options()).expect("session succeeds");

    match report.get("nonneg") {
        Some(PropertyResult::Valid { k, invariants }) => {
            assert!(*k <= 1, "k = {k}");
            assert!(invariants.len() <= 1, "{invariants:?}");
            assert!(independently_valid(&spec, "nonneg", *k, invariants));
        }
        other => panic!("expected valid, got {other:?}"),
    }
    assert!(report.all_valid());
}

#[test]
fn runaway_counter_is_refuted_with_a_trace() {
    let spec = runaway();
    let (report, history) = run(&spec, &options());

    match report.get("small") {
        Some(PropertyResult::Invalid { counterexample }) => {
            let xs: Vec<ModelValue> = counterexample.steps.iter().map(|state| state["x"]).collect();
            assert_eq!(xs, (0..=4).map(ModelValue::Int).collect::<Vec<_>>());
            assert_eq!(counterexample.length(), 4);
        }
        other => panic!("expected invalid, got {other:?}"),
    }
    assert!(report.get("nonneg").is_some_and(PropertyResult::is_valid));

    let refuted_at = history
        .iter()
        .position(|m| matches!(m.as_ref(), Message::Invalid(im) if im.properties.iter().any(|p| p == "small")))
        .expect("invalid message in history");
    for message in &history[refuted_at + 1..] {
        if let Message::Valid(vm) = message.as_ref() {
            assert!(!vm.properties.iter().any(|p| p == "small"), "small proven after refutation");
        }
    }
}

#[test]
fn bounded_backend_does_not_prove_a_bound_broken_past_its_domain() {
    let spec = climb();
    let (report, _) = run(&spec, &options());

    assert_eq!(report.get("le40"), Some(&PropertyResult::Unknown));
}

#[test]
fn bounded_search_alone_cannot_prove() {
    let spec = runaway();
    let options = SessionOptions {
        k_induction: false,
        ..options()
    };
    let (report, history) = run(&spec, &options);

    assert!(report.get("small").is_some_and(PropertyResult::is_invalid));
    assert_eq!(report.get("nonneg"), Some(&PropertyResult::Unknown));
    assert!(history
        .iter()
        .all(|m| !matches!(m.as_ref(), Message::Valid(_) | Message::Invariant(_))));
}

#[test]
fn without_reduction_the_inductive_verdict_is_final() {
    let spec = dependent();
    let options = SessionOptions {
        reduce_invariants: false,
        invariant_generation: false,
        ..options()
    };
    let (report, history) = run(&spec, &options);

    assert!(report.all_valid());
    assert!(history.iter().all(|m| match m.as_ref() {
        Message::Valid(vm) => vm.source == EngineType::KInduction && vm.round == 0,
        _ => true,
    }));
    match report.get("bounded") {
        Some(PropertyResult::Valid { invariants, .. }) => {
            assert!(invariants.iter().all(|inv| inv.name() != "bounded"));
        }
        other => panic!("expected valid, got {other:?}"),
    }
}

#[test]
fn counter_is_valid_alongside_invariant_generation() {
    let spec = counter();
    let options = SessionOptions {
        reduce_invariants: false,
        ..options()
    };
    let (report, history) = run(&spec, &options);
    assert!(report.all_valid());

    let generated: Vec<&str> = history
        .iter()
        .filter_map(|m| match m.as_ref() {
            Message::Invariant(im) => Some(im.invariants.iter().map(|inv| inv.name())),
            _ => None,
        })
        .flatten()
        .collect();
    assert!(!generated.contains(&"(<= x 0)"), "{generated:?}");
}

#[test]
fn invalid_specification_is_rejected_before_any_engine_runs() {
    let spec = Specification::new(
        vec![("x".into(), SmtSort::Int)],
        SmtTerm::var("x").eq(SmtTerm::int(0)),
        SmtTerm::var("x").eq(SmtTerm::pre("x")),
    )
    .with_property("ghost", SmtTerm::var("y").ge(SmtTerm::int(0)));

    match verify(&spec, &options()) {
        Err(RunError::Specification(SpecificationError::UnknownVariable { name, .. })) => assert_eq!(name, "y"),
        other => panic!("expected a specification error, got {other:?}"),
    }
}

#[test]
fn report_serializes_verdicts_and_invariants() {
    let spec = dependent();
    let options = SessionOptions {
        invariant_generation: false,
        solver: SolverChoice::Bounded,
        ..options()
    };
    let report = verify(&spec, &options).expect("session succeeds");
    let json = serde_json::to_value(&report).expect("serializable");

    let bounded = &json["properties"]["bounded"];
    assert_eq!(bounded["result"], "valid");
    assert_eq!(bounded["k"], 1);
    assert_eq!(
        bounded["invariants"],
        serde_json::json!([{ "name": "nonneg", "formula": "(>= x 0)" }])
    );
    assert_eq!(json["properties"]["nonneg"]["invariants"], serde_json::json!([]));
}

#[test]
fn counterexample_serializes_as_states() {
    let spec = runaway();
    let (report, _) = run(&spec, &options());
    let json = serde_json::to_value(&report).expect("serializable");

    let small = &json["properties"]["small"];
    assert_eq!(small["result"], "invalid");
    assert_eq!(small["counterexample"]["steps"][4], serde_json::json!({ "x": 4 }));
}

fn counter_from(start: i64) -> Specification {
    let x = || SmtTerm::var("x");
    let pre_x = || SmtTerm::pre("x");
    Specification::new(
        vec![("x".into(), SmtSort::Int)],
        x().eq(SmtTerm::int(start)),
        x().eq(SmtTerm::ite(
            pre_x().le(SmtTerm::int(0)),
            SmtTerm::int(0),
            pre_x().sub(SmtTerm::int(1)),
        )),
    )
    .with_property("nonneg", x().ge(SmtTerm::int(0)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn countdown_verdicts_reverify(start in 0i64..=8) {
        let spec = counter_from(start);
        let (report, _) = run(&spec, &options());
        match report.get("nonneg") {
            Some(PropertyResult::Valid { k, invariants }) => {
                prop_assert!(independently_valid(&spec, "nonneg", *k, invariants));
            }
            other => prop_assert!(false, "expected valid, got {:?}", other),
        }
    }
}

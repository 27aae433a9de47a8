//! Randomized checks of label and scope bookkeeping in `SolverSession`.
//!
//! Each case replays a random sequence of push/pop/assert/retract against
//! both the session and a plain reference model, then checks that the
//! session's active labels and query verdicts agree with the model.

use std::collections::BTreeSet;

use kinduct_smt::backends::bounded::BoundedSolver;
use kinduct_smt::session::{Label, QueryResult, SessionError, SolverSession};
use kinduct_smt::sorts::SmtSort;
use kinduct_smt::terms::SmtTerm;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

#[derive(Debug, Clone, Copy)]
enum Bound {
    AtLeast(i64),
    AtMost(i64),
}

impl Bound {
    fn term(self) -> SmtTerm {
        match self {
            Bound::AtLeast(c) => SmtTerm::var("x").ge(SmtTerm::int(c)),
            Bound::AtMost(c) => SmtTerm::var("x").le(SmtTerm::int(c)),
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Push,
    Pop,
    Assert(Bound),
    Retract(usize),
    Query,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Push),
        2 => Just(Op::Pop),
        3 => (-4i64..=4).prop_map(|c| Op::Assert(Bound::AtLeast(c))),
        3 => (-4i64..=4).prop_map(|c| Op::Assert(Bound::AtMost(c))),
        3 => (0usize..16).prop_map(Op::Retract),
        2 => Just(Op::Query),
    ]
}

#[derive(Default)]
struct ModelFrame {
    created: Vec<usize>,
    retracted: Vec<usize>,
}

/// Reference bookkeeping indexed by creation order.
struct Reference {
    bounds: Vec<Bound>,
    frames: Vec<ModelFrame>,
    live: BTreeSet<usize>,
    active: BTreeSet<usize>,
}

impl Reference {
    fn new() -> Self {
        Self {
            bounds: Vec::new(),
            frames: vec![ModelFrame::default()],
            live: BTreeSet::new(),
            active: BTreeSet::new(),
        }
    }

    fn top(&mut self) -> &mut ModelFrame {
        self.frames.last_mut().expect("base frame is never popped")
    }

    fn assert(&mut self, bound: Bound) -> usize {
        let idx = self.bounds.len();
        self.bounds.push(bound);
        self.live.insert(idx);
        self.active.insert(idx);
        self.top().created.push(idx);
        idx
    }

    fn retract(&mut self, idx: usize) {
        if self.active.remove(&idx) {
            self.top().retracted.push(idx);
        }
    }

    fn pop(&mut self) -> bool {
        if self.frames.len() == 1 {
            return false;
        }
        let frame = self.frames.pop().expect("checked above");
        for idx in frame.created {
            self.live.remove(&idx);
            self.active.remove(&idx);
        }
        for idx in frame.retracted {
            if self.live.contains(&idx) {
                self.active.insert(idx);
            }
        }
        true
    }

    fn consistent(&self) -> bool {
        let mut lo = i64::MIN;
        let mut hi = i64::MAX;
        for idx in &self.active {
            match self.bounds[*idx] {
                Bound::AtLeast(c) => lo = lo.max(c),
                Bound::AtMost(c) => hi = hi.min(c),
            }
        }
        lo <= hi
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

    #[test]
    fn session_tracks_reference_bookkeeping(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut session = SolverSession::new(BoundedSolver::with_domain(-8..=8, 1_000_000));
        session.declare("x", SmtSort::Int).expect("declare x");
        let mut reference = Reference::new();
        let mut labels: Vec<Label> = Vec::new();

        for op in ops {
            match op {
                Op::Push => {
                    session.push().expect("push");
                    reference.frames.push(ModelFrame::default());
                }
                Op::Pop => {
                    let popped = reference.pop();
                    let result = session.pop();
                    if popped {
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert!(matches!(result, Err(SessionError::ScopeUnderflow)));
                    }
                }
                Op::Assert(bound) => {
                    let label = session.labelled_assert(&bound.term()).expect("labelled assert");
                    let idx = reference.assert(bound);
                    prop_assert_eq!(idx, labels.len());
                    labels.push(label);
                }
                Op::Retract(pick) => {
                    if labels.is_empty() {
                        continue;
                    }
                    let idx = pick % labels.len();
                    session.retract(labels[idx]);
                    reference.retract(idx);
                }
                Op::Query => {
                    let result = session.query(&SmtTerm::bool(false)).expect("query");
                    if reference.consistent() {
                        prop_assert_eq!(result, QueryResult::Sat);
                    } else {
                        match result {
                            QueryResult::Unsat(core) => {
                                for label in core {
                                    prop_assert!(session.is_active(label));
                                }
                            }
                            other => prop_assert!(false, "expected unsat, got {:?}", other),
                        }
                    }
                }
            }

            let expected: Vec<Label> = reference.active.iter().map(|idx| labels[*idx]).collect();
            prop_assert_eq!(session.active_labels(), expected);
            prop_assert_eq!(session.depth(), reference.frames.len() - 1);
        }
    }
}

#[test]
fn retracting_twice_or_after_pop_changes_nothing() {
    let mut session = SolverSession::new(BoundedSolver::with_domain(-8..=8, 100_000));
    session.declare("x", SmtSort::Int).expect("declare x");
    let outer = session
        .labelled_assert(&SmtTerm::var("x").ge(SmtTerm::int(2)))
        .expect("outer assert");
    session.push().expect("push");
    let inner = session
        .labelled_assert(&SmtTerm::var("x").le(SmtTerm::int(1)))
        .expect("inner assert");
    assert!(matches!(
        session.query(&SmtTerm::bool(false)).expect("query"),
        QueryResult::Unsat(_)
    ));
    session.pop().expect("pop");

    let before = session.query(&SmtTerm::var("x").ge(SmtTerm::int(2))).expect("query");
    session.retract(inner);
    session.retract(inner);
    let after = session.query(&SmtTerm::var("x").ge(SmtTerm::int(2))).expect("query");
    assert_eq!(before, after);
    assert_eq!(after, QueryResult::Unsat(vec![outer]));
}

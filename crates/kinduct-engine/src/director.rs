//! Totally ordered broadcast between engines and bookkeeping of verdicts.
//!
//! Every broadcast runs under one lock, so all engines observe messages in
//! the same order as the director's history. `Valid` messages are stamped
//! with a responsibility round on the way through; the round alone decides
//! which role acts on the message next.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::message::{EngineType, Message, ValidMessage};
use crate::result::{PropertyResult, SessionReport};

pub type Inbox = Receiver<Arc<Message>>;

pub struct Director {
    properties: Vec<String>,
    itinerary: Vec<EngineType>,
    aborted: AtomicBool,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    inboxes: Vec<(EngineType, Sender<Arc<Message>>)>,
    running: BTreeSet<EngineType>,
    history: Vec<Arc<Message>>,
    valid_counts: HashMap<String, usize>,
    results: HashMap<String, PropertyResult>,
    fatal: Option<EngineError>,
}

impl Director {
    /// `itinerary` lists the roles that process a `Valid` verdict, in order,
    /// before it becomes final.
    pub fn new(properties: Vec<String>, itinerary: Vec<EngineType>) -> Self {
        Self {
            properties,
            itinerary,
            aborted: AtomicBool::new(false),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the inbox of `engine`. Each role registers at most once.
    pub fn register(&self, engine: EngineType) -> Inbox {
        let (tx, rx) = mpsc::channel();
        let mut state = self.lock();
        state.inboxes.push((engine, tx));
        state.running.insert(engine);
        rx
    }

    /// Deliver `message` to every registered engine except `sender`.
    pub fn broadcast(&self, sender: EngineType, mut message: Message) {
        let mut state = self.lock();
        if let Message::Valid(vm) = &mut message {
            vm.round = vm
                .properties
                .iter()
                .map(|p| state.valid_counts.get(p).copied().unwrap_or(0))
                .max()
                .unwrap_or(0);
            for property in &vm.properties {
                *state.valid_counts.entry(property.clone()).or_insert(0) += 1;
            }
        }
        debug!(
            sender = %sender,
            kind = message.kind(),
            properties = ?message.properties(),
            seq = state.history.len(),
            "broadcast"
        );

        self.record(&mut state, &message);
        let message = Arc::new(message);
        state.history.push(Arc::clone(&message));
        for (engine, tx) in &state.inboxes {
            if *engine != sender {
                // A closed inbox belongs to an engine that already finished.
                let _ = tx.send(Arc::clone(&message));
            }
        }
    }

    /// Role that has to act on `vm` next; [`EngineType::Director`] once the
    /// verdict is final.
    pub fn next_responsible(&self, vm: &ValidMessage) -> EngineType {
        self.itinerary
            .get(vm.round)
            .copied()
            .unwrap_or(EngineType::Director)
    }

    fn record(&self, state: &mut State, message: &Message) {
        match message {
            Message::Invalid(im) => {
                for property in &im.properties {
                    let result = PropertyResult::Invalid {
                        counterexample: im.counterexample.clone(),
                    };
                    record_result(state, property, result, im.source);
                }
            }
            Message::Unknown(um) => {
                for property in &um.properties {
                    record_result(state, property, PropertyResult::Unknown, um.source);
                }
            }
            Message::Valid(vm) => {
                if self.next_responsible(vm) != EngineType::Director {
                    return;
                }
                for property in &vm.properties {
                    let result = PropertyResult::Valid {
                        k: vm.k,
                        invariants: vm
                            .invariants
                            .iter()
                            .filter(|inv| inv.name() != property)
                            .cloned()
                            .collect(),
                    };
                    record_result(state, property, result, vm.source);
                }
            }
            Message::BaseStep(_) | Message::InductiveCounterexample(_) | Message::Invariant(_) => {}
        }
    }

    /// Mark `engine` as finished. Once only reactive engines are left, every
    /// inbox is closed so they drain what they have and exit.
    pub fn retire(&self, engine: EngineType) {
        let mut state = self.lock();
        state.running.remove(&engine);
        state.inboxes.retain(|(e, _)| *e != engine);
        if state.running.iter().all(|e| e.is_reactive()) {
            state.inboxes.clear();
        }
        debug!(engine = %engine, "engine retired");
    }

    /// Abort the session. The first error is kept; engines observe the abort
    /// on their next loop iteration and blocked engines are woken up.
    pub fn abort(&self, err: EngineError) {
        let mut state = self.lock();
        if state.fatal.is_none() {
            error!(error = %err, "aborting session");
            state.fatal = Some(err);
        }
        self.aborted.store(true, Ordering::SeqCst);
        state.inboxes.clear();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Snapshot of every message broadcast so far, in delivery order.
    pub fn history(&self) -> Vec<Arc<Message>> {
        self.lock().history.clone()
    }

    /// Final report, or the fatal error that aborted the session.
    pub fn into_report(self) -> Result<SessionReport, EngineError> {
        let mut state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(err) = state.fatal.take() {
            return Err(err);
        }
        let mut properties = IndexMap::new();
        for name in self.properties {
            let result = match state.results.remove(&name) {
                Some(result) => result,
                None => {
                    warn!(property = %name, "no verdict reached, reporting unknown");
                    PropertyResult::Unknown
                }
            };
            properties.insert(name, result);
        }
        Ok(SessionReport { properties })
    }
}

fn record_result(state: &mut State, property: &str, result: PropertyResult, source: EngineType) {
    match state.results.get(property) {
        Some(existing) if existing.conflicts_with(&result) => {
            error!(
                property,
                %source,
                existing = %existing,
                conflicting = %result,
                "conflicting verdicts, keeping the first"
            );
        }
        Some(_) => {}
        None => {
            info!(property, %source, result = %result, "property decided");
            state.results.insert(property.to_string(), result);
        }
    }
}

//! Running all engine roles concurrently against one specification.

use std::sync::Arc;
use std::thread;

use kinduct_smt::backends::bounded::BoundedSolver;
use kinduct_smt::backends::smtlib_process::SmtLibProcessSolver;
use kinduct_smt::solver::SmtSolver;
use tracing::info;

use crate::director::{Director, Inbox};
use crate::engine::run_engine;
use crate::engines::{BmcEngine, InvariantGenerationEngine, InvariantReductionEngine, KInductionEngine};
use crate::error::{EngineError, RunError};
use crate::message::{EngineType, Message};
use crate::options::{SessionOptions, SolverChoice};
use crate::result::SessionReport;
use crate::specification::Specification;

pub struct Session<'a> {
    spec: &'a Specification,
    options: &'a SessionOptions,
}

/// Retires the engine when its thread ends, aborting the session first if
/// the thread is unwinding.
struct RetireGuard<'a> {
    director: &'a Director,
    engine: EngineType,
}

impl Drop for RetireGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.director.abort(EngineError::Panicked(self.engine));
        }
        self.director.retire(self.engine);
    }
}

impl<'a> Session<'a> {
    pub fn new(spec: &'a Specification, options: &'a SessionOptions) -> Self {
        Self { spec, options }
    }

    /// Engine roles enabled by the options. Bounded model checking always
    /// runs; the other roles only make sense alongside k-induction.
    pub fn roles(&self) -> Vec<EngineType> {
        let mut roles = vec![EngineType::Bmc];
        if self.options.k_induction {
            roles.push(EngineType::KInduction);
            if self.options.invariant_generation {
                roles.push(EngineType::InvariantGeneration);
            }
            if self.options.reduce_invariants {
                roles.push(EngineType::InvariantReduction);
            }
        }
        roles
    }

    fn itinerary(&self) -> Vec<EngineType> {
        if self.options.k_induction && self.options.reduce_invariants {
            vec![EngineType::InvariantReduction]
        } else {
            Vec::new()
        }
    }

    /// Run every role on its own thread, each with a solver built by
    /// `factory` on that thread.
    pub fn run<S, F>(&self, factory: F) -> Result<SessionReport, RunError>
    where
        S: SmtSolver,
        F: Fn() -> Result<S, EngineError> + Sync,
    {
        self.run_with_history(factory).map(|(report, _)| report)
    }

    /// Like [`Session::run`], also returning every broadcast message in
    /// delivery order.
    pub fn run_with_history<S, F>(&self, factory: F) -> Result<(SessionReport, Vec<Arc<Message>>), RunError>
    where
        S: SmtSolver,
        F: Fn() -> Result<S, EngineError> + Sync,
    {
        self.spec.validate()?;
        let roles = self.roles();
        info!(
            properties = self.spec.properties.len(),
            roles = ?roles,
            max_k = self.options.max_k,
            "starting session"
        );

        let director = Director::new(self.spec.property_names(), self.itinerary());
        let inboxes: Vec<(EngineType, Inbox)> = roles
            .iter()
            .map(|role| (*role, director.register(*role)))
            .collect();

        thread::scope(|scope| {
            let handles: Vec<_> = inboxes
                .into_iter()
                .map(|(role, inbox)| {
                    let director = &director;
                    let factory = &factory;
                    let spec = self.spec;
                    let options = self.options;
                    let handle = scope.spawn(move || {
                        let _guard = RetireGuard { director, engine: role };
                        let outcome = factory().and_then(|solver| run_role(role, spec, director, options, solver, &inbox));
                        if let Err(err) = outcome {
                            director.abort(err);
                        }
                    });
                    (role, handle)
                })
                .collect();
            for (role, handle) in handles {
                if handle.join().is_err() {
                    director.abort(EngineError::Panicked(role));
                }
            }
        });

        let history = director.history();
        let report = director.into_report()?;
        info!(valid = report.all_valid(), "session finished");
        Ok((report, history))
    }
}

fn run_role<S: SmtSolver>(
    role: EngineType,
    spec: &Specification,
    director: &Director,
    options: &SessionOptions,
    solver: S,
    inbox: &Inbox,
) -> Result<(), EngineError> {
    match role {
        EngineType::Bmc => run_engine(&mut BmcEngine::new(spec, director, options, solver), inbox, director),
        EngineType::KInduction => {
            run_engine(&mut KInductionEngine::new(spec, director, options, solver), inbox, director)
        }
        EngineType::InvariantGeneration => run_engine(
            &mut InvariantGenerationEngine::new(spec, director, options, solver),
            inbox,
            director,
        ),
        EngineType::InvariantReduction => run_engine(
            &mut InvariantReductionEngine::new(spec, director, options, solver),
            inbox,
            director,
        ),
        EngineType::Director => Err(EngineError::ProtocolViolation(
            "the director is not an engine role".into(),
        )),
    }
}

/// Verify `spec` with the backend selected in `options`.
///
/// The default backend is `z3 -in`, which must be on `PATH`.
/// [`SolverChoice::Bounded`] needs no external solver, but its proofs are
/// only trustworthy for systems whose values stay inside
/// `options.bounded_domain`.
pub fn verify(spec: &Specification, options: &SessionOptions) -> Result<SessionReport, RunError> {
    let session = Session::new(spec, options);
    let solver_error = |err: kinduct_smt::backends::smtlib_process::SmtLibError| EngineError::Solver(err.to_string());
    match options.solver {
        SolverChoice::Bounded => session.run(|| {
            Ok(BoundedSolver::with_domain(
                options.bounded_domain.clone(),
                options.bounded_budget,
            ))
        }),
        SolverChoice::Z3Process => session.run(|| SmtLibProcessSolver::z3(options.timeout_secs).map_err(solver_error)),
        SolverChoice::Cvc5Process => {
            session.run(|| SmtLibProcessSolver::cvc5(options.timeout_secs).map_err(solver_error))
        }
        #[cfg(feature = "z3")]
        SolverChoice::Z3 => session.run(|| {
            Ok(kinduct_smt::backends::z3_backend::Z3Solver::with_timeout_secs(
                options.timeout_secs,
            ))
        }),
    }
}

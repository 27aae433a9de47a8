use kinduct_smt::session::SessionError;
use thiserror::Error;

use crate::message::EngineType;
use crate::specification::SpecificationError;

/// Failures that abort the whole session. No property result of an aborted
/// session is reported.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A message producer broke the protocol, e.g. a `Valid` whose invariant
    /// list lacks the property itself.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The solver answered `unknown` where no degradation path exists.
    #[error("solver degraded in {engine}: {reason}")]
    SolverDegraded { engine: EngineType, reason: String },
    #[error("solver error: {0}")]
    Solver(String),
    #[error("engine {0} panicked")]
    Panicked(EngineType),
}

impl<E: std::error::Error + 'static> From<SessionError<E>> for EngineError {
    fn from(err: SessionError<E>) -> Self {
        EngineError::Solver(err.to_string())
    }
}

/// Error returned by [`crate::session::Session::run`] and [`crate::session::verify`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid specification: {0}")]
    Specification(#[from] SpecificationError),
    #[error("session aborted: {0}")]
    Fatal(#[from] EngineError),
}

//! Solver backends implementing [`crate::solver::SmtSolver`].

pub mod bounded;
pub mod smtlib_printer;
pub mod smtlib_process;
#[cfg(feature = "z3")]
pub mod z3_backend;

#![doc = include_str!("../README.md")]

//! Term language, solver backends and incremental solver sessions.
//!
//! [`session::SolverSession`] layers scoped, retractable labelled
//! assertions over any [`solver::SmtSolver`] backend; unsat cores come back
//! as sets of labels.

pub mod backends;
pub mod eval;
pub mod session;
pub mod solver;
pub mod sorts;
pub mod terms;

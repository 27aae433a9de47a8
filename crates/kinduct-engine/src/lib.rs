#![doc = include_str!("../README.md")]

//! Multi-engine k-induction.
//!
//! Engines run concurrently, each with a private solver session, and
//! coordinate only through the [`director::Director`]'s ordered broadcast.
//! Proofs found by k-induction are routed through invariant-set reduction
//! before they become final.

pub mod director;
pub mod engine;
pub mod engines;
pub mod error;
pub mod invariant;
pub mod message;
pub mod options;
pub mod outstanding;
pub mod result;
pub mod session;
pub mod specification;

pub use error::{EngineError, RunError};
pub use options::{SessionOptions, SolverChoice};
pub use result::{Counterexample, PropertyResult, SessionReport};
pub use session::{verify, Session};
pub use specification::{Property, Specification, SpecificationError};

use std::ops::RangeInclusive;

use kinduct_smt::backends::bounded::{DEFAULT_BUDGET, DEFAULT_DOMAIN};

/// Which solver backend each engine instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverChoice {
    /// Pure-Rust enumeration over `bounded_domain`.
    ///
    /// Counterexamples are real, but proofs only hold for states whose
    /// values stay near `bounded_domain`. A property that fails past that
    /// range can come back `Valid`.
    Bounded,
    /// `z3 -in` as a child process.
    #[default]
    Z3Process,
    /// `cvc5 --incremental` as a child process.
    Cvc5Process,
    /// In-process z3.
    #[cfg(feature = "z3")]
    Z3,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub solver: SolverChoice,
    /// Deepest induction depth (and BMC bound) tried before giving up.
    pub max_k: usize,
    pub k_induction: bool,
    pub invariant_generation: bool,
    /// Route every `Valid` through invariant-set reduction before it is final.
    pub reduce_invariants: bool,
    pub bounded_domain: RangeInclusive<i64>,
    pub bounded_budget: u64,
    /// Per-check timeout for process and z3 backends; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            solver: SolverChoice::default(),
            max_k: 10,
            k_induction: true,
            invariant_generation: true,
            reduce_invariants: true,
            bounded_domain: DEFAULT_DOMAIN,
            bounded_budget: DEFAULT_BUDGET,
            timeout_secs: 300,
        }
    }
}

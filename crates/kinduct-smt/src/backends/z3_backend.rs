use std::collections::HashMap;

use thiserror::Error;
use z3::ast::{Bool, Int};
use z3::SatResult as Z3SatResult;

use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("`{name}` is already declared as {declared}")]
    SortMismatch { name: String, declared: SmtSort },
    #[error("expected {expected} in `{term}`")]
    IllSorted { expected: SmtSort, term: String },
}

/// A translated subterm, tagged with its sort.
#[derive(Clone)]
enum Ast {
    Int(Int),
    Bool(Bool),
}

impl Ast {
    fn sort(&self) -> SmtSort {
        match self {
            Ast::Int(_) => SmtSort::Int,
            Ast::Bool(_) => SmtSort::Bool,
        }
    }
}

/// In-process z3 backend.
///
/// z3 keeps its context per thread, so a `Z3Solver` must be created on the
/// thread that uses it.
pub struct Z3Solver {
    solver: z3::Solver,
    consts: HashMap<String, Ast>,
    /// Assumptions of the last `check_sat_assuming`, for core lookup.
    assumed: Vec<(String, Bool)>,
    params: Option<z3::Params>,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            solver: z3::Solver::new(),
            consts: HashMap::new(),
            assumed: Vec::new(),
            params: None,
        }
    }

    /// A solver whose checks give up with `unknown` after `timeout_secs`;
    /// zero means no limit.
    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        let mut solver = Self::new();
        if timeout_secs > 0 {
            let timeout_ms = u32::try_from(timeout_secs.saturating_mul(1000)).unwrap_or(u32::MAX);
            let mut params = z3::Params::new();
            params.set_u32("timeout", timeout_ms);
            solver.solver.set_params(&params);
            solver.params = Some(params);
        }
        solver
    }

    fn int(&self, term: &SmtTerm) -> Result<Int, Z3Error> {
        match self.translate(term)? {
            Ast::Int(i) => Ok(i),
            Ast::Bool(_) => Err(Z3Error::IllSorted {
                expected: SmtSort::Int,
                term: term.to_string(),
            }),
        }
    }

    fn bool(&self, term: &SmtTerm) -> Result<Bool, Z3Error> {
        match self.translate(term)? {
            Ast::Bool(b) => Ok(b),
            Ast::Int(_) => Err(Z3Error::IllSorted {
                expected: SmtSort::Bool,
                term: term.to_string(),
            }),
        }
    }

    fn bools(&self, terms: &[SmtTerm]) -> Result<Vec<Bool>, Z3Error> {
        terms.iter().map(|t| self.bool(t)).collect()
    }

    fn arith(&self, lhs: &SmtTerm, rhs: &SmtTerm, op: fn(&Int, &Int) -> Int) -> Result<Ast, Z3Error> {
        Ok(Ast::Int(op(&self.int(lhs)?, &self.int(rhs)?)))
    }

    fn compare(&self, lhs: &SmtTerm, rhs: &SmtTerm, op: fn(&Int, &Int) -> Bool) -> Result<Ast, Z3Error> {
        Ok(Ast::Bool(op(&self.int(lhs)?, &self.int(rhs)?)))
    }

    fn translate(&self, term: &SmtTerm) -> Result<Ast, Z3Error> {
        match term {
            SmtTerm::Var(name) => self
                .consts
                .get(name)
                .cloned()
                .ok_or_else(|| Z3Error::UnknownVariable(name.clone())),
            SmtTerm::Pre(name) => Err(Z3Error::Internal(format!(
                "uninstantiated pre({name}) reached the backend"
            ))),
            SmtTerm::IntLit(n) => Ok(Ast::Int(Int::from_i64(*n))),
            SmtTerm::BoolLit(b) => Ok(Ast::Bool(Bool::from_bool(*b))),
            SmtTerm::Add(lhs, rhs) => self.arith(lhs, rhs, |l, r| l + r),
            SmtTerm::Sub(lhs, rhs) => self.arith(lhs, rhs, |l, r| l - r),
            SmtTerm::Mul(lhs, rhs) => self.arith(lhs, rhs, |l, r| l * r),
            SmtTerm::Lt(lhs, rhs) => self.compare(lhs, rhs, |l, r| l.lt(r)),
            SmtTerm::Le(lhs, rhs) => self.compare(lhs, rhs, |l, r| l.le(r)),
            SmtTerm::Gt(lhs, rhs) => self.compare(lhs, rhs, |l, r| l.gt(r)),
            SmtTerm::Ge(lhs, rhs) => self.compare(lhs, rhs, |l, r| l.ge(r)),
            SmtTerm::Eq(lhs, rhs) => match (self.translate(lhs)?, self.translate(rhs)?) {
                (Ast::Int(l), Ast::Int(r)) => Ok(Ast::Bool(l.eq(&r))),
                (Ast::Bool(l), Ast::Bool(r)) => Ok(Ast::Bool(l.eq(&r))),
                (l, _) => Err(Z3Error::IllSorted {
                    expected: l.sort(),
                    term: term.to_string(),
                }),
            },
            SmtTerm::And(terms) => {
                let bools = self.bools(terms)?;
                let refs: Vec<&Bool> = bools.iter().collect();
                Ok(Ast::Bool(Bool::and(&refs)))
            }
            SmtTerm::Or(terms) => {
                let bools = self.bools(terms)?;
                let refs: Vec<&Bool> = bools.iter().collect();
                Ok(Ast::Bool(Bool::or(&refs)))
            }
            SmtTerm::Not(inner) => Ok(Ast::Bool(self.bool(inner)?.not())),
            SmtTerm::Implies(lhs, rhs) => Ok(Ast::Bool(self.bool(lhs)?.implies(&self.bool(rhs)?))),
            SmtTerm::Ite(cond, then, els) => {
                let c = self.bool(cond)?;
                match (self.translate(then)?, self.translate(els)?) {
                    (Ast::Int(t), Ast::Int(e)) => Ok(Ast::Int(c.ite(&t, &e))),
                    (Ast::Bool(t), Ast::Bool(e)) => Ok(Ast::Bool(c.ite(&t, &e))),
                    (t, _) => Err(Z3Error::IllSorted {
                        expected: t.sort(),
                        term: term.to_string(),
                    }),
                }
            }
        }
    }

    fn classify(result: Z3SatResult) -> SatResult {
        match result {
            Z3SatResult::Sat => SatResult::Sat,
            Z3SatResult::Unsat => SatResult::Unsat,
            Z3SatResult::Unknown => SatResult::Unknown("Z3 returned unknown".into()),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        if let Some(existing) = self.consts.get(name) {
            if existing.sort() != *sort {
                return Err(Z3Error::SortMismatch {
                    name: name.to_string(),
                    declared: existing.sort(),
                });
            }
            return Ok(());
        }
        let ast = match sort {
            SmtSort::Int => Ast::Int(Int::new_const(name)),
            SmtSort::Bool => Ast::Bool(Bool::new_const(name)),
        };
        self.consts.insert(name.to_string(), ast);
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let formula = self.bool(term)?;
        self.solver.assert(&formula);
        Ok(())
    }

    fn push(&mut self) -> Result<(), Z3Error> {
        self.solver.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Z3Error> {
        self.solver.pop(1);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        self.assumed.clear();
        Ok(Self::classify(self.solver.check()))
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Z3Error> {
        let mut assumed = Vec::with_capacity(assumptions.len());
        for name in assumptions {
            match self.consts.get(name) {
                Some(Ast::Bool(lit)) => assumed.push((name.clone(), lit.clone())),
                Some(Ast::Int(_)) => {
                    return Err(Z3Error::SortMismatch {
                        name: name.clone(),
                        declared: SmtSort::Int,
                    })
                }
                None => return Err(Z3Error::UnknownVariable(name.clone())),
            }
        }
        let literals: Vec<Bool> = assumed.iter().map(|(_, lit)| lit.clone()).collect();
        self.assumed = assumed;
        Ok(Self::classify(self.solver.check_assumptions(&literals)))
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, Z3Error> {
        let core = self.solver.get_unsat_core();
        Ok(self
            .assumed
            .iter()
            .filter(|(_, lit)| core.contains(lit))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn get_model(&mut self, var_names: &[(&str, SmtSort)]) -> Result<Model, Z3Error> {
        let model = self
            .solver
            .get_model()
            .ok_or_else(|| Z3Error::Internal("SAT but no model available".into()))?;
        let mut values = HashMap::new();
        for &(name, _) in var_names {
            let value = match self.consts.get(name) {
                Some(Ast::Int(v)) => model.eval(v, true).and_then(|v| v.as_i64()).map(ModelValue::Int),
                Some(Ast::Bool(v)) => model.eval(v, true).and_then(|v| v.as_bool()).map(ModelValue::Bool),
                None => None,
            };
            if let Some(value) = value {
                values.insert(name.to_string(), value);
            }
        }
        Ok(Model { values })
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.solver.reset();
        // reset drops solver parameters
        if let Some(params) = &self.params {
            self.solver.set_params(params);
        }
        self.consts.clear();
        self.assumed.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn core_names_the_conflicting_guards() -> TestResult {
        let mut solver = Z3Solver::new();
        for (name, sort) in [("x@0", SmtSort::Int), ("act!0", SmtSort::Bool), ("act!1", SmtSort::Bool), ("act!2", SmtSort::Bool)] {
            solver.declare_var(name, &sort)?;
        }
        let x = || SmtTerm::var("x@0");
        solver.assert(&SmtTerm::var("act!0").implies(x().gt(SmtTerm::int(0))))?;
        solver.assert(&SmtTerm::var("act!1").implies(x().lt(SmtTerm::int(0))))?;
        solver.assert(&SmtTerm::var("act!2").implies(x().le(SmtTerm::int(100))))?;

        let assumptions = ["act!0", "act!1", "act!2"].map(String::from);
        assert_eq!(solver.check_sat_assuming(&assumptions)?, SatResult::Unsat);
        let core = solver.get_unsat_core_assumptions()?;
        assert!(core.contains(&"act!0".to_string()));
        assert!(core.contains(&"act!1".to_string()));
        Ok(())
    }

    #[test]
    fn model_reads_step_variables() -> TestResult {
        let mut solver = Z3Solver::new();
        solver.declare_var("x@1", &SmtSort::Int)?;
        solver.declare_var("b@1", &SmtSort::Bool)?;
        solver.assert(&SmtTerm::var("x@1").eq(SmtTerm::int(42)))?;
        solver.assert(&SmtTerm::var("b@1"))?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);
        let model = solver.get_model(&[("x@1", SmtSort::Int), ("b@1", SmtSort::Bool)])?;
        assert_eq!(model.get_int("x@1"), Some(42));
        assert_eq!(model.get_bool("b@1"), Some(true));
        Ok(())
    }

    #[test]
    fn redeclaring_with_another_sort_fails() -> TestResult {
        let mut solver = Z3Solver::new();
        solver.declare_var("x", &SmtSort::Int)?;
        solver.declare_var("x", &SmtSort::Int)?;
        assert!(matches!(
            solver.declare_var("x", &SmtSort::Bool),
            Err(Z3Error::SortMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn pre_references_are_rejected() {
        let mut solver = Z3Solver::new();
        let result = solver.assert(&SmtTerm::pre("x").ge(SmtTerm::int(0)));
        assert!(result.is_err());
    }
}

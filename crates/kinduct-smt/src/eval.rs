//! Three-valued evaluation of terms under a (possibly partial) valuation.
//!
//! Unassigned variables evaluate to `None`; connectives short-circuit so a
//! partially assigned formula can already be decided, which is what the
//! bounded backend relies on for pruning.

use std::collections::HashMap;

use thiserror::Error;

use crate::solver::{Model, ModelValue};
use crate::terms::SmtTerm;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("expected {expected} operand in `{term}`")]
    SortMismatch { expected: &'static str, term: String },
    #[error("integer overflow in `{0}`")]
    Overflow(String),
    #[error("uninstantiated pre({0}) reference")]
    UninstantiatedPre(String),
}

/// Source of variable values for evaluation.
pub trait Valuation {
    fn value(&self, name: &str) -> Option<ModelValue>;
}

impl Valuation for Model {
    fn value(&self, name: &str) -> Option<ModelValue> {
        self.get(name)
    }
}

impl Valuation for HashMap<String, ModelValue> {
    fn value(&self, name: &str) -> Option<ModelValue> {
        self.get(name).copied()
    }
}

/// Evaluate `term`; `Ok(None)` means the value depends on unassigned variables.
pub fn eval<V: Valuation + ?Sized>(term: &SmtTerm, env: &V) -> Result<Option<ModelValue>, EvalError> {
    Ok(match term {
        SmtTerm::Var(name) => env.value(name),
        SmtTerm::Pre(name) => return Err(EvalError::UninstantiatedPre(name.clone())),
        SmtTerm::IntLit(n) => Some(ModelValue::Int(*n)),
        SmtTerm::BoolLit(b) => Some(ModelValue::Bool(*b)),
        SmtTerm::Add(l, r) => arith(term, l, r, env, i64::checked_add)?,
        SmtTerm::Sub(l, r) => arith(term, l, r, env, i64::checked_sub)?,
        SmtTerm::Mul(l, r) => arith(term, l, r, env, i64::checked_mul)?,
        SmtTerm::Eq(l, r) => match (eval(l, env)?, eval(r, env)?) {
            (Some(ModelValue::Int(a)), Some(ModelValue::Int(b))) => Some(ModelValue::Bool(a == b)),
            (Some(ModelValue::Bool(a)), Some(ModelValue::Bool(b))) => Some(ModelValue::Bool(a == b)),
            (Some(_), Some(_)) => return Err(mismatch("matching", term)),
            _ => None,
        },
        SmtTerm::Lt(l, r) => compare(term, l, r, env, |a, b| a < b)?,
        SmtTerm::Le(l, r) => compare(term, l, r, env, |a, b| a <= b)?,
        SmtTerm::Gt(l, r) => compare(term, l, r, env, |a, b| a > b)?,
        SmtTerm::Ge(l, r) => compare(term, l, r, env, |a, b| a >= b)?,
        SmtTerm::And(terms) => {
            let mut undecided = false;
            for t in terms {
                match as_bool(term, eval(t, env)?)? {
                    Some(false) => return Ok(Some(ModelValue::Bool(false))),
                    Some(true) => {}
                    None => undecided = true,
                }
            }
            (!undecided).then_some(ModelValue::Bool(true))
        }
        SmtTerm::Or(terms) => {
            let mut undecided = false;
            for t in terms {
                match as_bool(term, eval(t, env)?)? {
                    Some(true) => return Ok(Some(ModelValue::Bool(true))),
                    Some(false) => {}
                    None => undecided = true,
                }
            }
            (!undecided).then_some(ModelValue::Bool(false))
        }
        SmtTerm::Not(inner) => as_bool(term, eval(inner, env)?)?.map(|b| ModelValue::Bool(!b)),
        SmtTerm::Implies(l, r) => {
            let lhs = as_bool(term, eval(l, env)?)?;
            if lhs == Some(false) {
                return Ok(Some(ModelValue::Bool(true)));
            }
            let rhs = as_bool(term, eval(r, env)?)?;
            match (lhs, rhs) {
                (_, Some(true)) => Some(ModelValue::Bool(true)),
                (Some(true), Some(false)) => Some(ModelValue::Bool(false)),
                _ => None,
            }
        }
        SmtTerm::Ite(c, t, e) => match as_bool(term, eval(c, env)?)? {
            Some(true) => eval(t, env)?,
            Some(false) => eval(e, env)?,
            None => {
                let then_value = eval(t, env)?;
                let else_value = eval(e, env)?;
                if then_value.is_some() && then_value == else_value {
                    then_value
                } else {
                    None
                }
            }
        },
    })
}

/// Evaluate a Boolean term.
pub fn eval_bool<V: Valuation + ?Sized>(term: &SmtTerm, env: &V) -> Result<Option<bool>, EvalError> {
    as_bool(term, eval(term, env)?)
}

fn arith<V: Valuation + ?Sized>(
    term: &SmtTerm,
    l: &SmtTerm,
    r: &SmtTerm,
    env: &V,
    op: fn(i64, i64) -> Option<i64>,
) -> Result<Option<ModelValue>, EvalError> {
    let lhs = as_int(term, eval(l, env)?)?;
    let rhs = as_int(term, eval(r, env)?)?;
    match (lhs, rhs) {
        (Some(a), Some(b)) => op(a, b)
            .map(|n| Some(ModelValue::Int(n)))
            .ok_or_else(|| EvalError::Overflow(term.to_string())),
        _ => Ok(None),
    }
}

fn compare<V: Valuation + ?Sized>(
    term: &SmtTerm,
    l: &SmtTerm,
    r: &SmtTerm,
    env: &V,
    op: fn(i64, i64) -> bool,
) -> Result<Option<ModelValue>, EvalError> {
    let lhs = as_int(term, eval(l, env)?)?;
    let rhs = as_int(term, eval(r, env)?)?;
    Ok(match (lhs, rhs) {
        (Some(a), Some(b)) => Some(ModelValue::Bool(op(a, b))),
        _ => None,
    })
}

fn as_int(term: &SmtTerm, value: Option<ModelValue>) -> Result<Option<i64>, EvalError> {
    match value {
        Some(ModelValue::Int(n)) => Ok(Some(n)),
        Some(ModelValue::Bool(_)) => Err(mismatch("Int", term)),
        None => Ok(None),
    }
}

fn as_bool(term: &SmtTerm, value: Option<ModelValue>) -> Result<Option<bool>, EvalError> {
    match value {
        Some(ModelValue::Bool(b)) => Ok(Some(b)),
        Some(ModelValue::Int(_)) => Err(mismatch("Bool", term)),
        None => Ok(None),
    }
}

fn mismatch(expected: &'static str, term: &SmtTerm) -> EvalError {
    EvalError::SortMismatch {
        expected,
        term: term.to_string(),
    }
}

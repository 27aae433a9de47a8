//! SMT-LIB2 text for terms, sorts and symbols.
//!
//! The output doubles as the canonical form of invariant templates, so
//! `Pre` prints as `(pre x)` although no backend accepts it. Templates are
//! instantiated before anything reaches a solver.

use std::fmt;

use crate::terms::SmtTerm;

/// Streams a term as SMT-LIB2 without building intermediate strings.
pub struct Smtlib<'a>(pub &'a SmtTerm);

impl fmt::Display for Smtlib<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, self.0)
    }
}

pub fn to_smtlib(term: &SmtTerm) -> String {
    Smtlib(term).to_string()
}

/// Print a symbol, quoting it with `|..|` when it is not a simple symbol.
pub fn symbol(name: &str) -> String {
    const EXTRA: &str = "~!@$%^&*_-+=<>.?/";
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || EXTRA.contains(c));
    if simple {
        name.to_string()
    } else {
        format!("|{name}|")
    }
}

fn write_term(f: &mut fmt::Formatter<'_>, term: &SmtTerm) -> fmt::Result {
    match term {
        SmtTerm::Var(name) => f.write_str(&symbol(name)),
        SmtTerm::Pre(name) => write!(f, "(pre {})", symbol(name)),
        SmtTerm::IntLit(n) if *n < 0 => write!(f, "(- {})", n.unsigned_abs()),
        SmtTerm::IntLit(n) => write!(f, "{n}"),
        SmtTerm::BoolLit(b) => write!(f, "{b}"),
        SmtTerm::Add(lhs, rhs) => write_app(f, "+", [lhs.as_ref(), rhs.as_ref()]),
        SmtTerm::Sub(lhs, rhs) => write_app(f, "-", [lhs.as_ref(), rhs.as_ref()]),
        SmtTerm::Mul(lhs, rhs) => write_app(f, "*", [lhs.as_ref(), rhs.as_ref()]),
        SmtTerm::Eq(lhs, rhs) => write_app(f, "=", [lhs.as_ref(), rhs.as_ref()]),
        SmtTerm::Lt(lhs, rhs) => write_app(f, "<", [lhs.as_ref(), rhs.as_ref()]),
        SmtTerm::Le(lhs, rhs) => write_app(f, "<=", [lhs.as_ref(), rhs.as_ref()]),
        SmtTerm::Gt(lhs, rhs) => write_app(f, ">", [lhs.as_ref(), rhs.as_ref()]),
        SmtTerm::Ge(lhs, rhs) => write_app(f, ">=", [lhs.as_ref(), rhs.as_ref()]),
        SmtTerm::And(terms) => write_junction(f, "and", "true", terms),
        SmtTerm::Or(terms) => write_junction(f, "or", "false", terms),
        SmtTerm::Not(inner) => write_app(f, "not", [inner.as_ref()]),
        SmtTerm::Implies(lhs, rhs) => write_app(f, "=>", [lhs.as_ref(), rhs.as_ref()]),
        SmtTerm::Ite(cond, then, els) => write_app(f, "ite", [cond.as_ref(), then.as_ref(), els.as_ref()]),
    }
}

fn write_app<'t>(f: &mut fmt::Formatter<'_>, op: &str, args: impl IntoIterator<Item = &'t SmtTerm>) -> fmt::Result {
    write!(f, "({op}")?;
    for arg in args {
        f.write_str(" ")?;
        write_term(f, arg)?;
    }
    f.write_str(")")
}

/// `and`/`or` collapse to their unit when empty and to the operand when
/// unary, so `conjoin` over one invariant prints like the invariant itself.
fn write_junction(f: &mut fmt::Formatter<'_>, op: &str, unit: &str, terms: &[SmtTerm]) -> fmt::Result {
    match terms {
        [] => f.write_str(unit),
        [only] => write_term(f, only),
        _ => write_app(f, op, terms),
    }
}

use std::collections::BTreeSet;
use std::fmt;

use crate::backends::smtlib_printer::Smtlib;

/// Solver-agnostic term over Int and Bool.
///
/// Terms double as step templates: [`SmtTerm::Var`] names a state variable at
/// the current step and [`SmtTerm::Pre`] names it at the previous step. Use
/// [`SmtTerm::rename_vars`] to turn a template into a concrete term before it
/// reaches a backend; backends reject `Pre`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtTerm {
    Var(String),
    /// Previous-step value of a state variable (templates only).
    Pre(String),
    IntLit(i64),
    BoolLit(bool),

    Add(Box<SmtTerm>, Box<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),
    Mul(Box<SmtTerm>, Box<SmtTerm>),

    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),
}

macro_rules! binary_builders {
    ($($method:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $method(self, other: SmtTerm) -> Self {
                SmtTerm::$variant(Box::new(self), Box::new(other))
            }
        )*
    };
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn pre(name: impl Into<String>) -> Self {
        SmtTerm::Pre(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    binary_builders! {
        add => Add,
        sub => Sub,
        mul => Mul,
        eq => Eq,
        lt => Lt,
        le => Le,
        gt => Gt,
        ge => Ge,
        implies => Implies,
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    pub fn ite(cond: SmtTerm, then: SmtTerm, els: SmtTerm) -> Self {
        SmtTerm::Ite(Box::new(cond), Box::new(then), Box::new(els))
    }

    /// Direct subterms, left to right.
    pub fn children(&self) -> Vec<&SmtTerm> {
        match self {
            SmtTerm::Var(_) | SmtTerm::Pre(_) | SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => Vec::new(),
            SmtTerm::Add(l, r)
            | SmtTerm::Sub(l, r)
            | SmtTerm::Mul(l, r)
            | SmtTerm::Eq(l, r)
            | SmtTerm::Lt(l, r)
            | SmtTerm::Le(l, r)
            | SmtTerm::Gt(l, r)
            | SmtTerm::Ge(l, r)
            | SmtTerm::Implies(l, r) => vec![l.as_ref(), r.as_ref()],
            SmtTerm::And(terms) | SmtTerm::Or(terms) => terms.iter().collect(),
            SmtTerm::Not(inner) => vec![inner.as_ref()],
            SmtTerm::Ite(c, t, e) => vec![c.as_ref(), t.as_ref(), e.as_ref()],
        }
    }

    /// Bottom-up rewrite: `f` sees every subterm after its children have
    /// been rewritten and may replace it.
    pub fn map(&self, f: &impl Fn(SmtTerm) -> SmtTerm) -> SmtTerm {
        let sub = |t: &SmtTerm| Box::new(t.map(f));
        let rebuilt = match self {
            SmtTerm::Var(_) | SmtTerm::Pre(_) | SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => self.clone(),
            SmtTerm::Add(l, r) => SmtTerm::Add(sub(l), sub(r)),
            SmtTerm::Sub(l, r) => SmtTerm::Sub(sub(l), sub(r)),
            SmtTerm::Mul(l, r) => SmtTerm::Mul(sub(l), sub(r)),
            SmtTerm::Eq(l, r) => SmtTerm::Eq(sub(l), sub(r)),
            SmtTerm::Lt(l, r) => SmtTerm::Lt(sub(l), sub(r)),
            SmtTerm::Le(l, r) => SmtTerm::Le(sub(l), sub(r)),
            SmtTerm::Gt(l, r) => SmtTerm::Gt(sub(l), sub(r)),
            SmtTerm::Ge(l, r) => SmtTerm::Ge(sub(l), sub(r)),
            SmtTerm::Implies(l, r) => SmtTerm::Implies(sub(l), sub(r)),
            SmtTerm::And(terms) => SmtTerm::And(terms.iter().map(|t| t.map(f)).collect()),
            SmtTerm::Or(terms) => SmtTerm::Or(terms.iter().map(|t| t.map(f)).collect()),
            SmtTerm::Not(inner) => SmtTerm::Not(sub(inner)),
            SmtTerm::Ite(c, t, e) => SmtTerm::Ite(sub(c), sub(t), sub(e)),
        };
        f(rebuilt)
    }

    /// Rewrite every variable reference. The callback receives the variable
    /// name and whether the reference is a `pre(..)`; both kinds become plain
    /// [`SmtTerm::Var`]s in the result.
    pub fn rename_vars<F>(&self, rename: &F) -> SmtTerm
    where
        F: Fn(&str, bool) -> String,
    {
        self.map(&|term| match term {
            SmtTerm::Var(name) => SmtTerm::Var(rename(&name, false)),
            SmtTerm::Pre(name) => SmtTerm::Var(rename(&name, true)),
            other => other,
        })
    }

    /// Visit this term and all of its subterms in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a SmtTerm)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Names referenced through `Var` or `Pre`.
    pub fn referenced_vars(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.walk(&mut |t| {
            if let SmtTerm::Var(name) | SmtTerm::Pre(name) = t {
                out.insert(name.as_str());
            }
        });
        out
    }

    /// Integer literals occurring anywhere in the term.
    pub fn int_literals(&self) -> BTreeSet<i64> {
        let mut out = BTreeSet::new();
        self.walk(&mut |t| {
            if let SmtTerm::IntLit(n) = t {
                out.insert(*n);
            }
        });
        out
    }
}

impl fmt::Display for SmtTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Smtlib(self), f)
    }
}

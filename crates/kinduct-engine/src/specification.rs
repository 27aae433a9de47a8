//! The transition system handed to every engine.
//!
//! State variables are instantiated per step as `name@step`. The transition
//! relation refers to the previous step through `pre(v)`, so
//! `transition_at(k)` relates step `k-1` to step `k`. Step `-1` exists only as
//! the arbitrary predecessor used by inductive-step queries.

use std::collections::{HashMap, HashSet};

use kinduct_smt::sorts::SmtSort;
use kinduct_smt::terms::SmtTerm;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecificationError {
    #[error("duplicate state variable `{0}`")]
    DuplicateVariable(String),
    #[error("duplicate property `{0}`")]
    DuplicateProperty(String),
    #[error("unknown variable `{name}` in {context}")]
    UnknownVariable { context: String, name: String },
    #[error("pre({name}) is only allowed in the transition relation, found in {context}")]
    UnexpectedPre { context: String, name: String },
    #[error("{context} must be Boolean")]
    NotBoolean { context: String },
    #[error("sort mismatch in {context}: `{term}`")]
    SortMismatch { context: String, term: String },
    #[error("specification has no properties")]
    NoProperties,
}

/// A named safety property over current-step state variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub formula: SmtTerm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    pub state_vars: Vec<(String, SmtSort)>,
    pub init: SmtTerm,
    pub transition: SmtTerm,
    pub properties: Vec<Property>,
}

/// Name of state variable `name` at `step`.
pub fn step_var(name: &str, step: i64) -> String {
    format!("{name}@{step}")
}

/// Instantiate a template at `step`: `v` becomes `v@step`, `pre(v)` becomes
/// `v@(step-1)`.
pub fn instantiate(template: &SmtTerm, step: i64) -> SmtTerm {
    template.rename_vars(&|name: &str, is_pre: bool| {
        step_var(name, if is_pre { step - 1 } else { step })
    })
}

impl Specification {
    pub fn new(state_vars: Vec<(String, SmtSort)>, init: SmtTerm, transition: SmtTerm) -> Self {
        Self {
            state_vars,
            init,
            transition,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, formula: SmtTerm) -> Self {
        self.properties.push(Property {
            name: name.into(),
            formula,
        });
        self
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }

    pub fn init_at(&self, step: i64) -> SmtTerm {
        instantiate(&self.init, step)
    }

    pub fn transition_at(&self, step: i64) -> SmtTerm {
        instantiate(&self.transition, step)
    }

    /// `(name@step, sort)` for every state variable.
    pub fn step_vars(&self, step: i64) -> Vec<(String, SmtSort)> {
        self.state_vars
            .iter()
            .map(|(name, sort)| (step_var(name, step), *sort))
            .collect()
    }

    pub fn validate(&self) -> Result<(), SpecificationError> {
        let mut vars = HashMap::new();
        for (name, sort) in &self.state_vars {
            if vars.insert(name.as_str(), *sort).is_some() {
                return Err(SpecificationError::DuplicateVariable(name.clone()));
            }
        }
        if self.properties.is_empty() {
            return Err(SpecificationError::NoProperties);
        }

        check_predicate(&self.init, &vars, "initial predicate", false)?;
        check_predicate(&self.transition, &vars, "transition relation", true)?;

        let mut seen = HashSet::new();
        for property in &self.properties {
            if !seen.insert(property.name.as_str()) {
                return Err(SpecificationError::DuplicateProperty(property.name.clone()));
            }
            let context = format!("property `{}`", property.name);
            check_predicate(&property.formula, &vars, &context, false)?;
        }
        Ok(())
    }
}

fn check_predicate(
    term: &SmtTerm,
    vars: &HashMap<&str, SmtSort>,
    context: &str,
    allow_pre: bool,
) -> Result<(), SpecificationError> {
    match infer_sort(term, vars, context, allow_pre)? {
        SmtSort::Bool => Ok(()),
        SmtSort::Int => Err(SpecificationError::NotBoolean {
            context: context.to_string(),
        }),
    }
}

fn infer_sort(
    term: &SmtTerm,
    vars: &HashMap<&str, SmtSort>,
    context: &str,
    allow_pre: bool,
) -> Result<SmtSort, SpecificationError> {
    let expect = |t: &SmtTerm, sort: SmtSort| -> Result<(), SpecificationError> {
        if infer_sort(t, vars, context, allow_pre)? == sort {
            Ok(())
        } else {
            Err(SpecificationError::SortMismatch {
                context: context.to_string(),
                term: term.to_string(),
            })
        }
    };

    match term {
        SmtTerm::Var(name) => lookup(vars, name, context),
        SmtTerm::Pre(name) => {
            if !allow_pre {
                return Err(SpecificationError::UnexpectedPre {
                    context: context.to_string(),
                    name: name.clone(),
                });
            }
            lookup(vars, name, context)
        }
        SmtTerm::IntLit(_) => Ok(SmtSort::Int),
        SmtTerm::BoolLit(_) => Ok(SmtSort::Bool),
        SmtTerm::Add(l, r) | SmtTerm::Sub(l, r) | SmtTerm::Mul(l, r) => {
            expect(l, SmtSort::Int)?;
            expect(r, SmtSort::Int)?;
            Ok(SmtSort::Int)
        }
        SmtTerm::Lt(l, r) | SmtTerm::Le(l, r) | SmtTerm::Gt(l, r) | SmtTerm::Ge(l, r) => {
            expect(l, SmtSort::Int)?;
            expect(r, SmtSort::Int)?;
            Ok(SmtSort::Bool)
        }
        SmtTerm::Eq(l, r) => {
            let sort = infer_sort(l, vars, context, allow_pre)?;
            expect(r, sort)?;
            Ok(SmtSort::Bool)
        }
        SmtTerm::And(terms) | SmtTerm::Or(terms) => {
            for t in terms {
                expect(t, SmtSort::Bool)?;
            }
            Ok(SmtSort::Bool)
        }
        SmtTerm::Not(inner) => {
            expect(inner, SmtSort::Bool)?;
            Ok(SmtSort::Bool)
        }
        SmtTerm::Implies(l, r) => {
            expect(l, SmtSort::Bool)?;
            expect(r, SmtSort::Bool)?;
            Ok(SmtSort::Bool)
        }
        SmtTerm::Ite(c, t, e) => {
            expect(c, SmtSort::Bool)?;
            let sort = infer_sort(t, vars, context, allow_pre)?;
            expect(e, sort)?;
            Ok(sort)
        }
    }
}

fn lookup(vars: &HashMap<&str, SmtSort>, name: &str, context: &str) -> Result<SmtSort, SpecificationError> {
    vars.get(name)
        .copied()
        .ok_or_else(|| SpecificationError::UnknownVariable {
            context: context.to_string(),
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> Specification {
        let x = || SmtTerm::var("x");
        Specification::new(
            vec![("x".into(), SmtSort::Int)],
            x().eq(SmtTerm::int(0)),
            x().eq(SmtTerm::pre("x").add(SmtTerm::int(1))),
        )
        .with_property("nonneg", x().ge(SmtTerm::int(0)))
    }

    #[test]
    fn instantiate_shifts_pre_to_previous_step() {
        let spec = counter();
        assert_eq!(
            spec.transition_at(0),
            SmtTerm::var("x@0").eq(SmtTerm::var("x@-1").add(SmtTerm::int(1)))
        );
        assert_eq!(spec.init_at(0), SmtTerm::var("x@0").eq(SmtTerm::int(0)));
        assert_eq!(spec.step_vars(3), vec![("x@3".to_string(), SmtSort::Int)]);
    }

    #[test]
    fn well_formed_counter_validates() {
        assert_eq!(counter().validate(), Ok(()));
    }

    #[test]
    fn duplicate_property_names_are_rejected() {
        let spec = counter().with_property("nonneg", SmtTerm::bool(true));
        assert_eq!(
            spec.validate(),
            Err(SpecificationError::DuplicateProperty("nonneg".into()))
        );
    }

    #[test]
    fn pre_outside_transition_is_rejected() {
        let spec = counter().with_property("bad", SmtTerm::pre("x").ge(SmtTerm::int(0)));
        assert!(matches!(
            spec.validate(),
            Err(SpecificationError::UnexpectedPre { .. })
        ));
    }

    #[test]
    fn sort_errors_are_reported() {
        let spec = counter().with_property("int", SmtTerm::var("x").add(SmtTerm::int(1)));
        assert!(matches!(spec.validate(), Err(SpecificationError::NotBoolean { .. })));

        let spec = counter().with_property("undeclared", SmtTerm::var("y").ge(SmtTerm::int(0)));
        assert!(matches!(
            spec.validate(),
            Err(SpecificationError::UnknownVariable { .. })
        ));
    }
}

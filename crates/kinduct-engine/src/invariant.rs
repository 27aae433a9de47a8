//! Step-indexed formulas shared between engines, and the label map used while
//! they are asserted.

use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use kinduct_smt::backends::smtlib_printer::to_smtlib;
use kinduct_smt::session::Label;
use kinduct_smt::terms::SmtTerm;
use serde::Serialize;

use crate::specification::{instantiate, Property};

/// A formula template usable both as a proof target and as a strengthening
/// fact. Two invariants are equal iff their canonical SMT-LIB text matches;
/// the name is only for display and lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Invariant {
    name: String,
    #[serde(skip)]
    template: SmtTerm,
    #[serde(rename = "formula")]
    canonical: String,
}

impl Invariant {
    pub fn new(name: impl Into<String>, template: SmtTerm) -> Self {
        let canonical = to_smtlib(&template);
        Self {
            name: name.into(),
            template,
            canonical,
        }
    }

    /// An invariant named after its own formula.
    pub fn generated(template: SmtTerm) -> Self {
        let canonical = to_smtlib(&template);
        Self {
            name: canonical.clone(),
            template,
            canonical,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &SmtTerm {
        &self.template
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn instantiate(&self, step: i64) -> SmtTerm {
        instantiate(&self.template, step)
    }

    /// `self@from ∧ … ∧ self@to`.
    pub fn instantiate_range(&self, from: i64, to: i64) -> SmtTerm {
        SmtTerm::and((from..=to).map(|i| self.instantiate(i)).collect())
    }
}

impl From<&Property> for Invariant {
    fn from(property: &Property) -> Self {
        Invariant::new(property.name.clone(), property.formula.clone())
    }
}

impl PartialEq for Invariant {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Invariant {}

impl Hash for Invariant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Conjunction of every invariant instantiated at `step`.
pub fn conjoin<'a>(invariants: impl IntoIterator<Item = &'a Invariant>, step: i64) -> SmtTerm {
    SmtTerm::and(invariants.into_iter().map(|inv| inv.instantiate(step)).collect())
}

/// Bidirectional map between live labels and the invariants they assert:
/// at most one label per invariant and one invariant per label.
#[derive(Debug, Default)]
pub struct Labelling {
    by_label: IndexMap<Label, Invariant>,
    by_invariant: IndexMap<Invariant, Label>,
}

impl Labelling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `label` for `invariant`, returning the label it replaces.
    pub fn insert(&mut self, label: Label, invariant: Invariant) -> Option<Label> {
        let stale = self.remove_invariant(&invariant);
        if let Some(previous) = self.by_label.shift_remove(&label) {
            self.by_invariant.shift_remove(&previous);
        }
        self.by_invariant.insert(invariant.clone(), label);
        self.by_label.insert(label, invariant);
        stale
    }

    /// Forget `invariant`, returning its label if it had one.
    pub fn remove_invariant(&mut self, invariant: &Invariant) -> Option<Label> {
        let label = self.by_invariant.shift_remove(invariant)?;
        self.by_label.shift_remove(&label);
        Some(label)
    }

    pub fn invariant(&self, label: Label) -> Option<&Invariant> {
        self.by_label.get(&label)
    }

    pub fn label(&self, invariant: &Invariant) -> Option<Label> {
        self.by_invariant.get(invariant).copied()
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.by_label.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

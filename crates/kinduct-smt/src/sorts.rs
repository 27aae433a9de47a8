use std::fmt;

use serde::Serialize;

use crate::solver::ModelValue;

/// Sorts of state variables and step-instantiated constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtSort {
    Bool,
    Int,
}

impl SmtSort {
    /// SMT-LIB name of the sort.
    pub fn as_str(self) -> &'static str {
        match self {
            SmtSort::Bool => "Bool",
            SmtSort::Int => "Int",
        }
    }

    /// Value given to an unconstrained variable of this sort.
    pub fn witness(self) -> ModelValue {
        match self {
            SmtSort::Bool => ModelValue::Bool(false),
            SmtSort::Int => ModelValue::Int(0),
        }
    }

    pub fn admits(self, value: ModelValue) -> bool {
        matches!(
            (self, value),
            (SmtSort::Bool, ModelValue::Bool(_)) | (SmtSort::Int, ModelValue::Int(_))
        )
    }
}

impl fmt::Display for SmtSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

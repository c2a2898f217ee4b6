//! Context value model.
//!
//! # Responsibility
//! - Define the named-variable state threaded between equation cells.
//! - Offer value-style builders so callers never mutate a snapshot in place.
//!
//! # Invariants
//! - Variable order is insertion order and is preserved through serde.
//! - A `Context` stored on a cell is never edited; propagation builds new ones.

use serde::{Deserialize, Serialize};

/// Type tag for one context variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    /// Concrete numeric value(s), e.g. `2` or `3.5`.
    Numerical,
    /// Symbolic expression(s) that could not be reduced to a number.
    Analytical,
}

/// One named value in a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    /// Serialized as `type` to match the wire schema.
    #[serde(rename = "type")]
    pub kind: VariableType,
    /// One or more value strings; multiple values model multi-root solutions.
    pub values: Vec<String>,
}

impl Variable {
    pub fn numerical(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VariableType::Numerical,
            values: vec![value.into()],
        }
    }

    pub fn analytical(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VariableType::Analytical,
            values: vec![value.into()],
        }
    }

    /// Returns the first value, which is the canonical one for single-valued variables.
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// Ordered world state immediately after one equation cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    variables: Vec<Variable>,
}

impl Context {
    /// Returns a context with no variables.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_variables(variables: Vec<Variable>) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Looks up a variable by exact name.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    /// Builds a new context with `variable` set.
    ///
    /// A same-named variable is replaced at its existing position; otherwise
    /// the variable is appended. `self` is left untouched.
    pub fn with_variable(&self, variable: Variable) -> Self {
        let mut variables = self.variables.clone();
        match variables.iter_mut().find(|existing| existing.name == variable.name) {
            Some(slot) => *slot = variable,
            None => variables.push(variable),
        }
        Self { variables }
    }
}

#[cfg(test)]
mod tests {
    use super::{Context, Variable, VariableType};

    #[test]
    fn empty_context_has_no_variables() {
        let context = Context::empty();
        assert!(context.is_empty());
        assert_eq!(context.len(), 0);
    }

    #[test]
    fn with_variable_replaces_in_place_and_keeps_original() {
        let base = Context::empty()
            .with_variable(Variable::numerical("x", "1"))
            .with_variable(Variable::numerical("y", "2"));
        let next = base.with_variable(Variable::analytical("x", "a+b"));

        assert_eq!(base.get("x").and_then(Variable::first_value), Some("1"));
        assert_eq!(next.variables()[0].name, "x");
        assert_eq!(next.variables()[0].kind, VariableType::Analytical);
        assert_eq!(next.variables()[1].name, "y");
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn variable_serializes_with_type_tag() {
        let json = serde_json::to_value(Variable::numerical("x", "2")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "x", "type": "numerical", "values": ["2"]})
        );
    }
}

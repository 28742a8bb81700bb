//! Named values attached to records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_common::Name;

/// The value of a [`Variable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VarValue {
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Double(f64),
    /// A string.
    Str(Name),
    /// A boolean.
    Bool(bool),
    /// An integer array.
    IntArray(Arc<[i64]>),
    /// A string array.
    StrArray(Arc<[Name]>),
}

/// How a variable is shown when its owner is drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextDescriptor {
    /// The value is drawn at all.
    pub displayed: bool,
    /// Drawn only when looking inside the owning cell.
    pub interior: bool,
    /// Copied onto instances of the owning cell.
    pub inherit: bool,
}

/// A key/value pair attached to a node, arc, export, cell, or library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable key, unique within its owner.
    pub key: Name,
    /// Value.
    pub value: VarValue,
    /// Display attributes.
    pub descriptor: TextDescriptor,
}

impl Variable {
    /// Creates a hidden variable.
    pub fn new(key: &str, value: VarValue) -> Self {
        Self {
            key: Name::new(key),
            value,
            descriptor: TextDescriptor::default(),
        }
    }

    /// Returns the variable with different display attributes.
    pub fn with_descriptor(mut self, descriptor: TextDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }
}

/// An immutable list of variables sorted by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(Arc<[Variable]>);

impl Default for Variables {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl Variables {
    /// Looks up a variable by key.
    pub fn get(&self, key: &str) -> Option<&Variable> {
        self.search(key).ok().map(|i| &self.0[i])
    }

    /// Iterates in key order.
    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.0.iter()
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if both lists share storage.
    pub fn ptr_eq(&self, other: &Variables) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn search(&self, key: &str) -> Result<usize, usize> {
        self.0.binary_search_by(|v| v.key.as_str().cmp(key))
    }

    /// The list with `var` added or replaced, or `None` if it is already
    /// present with the same value.
    pub(crate) fn with(&self, var: Variable) -> Option<Variables> {
        let mut vars = self.0.to_vec();
        match self.search(&var.key) {
            Ok(i) if self.0[i] == var => return None,
            Ok(i) => vars[i] = var,
            Err(i) => vars.insert(i, var),
        }
        Some(Self(Arc::from(vars)))
    }

    /// The list without `key`, or `None` if it has no such key.
    pub(crate) fn without(&self, key: &str) -> Option<Variables> {
        let i = self.search(key).ok()?;
        let mut vars = self.0.to_vec();
        vars.remove(i);
        Some(Self(Arc::from(vars)))
    }

    /// Returns `true` if some displayed variable is drawn only inside the cell.
    pub fn has_interior_text(&self) -> bool {
        self.0
            .iter()
            .any(|v| v.descriptor.displayed && v.descriptor.interior)
    }
}

impl<'a> IntoIterator for &'a Variables {
    type Item = &'a Variable;
    type IntoIter = std::slice::Iter<'a, Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kept_sorted_by_key() {
        let vars = Variables::default()
            .with(Variable::new("zeta", VarValue::Int(1)))
            .unwrap()
            .with(Variable::new("alpha", VarValue::Bool(true)))
            .unwrap();
        let keys: Vec<&str> = vars.iter().map(|v| v.key.as_str()).collect();
        assert_eq!(keys, ["alpha", "zeta"]);
        assert_eq!(vars.get("zeta").unwrap().value, VarValue::Int(1));
    }

    #[test]
    fn same_value_is_no_change() {
        let vars = Variables::default()
            .with(Variable::new("k", VarValue::Double(2.5)))
            .unwrap();
        assert!(vars.with(Variable::new("k", VarValue::Double(2.5))).is_none());
        assert!(vars.with(Variable::new("k", VarValue::Double(3.0))).is_some());
        assert!(vars.without("missing").is_none());
        assert!(vars.without("k").unwrap().is_empty());
    }

    #[test]
    fn interior_text_needs_display() {
        let hidden = Variable::new("t", VarValue::Str("x".into())).with_descriptor(TextDescriptor {
            displayed: false,
            interior: true,
            inherit: false,
        });
        let vars = Variables::default().with(hidden).unwrap();
        assert!(!vars.has_interior_text());
    }

    #[test]
    fn serde_roundtrip() {
        let vars = Variables::default()
            .with(Variable::new("names", VarValue::StrArray(Arc::from(vec![Name::new("a")]))))
            .unwrap();
        let json = serde_json::to_string(&vars).unwrap();
        let back: Variables = serde_json::from_str(&json).unwrap();
        assert_eq!(vars, back);
    }
}

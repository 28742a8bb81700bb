//! Cheaply clonable immutable names.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// An immutable, reference-counted string used for node, arc, and export names.
///
/// Content records are copied on every edit; sharing the name buffer keeps
/// those copies cheap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(Arc<str>);

impl Name {
    /// Creates a name from a string slice.
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty name.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_buffer() {
        let a = Name::new("net@12");
        let b = a.clone();
        assert!(std::ptr::eq(a.as_str(), b.as_str()));
    }

    #[test]
    fn compares_by_content() {
        assert_eq!(Name::from("clk"), Name::from(String::from("clk")));
        assert!(Name::from("a") < Name::from("b"));
    }

    #[test]
    fn serde_is_plain_string() {
        let json = serde_json::to_string(&Name::new("out")).unwrap();
        assert_eq!(json, "\"out\"");
        let back: Name = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "out");
    }
}

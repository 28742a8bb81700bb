//! Interned identifiers backing the name tables of the id registry.

use lasso::ThreadedRodeo;
use serde::{Deserialize, Serialize};

/// An interned string handle.
///
/// The registry keys its name→id maps by `Ident` so lookups hash a `u32`
/// instead of a string. An `Ident` is only meaningful together with the
/// [`Interner`] that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ident(u32);

impl Ident {
    /// Creates an `Ident` from a raw `u32` index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index of this identifier.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

// SAFETY: `Ident` wraps a `u32`, which always fits in a `usize` on supported
// platforms. `try_from_usize` rejects values that don't fit in `u32`.
unsafe impl lasso::Key for Ident {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(Ident)
    }
}

/// Thread-safe string interner backed by [`lasso::ThreadedRodeo`].
///
/// Interning never blocks readers of previously interned strings, so the
/// registry can resolve names while another thread registers new ones.
pub struct Interner {
    rodeo: ThreadedRodeo<Ident>,
}

impl Interner {
    /// Creates a new empty interner.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Interns a string, returning its [`Ident`]. Already-interned strings
    /// return their existing identifier.
    pub fn get_or_intern(&self, s: &str) -> Ident {
        self.rodeo.get_or_intern(s)
    }

    /// Looks up a string without interning it.
    pub fn get(&self, s: &str) -> Option<Ident> {
        self.rodeo.get(s)
    }

    /// Resolves an [`Ident`] back to its string value.
    ///
    /// # Panics
    ///
    /// Panics if the `Ident` was not created by this interner.
    pub fn resolve(&self, ident: Ident) -> &str {
        self.rodeo.resolve(&ident)
    }

    /// Returns the number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    /// Returns `true` if nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_resolve_roundtrip() {
        let interner = Interner::new();
        let id = interner.get_or_intern("inverter{sch}");
        assert_eq!(interner.resolve(id), "inverter{sch}");
    }

    #[test]
    fn same_string_same_ident() {
        let interner = Interner::new();
        let a = interner.get_or_intern("vdd");
        let b = interner.get_or_intern("vdd");
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn get_does_not_intern() {
        let interner = Interner::new();
        assert!(interner.get("gnd").is_none());
        assert!(interner.is_empty());
        let id = interner.get_or_intern("gnd");
        assert_eq!(interner.get("gnd"), Some(id));
    }

    #[test]
    fn serde_roundtrip() {
        let id = Ident(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: Ident = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}

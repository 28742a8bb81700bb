//! Cell names: a base name plus a view.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IdError;

/// The view of a cell. Cells sharing a library and base name form a group.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum View {
    /// Physical layout.
    Layout,
    /// Schematic drawing.
    Schematic,
    /// Icon used to instantiate the schematic elsewhere.
    Icon,
}

impl View {
    /// Short name used inside braces, e.g. `sch`.
    pub fn abbreviation(self) -> &'static str {
        match self {
            View::Layout => "lay",
            View::Schematic => "sch",
            View::Icon => "ic",
        }
    }

    fn from_abbreviation(s: &str) -> Option<View> {
        match s {
            "lay" => Some(View::Layout),
            "sch" => Some(View::Schematic),
            "ic" => Some(View::Icon),
            _ => None,
        }
    }
}

/// A full cell name such as `inverter{sch}`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct CellName {
    /// Base name shared by the cell group.
    pub name: String,
    /// View of this cell.
    pub view: View,
}

impl CellName {
    /// Creates a cell name.
    pub fn new(name: impl Into<String>, view: View) -> Self {
        Self {
            name: name.into(),
            view,
        }
    }

    /// The same base name in another view.
    pub fn with_view(&self, view: View) -> CellName {
        CellName::new(self.name.clone(), view)
    }
}

impl fmt::Display for CellName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.name, self.view.abbreviation())
    }
}

impl FromStr for CellName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, IdError> {
        let bad = || IdError::BadCellName(s.to_string());
        let open = s.find('{').ok_or_else(bad)?;
        let rest = s[open + 1..].strip_suffix('}').ok_or_else(bad)?;
        let name = &s[..open];
        if name.is_empty() || name.contains(['{', '}']) {
            return Err(bad());
        }
        let view = View::from_abbreviation(rest).ok_or_else(bad)?;
        Ok(CellName::new(name, view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse() {
        let name = CellName::new("nand2", View::Schematic);
        assert_eq!(name.to_string(), "nand2{sch}");
        assert_eq!("nand2{sch}".parse::<CellName>().unwrap(), name);
        assert_eq!(
            "pad{ic}".parse::<CellName>().unwrap().view,
            View::Icon
        );
    }

    #[test]
    fn malformed_names_rejected() {
        for bad in ["nand2", "{lay}", "x{foo}", "x{lay", "a{b}{lay}"] {
            assert!(
                matches!(bad.parse::<CellName>(), Err(IdError::BadCellName(_))),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn with_view_keeps_base() {
        let sch = CellName::new("dff", View::Schematic);
        assert_eq!(sch.with_view(View::Icon).to_string(), "dff{ic}");
    }
}

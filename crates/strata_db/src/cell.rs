//! Immutable cell and library headers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_common::Name;
use strata_ids::{CellId, LibId, TechId};

use crate::flags::CellFlags;
use crate::variable::{Variable, Variables};

/// Cell-level data that is not part of the cell's contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableCell {
    /// The cell.
    pub cell_id: CellId,
    /// Name shared by every view of the same circuit.
    pub group_name: Name,
    /// Technology the cell is drawn in, if any.
    pub tech: Option<TechId>,
    /// Last revision time in milliseconds since the epoch.
    pub revision_date: i64,
    /// Cell flags.
    pub flags: CellFlags,
    /// Attached variables.
    pub vars: Variables,
}

impl ImmutableCell {
    /// Creates a header with no technology and revision date zero.
    pub fn new(cell_id: CellId, group_name: &str) -> Arc<Self> {
        Arc::new(Self {
            cell_id,
            group_name: Name::new(group_name),
            tech: None,
            revision_date: 0,
            flags: CellFlags::empty(),
            vars: Variables::default(),
        })
    }

    fn update(self: &Arc<Self>, f: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut next = Self::clone(self);
        f(&mut next);
        Arc::new(next)
    }

    /// Returns the header with another group name.
    pub fn with_group_name(self: &Arc<Self>, group_name: &str) -> Arc<Self> {
        if self.group_name.as_str() == group_name {
            return Arc::clone(self);
        }
        self.update(|c| c.group_name = Name::new(group_name))
    }

    /// Returns the header with another technology.
    pub fn with_tech(self: &Arc<Self>, tech: Option<TechId>) -> Arc<Self> {
        if self.tech == tech {
            return Arc::clone(self);
        }
        self.update(|c| c.tech = tech)
    }

    /// Returns the header with another revision date.
    pub fn with_revision_date(self: &Arc<Self>, revision_date: i64) -> Arc<Self> {
        if self.revision_date == revision_date {
            return Arc::clone(self);
        }
        self.update(|c| c.revision_date = revision_date)
    }

    /// Returns the header with `flag` set or cleared.
    pub fn with_flag(self: &Arc<Self>, flag: CellFlags, on: bool) -> Arc<Self> {
        let flags = self.flags.set(flag, on);
        if flags == self.flags {
            return Arc::clone(self);
        }
        self.update(|c| c.flags = flags)
    }

    /// Returns the header with `var` added or replaced.
    pub fn with_variable(self: &Arc<Self>, var: Variable) -> Arc<Self> {
        match self.vars.with(var) {
            Some(vars) => self.update(|c| c.vars = vars),
            None => Arc::clone(self),
        }
    }

    /// Returns the header without variable `key`.
    pub fn without_variable(self: &Arc<Self>, key: &str) -> Arc<Self> {
        match self.vars.without(key) {
            Some(vars) => self.update(|c| c.vars = vars),
            None => Arc::clone(self),
        }
    }
}

/// Library-level data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableLibrary {
    /// The library.
    pub lib_id: LibId,
    /// Library name.
    pub name: Name,
    /// Attached variables.
    pub vars: Variables,
}

impl ImmutableLibrary {
    /// Creates a library header.
    pub fn new(lib_id: LibId, name: &str) -> Arc<Self> {
        Arc::new(Self {
            lib_id,
            name: Name::new(name),
            vars: Variables::default(),
        })
    }

    /// Returns the header renamed.
    pub fn with_name(self: &Arc<Self>, name: &str) -> Arc<Self> {
        if self.name.as_str() == name {
            return Arc::clone(self);
        }
        let mut next = Self::clone(self);
        next.name = Name::new(name);
        Arc::new(next)
    }

    /// Returns the header with `var` added or replaced.
    pub fn with_variable(self: &Arc<Self>, var: Variable) -> Arc<Self> {
        match self.vars.with(var) {
            Some(vars) => {
                let mut next = Self::clone(self);
                next.vars = vars;
                Arc::new(next)
            }
            None => Arc::clone(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VarValue;

    #[test]
    fn no_op_updates_return_same_instance() {
        let c = ImmutableCell::new(CellId::from_raw(1), "inv");
        assert!(Arc::ptr_eq(&c, &c.with_group_name("inv")));
        assert!(Arc::ptr_eq(&c, &c.with_tech(None)));
        assert!(Arc::ptr_eq(&c, &c.with_revision_date(0)));
        assert!(Arc::ptr_eq(&c, &c.with_flag(CellFlags::CONTENTS_LOCKED, false)));

        let l = ImmutableLibrary::new(LibId::from_raw(0), "lib");
        assert!(Arc::ptr_eq(&l, &l.with_name("lib")));
        let v = l.with_variable(Variable::new("k", VarValue::Bool(true)));
        assert!(Arc::ptr_eq(&v, &v.with_variable(Variable::new("k", VarValue::Bool(true)))));
    }
}

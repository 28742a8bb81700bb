//! Immutable exports.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_common::Name;
use strata_ids::{ExportId, NodeId, PortProtoId};

use crate::variable::{Variable, Variables};

/// Electrical role of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortCharacteristic {
    /// Not specified.
    #[default]
    Unknown,
    /// Input.
    Input,
    /// Output.
    Output,
    /// Bidirectional.
    Bidirectional,
    /// Power supply.
    Power,
    /// Ground.
    Ground,
    /// Clock.
    Clock,
}

/// A named external port of a cell, bound to a port of one of its nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableExport {
    /// Id; its cell is the cell holding this export.
    pub export_id: ExportId,
    /// Export name.
    pub name: Name,
    /// Node whose port is exported.
    pub original_node: NodeId,
    /// Exported port on that node.
    pub original_port: PortProtoId,
    /// Electrical role.
    pub characteristic: PortCharacteristic,
    /// Drawn even when the owning instance is not expanded.
    pub always_drawn: bool,
    /// Exists only on the body of an icon.
    pub body_only: bool,
    /// Attached variables.
    pub vars: Variables,
}

impl ImmutableExport {
    /// Creates an export with default attributes.
    pub fn new(
        export_id: ExportId,
        name: &str,
        original_node: NodeId,
        original_port: impl Into<PortProtoId>,
    ) -> Arc<Self> {
        Arc::new(Self {
            export_id,
            name: Name::new(name),
            original_node,
            original_port: original_port.into(),
            characteristic: PortCharacteristic::Unknown,
            always_drawn: false,
            body_only: false,
            vars: Variables::default(),
        })
    }

    fn update(self: &Arc<Self>, f: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut next = Self::clone(self);
        f(&mut next);
        Arc::new(next)
    }

    /// Returns the export renamed.
    pub fn with_name(self: &Arc<Self>, name: &str) -> Arc<Self> {
        if self.name.as_str() == name {
            return Arc::clone(self);
        }
        self.update(|e| e.name = Name::new(name))
    }

    /// Returns the export moved to another node port.
    pub fn with_original_port(self: &Arc<Self>, node: NodeId, port: PortProtoId) -> Arc<Self> {
        if self.original_node == node && self.original_port == port {
            return Arc::clone(self);
        }
        self.update(|e| {
            e.original_node = node;
            e.original_port = port;
        })
    }

    /// Returns the export with another characteristic.
    pub fn with_characteristic(self: &Arc<Self>, characteristic: PortCharacteristic) -> Arc<Self> {
        if self.characteristic == characteristic {
            return Arc::clone(self);
        }
        self.update(|e| e.characteristic = characteristic)
    }

    /// Returns the export with the always-drawn attribute changed.
    pub fn with_always_drawn(self: &Arc<Self>, always_drawn: bool) -> Arc<Self> {
        if self.always_drawn == always_drawn {
            return Arc::clone(self);
        }
        self.update(|e| e.always_drawn = always_drawn)
    }

    /// Returns the export with the body-only attribute changed.
    pub fn with_body_only(self: &Arc<Self>, body_only: bool) -> Arc<Self> {
        if self.body_only == body_only {
            return Arc::clone(self);
        }
        self.update(|e| e.body_only = body_only)
    }

    /// Returns the export with `var` added or replaced.
    pub fn with_variable(self: &Arc<Self>, var: Variable) -> Arc<Self> {
        match self.vars.with(var) {
            Some(vars) => self.update(|e| e.vars = vars),
            None => Arc::clone(self),
        }
    }

    /// Returns the export without variable `key`.
    pub fn without_variable(self: &Arc<Self>, key: &str) -> Arc<Self> {
        match self.vars.without(key) {
            Some(vars) => self.update(|e| e.vars = vars),
            None => Arc::clone(self),
        }
    }
}

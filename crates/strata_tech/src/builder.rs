//! Incremental construction of a [`Technology`].

use std::sync::Arc;

use strata_ids::{ArcProtoId, IdRegistry, PrimitiveNodeId, TechId};

use crate::error::TechError;
use crate::types::{ArcProto, PrimitiveFunction, PrimitiveNode, PrimitivePort, Technology};

/// Declaration of one primitive port.
#[derive(Clone, Copy, Debug)]
pub struct PortSpec<'a> {
    /// Port name.
    pub name: &'a str,
    /// Topology group within the node.
    pub topology: u32,
    /// Arc prototypes allowed to attach.
    pub arcs: &'a [ArcProtoId],
}

/// Builds a technology, registering every id with the registry as it goes.
///
/// Building the same technology twice against one registry yields the same
/// ids, since registry factories are idempotent.
pub struct TechBuilder<'r> {
    registry: &'r IdRegistry,
    id: TechId,
    name: String,
    nodes: Vec<PrimitiveNode>,
    arcs: Vec<ArcProto>,
}

impl<'r> TechBuilder<'r> {
    /// Starts a technology named `name`.
    pub fn new(registry: &'r IdRegistry, name: &str) -> Result<Self, TechError> {
        let id = registry.new_tech_id(name)?;
        Ok(Self {
            registry,
            id,
            name: name.to_string(),
            nodes: Vec::new(),
            arcs: Vec::new(),
        })
    }

    /// The id of the technology under construction.
    pub fn id(&self) -> TechId {
        self.id
    }

    /// Declares an arc prototype.
    pub fn add_arc(
        &mut self,
        name: &str,
        default_width: f64,
        wipable: bool,
        easy_shape: bool,
    ) -> Result<ArcProtoId, TechError> {
        check_dimension(name, default_width)?;
        let id = self.registry.new_arc_proto_id(self.id, name)?;
        if id.index() as usize != self.arcs.len() {
            return Err(TechError::Redefined(name.to_string()));
        }
        self.arcs.push(ArcProto {
            id,
            name: name.to_string(),
            default_width,
            wipable,
            easy_shape,
            extended: default_width > 0.0,
        });
        Ok(id)
    }

    /// Declares a primitive node with its ports.
    ///
    /// `flags` is `(arcs_wipe, arcs_shrink)`.
    pub fn add_node(
        &mut self,
        name: &str,
        function: PrimitiveFunction,
        size: (f64, f64),
        flags: (bool, bool),
        ports: &[PortSpec<'_>],
    ) -> Result<PrimitiveNodeId, TechError> {
        check_dimension(name, size.0)?;
        check_dimension(name, size.1)?;
        let id = self.registry.new_primitive_node_id(self.id, name)?;
        if id.index() as usize != self.nodes.len() {
            return Err(TechError::Redefined(name.to_string()));
        }
        if ports.is_empty() {
            return Err(TechError::NoPorts(id));
        }
        let mut built = Vec::with_capacity(ports.len());
        for spec in ports {
            if let Some(&arc) = spec.arcs.iter().find(|a| a.tech() != self.id) {
                return Err(TechError::ForeignArc { node: id, arc });
            }
            let port_id = self.registry.new_primitive_port_id(id, spec.name)?;
            if port_id.chron() as usize != built.len() {
                return Err(TechError::Redefined(format!("{name}.{}", spec.name)));
            }
            built.push(PrimitivePort {
                id: port_id,
                name: spec.name.to_string(),
                topology: spec.topology,
                connections: spec.arcs.to_vec(),
            });
        }
        self.nodes.push(PrimitiveNode::new(
            id,
            name.to_string(),
            function,
            size,
            flags.0,
            flags.1,
            built,
        ));
        Ok(id)
    }

    /// Finishes the technology.
    pub fn build(self) -> Arc<Technology> {
        Arc::new(Technology {
            id: self.id,
            name: self.name,
            nodes: self.nodes,
            arcs: self.arcs,
        })
    }
}

fn check_dimension(what: &str, value: f64) -> Result<(), TechError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TechError::BadDimension {
            what: what.to_string(),
            value,
        })
    }
}

//! Technology table types.

use serde::{Deserialize, Serialize};
use strata_ids::{ArcProtoId, PrimitiveNodeId, PrimitivePortId, TechId};

/// Electrical role of a primitive node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PrimitiveFunction {
    /// A wire junction with a single port.
    Pin,
    /// A layer-to-layer contact.
    Contact,
    /// A plain layer rectangle.
    Node,
    /// A transistor.
    Transistor,
    /// A simple two-terminal resistor.
    Resistor,
    /// A programmable or otherwise complex resistor.
    ComplexResistor,
    /// The cell origin marker.
    CellCenter,
    /// An invisible pin that only carries annotation text.
    InvisiblePin,
}

/// Connectivity policy for port equivalence, from finest to coarsest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EquivPolicy {
    /// Only topological short-circuits inside primitives.
    N,
    /// Additionally shorts simple resistors.
    P,
    /// Additionally shorts complex resistors.
    A,
}

impl EquivPolicy {
    /// All policies in pass order.
    pub const ALL: [EquivPolicy; 3] = [EquivPolicy::N, EquivPolicy::P, EquivPolicy::A];

    fn slot(self) -> usize {
        self as usize
    }
}

/// A port on a primitive node.
#[derive(Clone, Debug)]
pub struct PrimitivePort {
    /// Port id.
    pub id: PrimitivePortId,
    /// Port name.
    pub name: String,
    /// Ports of one node sharing a topology number are always connected.
    pub topology: u32,
    /// Arc prototypes that may attach to this port.
    pub connections: Vec<ArcProtoId>,
}

impl PrimitivePort {
    /// Returns `true` if an arc of `proto` may attach here.
    pub fn connects(&self, proto: ArcProtoId) -> bool {
        self.connections.contains(&proto)
    }
}

/// A primitive node prototype.
#[derive(Clone, Debug)]
pub struct PrimitiveNode {
    /// Node id.
    pub id: PrimitiveNodeId,
    /// Node name.
    pub name: String,
    /// Electrical role.
    pub function: PrimitiveFunction,
    /// Default instance width.
    pub default_width: f64,
    /// Default instance height.
    pub default_height: f64,
    /// Instances may be hidden when only wipable arcs attach.
    pub arcs_wipe: bool,
    /// Attached arc ends are shrunk at non-straight junctions.
    pub arcs_shrink: bool,
    /// Ports ordered by chronological index.
    pub ports: Vec<PrimitivePort>,
    equivalence: [Vec<u32>; 3],
}

impl PrimitiveNode {
    pub(crate) fn new(
        id: PrimitiveNodeId,
        name: String,
        function: PrimitiveFunction,
        size: (f64, f64),
        arcs_wipe: bool,
        arcs_shrink: bool,
        ports: Vec<PrimitivePort>,
    ) -> Self {
        let equivalence = compute_equivalence(function, &ports);
        Self {
            id,
            name,
            function,
            default_width: size.0,
            default_height: size.1,
            arcs_wipe,
            arcs_shrink,
            ports,
            equivalence,
        }
    }

    /// The port with chronological index `chron`.
    pub fn port(&self, chron: u32) -> Option<&PrimitivePort> {
        self.ports.get(chron as usize)
    }

    /// Number of ports.
    pub fn num_ports(&self) -> usize {
        self.ports.len()
    }

    /// Port equivalence under `policy`: entry `i` is the smallest port index
    /// connected to port `i` inside this primitive.
    pub fn port_equivalence(&self, policy: EquivPolicy) -> &[u32] {
        &self.equivalence[policy.slot()]
    }

    /// Returns `true` if the equivalence table differs between two policies.
    pub fn equivalence_changes(&self, from: EquivPolicy, to: EquivPolicy) -> bool {
        self.equivalence[from.slot()] != self.equivalence[to.slot()]
    }

    /// Returns `true` for wire pins.
    pub fn is_pin(&self) -> bool {
        self.function == PrimitiveFunction::Pin
    }
}

fn compute_equivalence(function: PrimitiveFunction, ports: &[PrimitivePort]) -> [Vec<u32>; 3] {
    let topological: Vec<u32> = ports
        .iter()
        .map(|p| {
            ports
                .iter()
                .position(|q| q.topology == p.topology)
                .unwrap_or(0) as u32
        })
        .collect();
    let shorted = vec![0u32; ports.len()];
    let parasitic = if function == PrimitiveFunction::Resistor {
        shorted.clone()
    } else {
        topological.clone()
    };
    let all = match function {
        PrimitiveFunction::Resistor | PrimitiveFunction::ComplexResistor => shorted,
        _ => topological.clone(),
    };
    [topological, parasitic, all]
}

/// An arc (wire) prototype.
#[derive(Clone, Debug)]
pub struct ArcProto {
    /// Arc prototype id.
    pub id: ArcProtoId,
    /// Arc prototype name.
    pub name: String,
    /// Default full width.
    pub default_width: f64,
    /// Pins whose arcs are all wipable may be hidden.
    pub wipable: bool,
    /// Manhattan instances have exact rectangular bounds.
    pub easy_shape: bool,
    /// New instances extend past their end points by half the width.
    pub extended: bool,
}

/// A technology: primitive nodes and arc prototypes under one [`TechId`].
#[derive(Clone, Debug)]
pub struct Technology {
    pub(crate) id: TechId,
    pub(crate) name: String,
    pub(crate) nodes: Vec<PrimitiveNode>,
    pub(crate) arcs: Vec<ArcProto>,
}

impl Technology {
    /// Technology id.
    pub fn id(&self) -> TechId {
        self.id
    }

    /// Technology name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primitive nodes in chronological order.
    pub fn nodes(&self) -> &[PrimitiveNode] {
        &self.nodes
    }

    /// Arc prototypes in chronological order.
    pub fn arcs(&self) -> &[ArcProto] {
        &self.arcs
    }

    /// Looks up a primitive node of this technology.
    pub fn primitive_node(&self, id: PrimitiveNodeId) -> Option<&PrimitiveNode> {
        if id.tech() != self.id {
            return None;
        }
        self.nodes.get(id.index() as usize)
    }

    /// Looks up a primitive port of this technology.
    pub fn primitive_port(&self, id: PrimitivePortId) -> Option<&PrimitivePort> {
        self.primitive_node(id.node())?.port(id.chron())
    }

    /// Looks up an arc prototype of this technology.
    pub fn arc_proto(&self, id: ArcProtoId) -> Option<&ArcProto> {
        if id.tech() != self.id {
            return None;
        }
        self.arcs.get(id.index() as usize)
    }

    /// Finds a primitive node by name.
    pub fn find_node(&self, name: &str) -> Option<&PrimitiveNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Finds an arc prototype by name.
    pub fn find_arc(&self, name: &str) -> Option<&ArcProto> {
        self.arcs.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(node: PrimitiveNodeId, chron: u32, topology: u32) -> PrimitivePort {
        PrimitivePort {
            id: node.port(chron),
            name: format!("p{chron}"),
            topology,
            connections: Vec::new(),
        }
    }

    fn node(function: PrimitiveFunction, topologies: &[u32]) -> PrimitiveNode {
        let id = PrimitiveNodeId::new(TechId::from_raw(0), 0);
        let ports = topologies
            .iter()
            .enumerate()
            .map(|(i, &t)| port(id, i as u32, t))
            .collect();
        PrimitiveNode::new(id, "n".into(), function, (1.0, 1.0), false, false, ports)
    }

    #[test]
    fn transistor_gate_ports_share_topology() {
        let t = node(PrimitiveFunction::Transistor, &[0, 1, 0, 2]);
        assert_eq!(t.port_equivalence(EquivPolicy::N), &[0, 1, 0, 3]);
        assert!(!t.equivalence_changes(EquivPolicy::N, EquivPolicy::A));
    }

    #[test]
    fn resistor_shorts_under_parasitic() {
        let r = node(PrimitiveFunction::Resistor, &[0, 1]);
        assert_eq!(r.port_equivalence(EquivPolicy::N), &[0, 1]);
        assert_eq!(r.port_equivalence(EquivPolicy::P), &[0, 0]);
        assert_eq!(r.port_equivalence(EquivPolicy::A), &[0, 0]);
        assert!(r.equivalence_changes(EquivPolicy::N, EquivPolicy::P));
        assert!(!r.equivalence_changes(EquivPolicy::P, EquivPolicy::A));
    }

    #[test]
    fn complex_resistor_shorts_only_under_all() {
        let r = node(PrimitiveFunction::ComplexResistor, &[0, 1]);
        assert_eq!(r.port_equivalence(EquivPolicy::P), &[0, 1]);
        assert_eq!(r.port_equivalence(EquivPolicy::A), &[0, 0]);
    }

    #[test]
    fn policies_are_ordered() {
        assert!(EquivPolicy::N < EquivPolicy::P && EquivPolicy::P < EquivPolicy::A);
    }
}

//! Builtin technologies.
//!
//! `generic` carries the administrative primitives every database needs
//! (cell-center marker, invisible annotation pin, universal pin). `cmos` is a
//! small two-metal process with pins, a via, a transistor, and both resistor
//! flavors; it is enough to exercise wiping, shrinkage, and every port
//! equivalence policy.

use std::sync::Arc;

use strata_ids::IdRegistry;

use crate::builder::{PortSpec, TechBuilder};
use crate::error::TechError;
use crate::types::{PrimitiveFunction, Technology};

/// Name of the generic cell-center primitive.
pub const CELL_CENTER: &str = "Facet-Center";
/// Name of the generic invisible pin.
pub const INVISIBLE_PIN: &str = "Invisible-Pin";
/// Name of the generic universal pin.
pub const UNIVERSAL_PIN: &str = "Universal-Pin";

/// Creates a builtin technology by name (`"generic"` or `"cmos"`).
///
/// Ids are registered with `registry`; loading the same technology twice
/// returns tables with identical ids.
pub fn load_technology(registry: &IdRegistry, name: &str) -> Result<Arc<Technology>, TechError> {
    match name {
        "generic" => generic(registry),
        "cmos" => cmos(registry),
        other => Err(TechError::UnknownTechnology(other.to_string())),
    }
}

fn generic(registry: &IdRegistry) -> Result<Arc<Technology>, TechError> {
    let mut b = TechBuilder::new(registry, "generic")?;
    let universal = b.add_arc("Universal", 0.0, true, true)?;
    let unrouted = b.add_arc("Unrouted", 0.0, false, false)?;
    let all = [universal, unrouted];
    b.add_node(
        CELL_CENTER,
        PrimitiveFunction::CellCenter,
        (0.0, 0.0),
        (false, false),
        &[PortSpec { name: "center", topology: 0, arcs: &[] }],
    )?;
    b.add_node(
        INVISIBLE_PIN,
        PrimitiveFunction::InvisiblePin,
        (0.0, 0.0),
        (false, false),
        &[PortSpec { name: "center", topology: 0, arcs: &all }],
    )?;
    b.add_node(
        UNIVERSAL_PIN,
        PrimitiveFunction::Pin,
        (1.0, 1.0),
        (true, false),
        &[PortSpec { name: "center", topology: 0, arcs: &all }],
    )?;
    Ok(b.build())
}

fn cmos(registry: &IdRegistry) -> Result<Arc<Technology>, TechError> {
    let mut b = TechBuilder::new(registry, "cmos")?;
    let m1 = b.add_arc("Metal-1", 3.0, true, true)?;
    let m2 = b.add_arc("Metal-2", 3.0, true, true)?;
    let poly = b.add_arc("Polysilicon", 2.0, false, true)?;

    for (name, arc, size) in [
        ("Metal-1-Pin", m1, 3.0),
        ("Metal-2-Pin", m2, 3.0),
        ("Polysilicon-Pin", poly, 2.0),
    ] {
        b.add_node(
            name,
            PrimitiveFunction::Pin,
            (size, size),
            (true, true),
            &[PortSpec { name: "pin", topology: 0, arcs: &[arc] }],
        )?;
    }
    b.add_node(
        "Metal-1-Metal-2-Con",
        PrimitiveFunction::Contact,
        (5.0, 5.0),
        (false, false),
        &[PortSpec { name: "via", topology: 0, arcs: &[m1, m2] }],
    )?;
    b.add_node(
        "Transistor",
        PrimitiveFunction::Transistor,
        (3.0, 6.0),
        (false, false),
        &[
            PortSpec { name: "gate-left", topology: 0, arcs: &[poly] },
            PortSpec { name: "diff-top", topology: 1, arcs: &[m1] },
            PortSpec { name: "gate-right", topology: 0, arcs: &[poly] },
            PortSpec { name: "diff-bottom", topology: 2, arcs: &[m1] },
        ],
    )?;
    for (name, function) in [
        ("Resistor", PrimitiveFunction::Resistor),
        ("Complex-Resistor", PrimitiveFunction::ComplexResistor),
    ] {
        b.add_node(
            name,
            function,
            (4.0, 8.0),
            (false, false),
            &[
                PortSpec { name: "a", topology: 0, arcs: &[m1, poly] },
                PortSpec { name: "b", topology: 1, arcs: &[m1, poly] },
            ],
        )?;
    }
    Ok(b.build())
}

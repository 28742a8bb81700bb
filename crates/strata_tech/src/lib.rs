//! Technology tables consumed by the Strata design database.
//!
//! A [`Technology`] is an opaque, read-only table of primitive node
//! prototypes (with their ports and connectivity classes) and arc prototypes
//! (with their wiping and shape rules). The database never edits a
//! technology; it resolves the technologies a cell uses into a [`TechPool`]
//! and reads the tables through it.
//!
//! # Usage
//!
//! ```
//! use strata_ids::IdRegistry;
//! use strata_tech::{load_technology, TechPool};
//!
//! let registry = IdRegistry::new();
//! let cmos = load_technology(&registry, "cmos").unwrap();
//! let pool = TechPool::new([cmos.clone()]);
//! assert!(pool.get(cmos.id()).is_some());
//! ```

#![warn(missing_docs)]

pub mod builder;
pub mod builtin;
pub mod error;
pub mod pool;
pub mod shape;
pub mod types;

pub use builder::{PortSpec, TechBuilder};
pub use builtin::{load_technology, CELL_CENTER, INVISIBLE_PIN, UNIVERSAL_PIN};
pub use error::TechError;
pub use pool::TechPool;
pub use types::{ArcProto, EquivPolicy, PrimitiveFunction, PrimitiveNode, PrimitivePort, Technology};

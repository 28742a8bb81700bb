//! Persistent design database for hierarchical layout and schematic cells.
//!
//! Cell content is held in immutable records ([`ImmutableNodeInst`],
//! [`ImmutableArcInst`], [`ImmutableExport`]) collected into a
//! [`CellRevision`]. A [`CellBackup`] binds a revision to the technologies
//! it uses and caches derived connectivity, and a [`Snapshot`] is the
//! whole database at one instant. Consecutive snapshots share everything
//! that did not change.
//!
//! The editable state lives in a [`Database`]. Edits go through a write
//! guard on [`LiveState`]; [`LiveState::backup`] freezes them into a new
//! snapshot and [`LiveState::undo`] returns to an older one.

#![warn(missing_docs)]

pub mod arc;
pub mod backup;
pub mod bounds;
pub mod cell;
pub mod database;
pub mod error;
pub mod export;
pub mod flags;
pub mod hierarchy;
pub mod live;
pub mod memo;
pub mod node;
pub mod persist;
pub mod revision;
pub mod snapshot;
pub mod variable;

pub use arc::{ArcEnd, ImmutableArcInst};
pub use backup::{CellBackup, LibraryBackup};
pub use bounds::Shrinkage;
pub use cell::{ImmutableCell, ImmutableLibrary};
pub use database::{Database, LiveState};
pub use error::{DbError, PersistError};
pub use export::{ImmutableExport, PortCharacteristic};
pub use flags::{ArcFlags, CellFlags, NodeFlags};
pub use hierarchy::dependency_order;
pub use live::{Cell, Geom, Library};
pub use memo::Memoization;
pub use node::ImmutableNodeInst;
pub use persist::{read_snapshot, read_snapshot_file, write_snapshot, write_snapshot_file};
pub use revision::{CellRevision, CellUsageInfo};
pub use snapshot::Snapshot;
pub use variable::{TextDescriptor, VarValue, Variable, Variables};

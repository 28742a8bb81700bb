//! Binary snapshot images.
//!
//! An image is a 4-byte little-endian header length, a bincode header
//! holding magic bytes and a payload checksum, then the bincode payload.
//! The payload carries the name of every library, cell, and export id the
//! registry had allocated, so a fresh registry reading it in allocation
//! order hands out the same ids again.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_common::ContentHash;
use strata_ids::{CellId, CellName, ExportId, IdRegistry, LibId, TechId, View};
use strata_tech::TechPool;

use crate::arc::ImmutableArcInst;
use crate::backup::{CellBackup, LibraryBackup};
use crate::cell::{ImmutableCell, ImmutableLibrary};
use crate::error::PersistError;
use crate::export::ImmutableExport;
use crate::node::ImmutableNodeInst;
use crate::revision::CellRevision;
use crate::snapshot::Snapshot;

const SNAPSHOT_MAGIC: [u8; 4] = *b"STRT";

#[derive(Debug, Serialize, Deserialize)]
struct ImageHeader {
    magic: [u8; 4],
    checksum: ContentHash,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdTable {
    techs: Vec<(TechId, String)>,
    libs: Vec<(LibId, String)>,
    cells: Vec<(CellId, LibId, String, View)>,
    exports: Vec<(ExportId, String)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LibImage {
    d: Arc<ImmutableLibrary>,
    modified: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CellImage {
    d: Arc<ImmutableCell>,
    nodes: Vec<Arc<ImmutableNodeInst>>,
    arcs: Vec<Arc<ImmutableArcInst>>,
    exports: Vec<Arc<ImmutableExport>>,
    modified: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotImage {
    ids: IdTable,
    libs: Vec<LibImage>,
    cells: Vec<CellImage>,
}

fn id_table(snapshot: &Snapshot, registry: &IdRegistry) -> Result<IdTable, PersistError> {
    let mut ids = IdTable::default();
    for tech in snapshot.tech_pool.tech_ids() {
        ids.techs.push((tech, registry.tech_name(tech)?.to_string()));
    }
    for i in 0..registry.num_libs() {
        let lib = LibId::from_raw(i as u32);
        ids.libs.push((lib, registry.lib_name(lib)?.to_string()));
    }
    for i in 0..registry.num_cells() {
        let cell = CellId::from_raw(i as u32);
        let name = registry.cell_name(cell)?;
        ids.cells.push((cell, registry.cell_lib(cell)?, name.name, name.view));
        for chron in 0..registry.num_exports(cell)? {
            let export = ExportId::new(cell, chron);
            ids.exports.push((export, registry.export_name(export)?.to_string()));
        }
    }
    Ok(ids)
}

/// Encodes a snapshot together with the identities it refers to.
pub fn write_snapshot(snapshot: &Snapshot, registry: &IdRegistry) -> Result<Vec<u8>, PersistError> {
    let image = SnapshotImage {
        ids: id_table(snapshot, registry)?,
        libs: snapshot
            .lib_backups()
            .iter()
            .flatten()
            .map(|b| LibImage {
                d: Arc::clone(&b.d),
                modified: b.modified,
            })
            .collect(),
        cells: snapshot
            .cell_backups()
            .iter()
            .flatten()
            .map(|b| {
                let rev = &b.revision;
                CellImage {
                    d: Arc::clone(&rev.d),
                    nodes: rev.nodes().to_vec(),
                    arcs: rev.arcs().to_vec(),
                    exports: rev.exports().to_vec(),
                    modified: b.modified,
                }
            })
            .collect(),
    };
    let payload = bincode::serde::encode_to_vec(&image, bincode::config::standard())
        .map_err(|e| PersistError::Encode(e.to_string()))?;

    let header = ImageHeader {
        magic: SNAPSHOT_MAGIC,
        checksum: ContentHash::from_bytes(&payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| PersistError::Encode(e.to_string()))?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);
    Ok(output)
}

fn check_id<T: PartialEq + ToString>(
    kind: &'static str,
    name: &str,
    stored: T,
    resolved: T,
) -> Result<(), PersistError> {
    if stored == resolved {
        return Ok(());
    }
    Err(PersistError::IdMismatch {
        kind,
        name: name.to_string(),
        stored: stored.to_string(),
        resolved: resolved.to_string(),
    })
}

fn resolve_ids(ids: &IdTable, registry: &IdRegistry) -> Result<(), PersistError> {
    for (tech, name) in &ids.techs {
        match registry.find_tech(name) {
            Some(found) => check_id("technology", name, *tech, found)?,
            None => {
                return Err(PersistError::IdMismatch {
                    kind: "technology",
                    name: name.clone(),
                    stored: tech.to_string(),
                    resolved: "nothing".to_string(),
                })
            }
        }
    }
    for (lib, name) in &ids.libs {
        check_id("library", name, *lib, registry.new_lib_id(name)?)?;
    }
    for (cell, lib, name, view) in &ids.cells {
        let cell_name = CellName::new(name.as_str(), *view);
        let resolved = registry.new_cell_id(*lib, &cell_name)?;
        check_id("cell", &cell_name.to_string(), *cell, resolved)?;
    }
    for (export, name) in &ids.exports {
        check_id("export", name, *export, registry.new_export_id(export.cell(), name)?)?;
    }
    Ok(())
}

/// Decodes an image written by [`write_snapshot`].
///
/// Identities are re-resolved in `registry`, which may be fresh or may
/// already hold them; an identity that resolves to a different id is an
/// error. Every backup is rebuilt against `tech_pool` and the resulting
/// snapshot is checked.
pub fn read_snapshot(
    bytes: &[u8],
    registry: &IdRegistry,
    tech_pool: &Arc<TechPool>,
) -> Result<Arc<Snapshot>, PersistError> {
    if bytes.len() < 4 {
        return Err(PersistError::InvalidHeader(format!("{} bytes is too short", bytes.len())));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[..4]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let Some(header_bytes) = bytes.get(4..4 + header_len) else {
        return Err(PersistError::InvalidHeader(format!("header length {header_len} past end")));
    };
    let (header, _): (ImageHeader, usize) =
        bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
            .map_err(|e| PersistError::InvalidHeader(e.to_string()))?;
    if header.magic != SNAPSHOT_MAGIC {
        return Err(PersistError::InvalidHeader(format!("bad magic {:?}", header.magic)));
    }

    let payload = &bytes[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(PersistError::ChecksumMismatch {
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }
    let (image, _): (SnapshotImage, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map_err(|e| PersistError::Decode(e.to_string()))?;

    resolve_ids(&image.ids, registry)?;

    let mut libs: Vec<Option<Arc<LibraryBackup>>> = Vec::new();
    for lib in image.libs {
        let slot = lib.d.lib_id.index();
        if libs.len() <= slot {
            libs.resize(slot + 1, None);
        }
        libs[slot] = Some(Arc::new(LibraryBackup {
            d: lib.d,
            modified: lib.modified,
        }));
    }

    let mut cells: Vec<Option<Arc<CellBackup>>> = Vec::new();
    for cell in image.cells {
        let slot = cell.d.cell_id.index();
        let empty = CellRevision::new(Arc::clone(&cell.d));
        let revision = empty.with(
            registry,
            &cell.d,
            Some(cell.nodes.as_slice()),
            Some(cell.arcs.as_slice()),
            Some(cell.exports.as_slice()),
        )?;
        let backup = CellBackup::new_instance(revision, tech_pool)?.with_modified_flag(cell.modified);
        if cells.len() <= slot {
            cells.resize(slot + 1, None);
        }
        cells[slot] = Some(backup);
    }

    let snapshot = Snapshot::empty(registry, Arc::clone(tech_pool)).with(registry, tech_pool, &cells, &libs)?;
    snapshot.check(registry)?;
    tracing::debug!(
        snapshot = snapshot.id,
        cells = cells.iter().flatten().count(),
        bytes = bytes.len(),
        "snapshot read"
    );
    Ok(snapshot)
}

/// Writes a snapshot image to `path`.
pub fn write_snapshot_file(path: &Path, snapshot: &Snapshot, registry: &IdRegistry) -> Result<(), PersistError> {
    let bytes = write_snapshot(snapshot, registry)?;
    std::fs::write(path, bytes).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a snapshot image from `path`.
pub fn read_snapshot_file(
    path: &Path,
    registry: &IdRegistry,
    tech_pool: &Arc<TechPool>,
) -> Result<Arc<Snapshot>, PersistError> {
    let bytes = std::fs::read(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_snapshot(&bytes, registry, tech_pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::Point;
    use strata_tech::load_technology;

    fn sample(registry: &IdRegistry) -> (Arc<Snapshot>, Arc<TechPool>) {
        let cmos = load_technology(registry, "cmos").unwrap();
        let pool = TechPool::new([Arc::clone(&cmos)]);
        let lib = registry.new_lib_id("work").unwrap();
        let cell = registry.new_cell_id(lib, &CellName::new("inv", View::Layout)).unwrap();
        let pin = cmos.find_node("Metal-1-Pin").unwrap().id;
        let node = ImmutableNodeInst::new(strata_ids::NodeId::from_raw(0), pin.into(), "p", Point::ORIGIN, 3.0, 3.0)
            .unwrap();
        let export = registry.new_export_id(cell, "a").unwrap();
        let exports = vec![ImmutableExport::new(export, "a", node.node_id, pin.port(0))];
        let nodes = vec![node];
        let d = ImmutableCell::new(cell, "inv");
        let rev = CellRevision::new(Arc::clone(&d))
            .with(registry, &d, Some(nodes.as_slice()), None, Some(exports.as_slice()))
            .unwrap();
        let backup = CellBackup::new_instance(rev, &pool).unwrap();
        let libs = vec![Some(LibraryBackup::new(ImmutableLibrary::new(lib, "work")))];
        let snapshot = Snapshot::empty(registry, Arc::clone(&pool))
            .with(registry, &pool, &[Some(backup)], &libs)
            .unwrap();
        (snapshot, pool)
    }

    #[test]
    fn round_trip_into_fresh_registry() {
        let registry = IdRegistry::new();
        let (snapshot, _) = sample(&registry);
        let bytes = write_snapshot(&snapshot, &registry).unwrap();

        let fresh = IdRegistry::new();
        let cmos = load_technology(&fresh, "cmos").unwrap();
        let pool = TechPool::new([cmos]);
        let read = read_snapshot(&bytes, &fresh, &pool).unwrap();
        let cell = CellId::from_raw(0);
        assert_eq!(
            read.cell_revision(cell).unwrap().nodes(),
            snapshot.cell_revision(cell).unwrap().nodes()
        );
        assert_eq!(fresh.export_name(ExportId::new(cell, 0)).unwrap(), "a");
        assert_eq!(read.cell_bounds(cell), snapshot.cell_bounds(cell));
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let registry = IdRegistry::new();
        let (snapshot, pool) = sample(&registry);
        let mut bytes = write_snapshot(&snapshot, &registry).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            read_snapshot(&bytes, &registry, &pool),
            Err(PersistError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            read_snapshot(&bytes[..2], &registry, &pool),
            Err(PersistError::InvalidHeader(_))
        ));
    }

    #[test]
    fn conflicting_ids_are_fatal() {
        let registry = IdRegistry::new();
        let (snapshot, _) = sample(&registry);
        let bytes = write_snapshot(&snapshot, &registry).unwrap();

        let other = IdRegistry::new();
        let cmos = load_technology(&other, "cmos").unwrap();
        let pool = TechPool::new([cmos]);
        other.new_lib_id("scratch").unwrap();
        assert!(matches!(
            read_snapshot(&bytes, &other, &pool),
            Err(PersistError::IdMismatch { kind: "library", .. })
        ));
    }
}

//! Cell and library backups: revisions bound to resolved technologies.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use strata_common::Rect;
use strata_ids::{IdError, IdRegistry, NodeProtoId, PortProtoId};
use strata_tech::TechPool;

use crate::arc::ImmutableArcInst;
use crate::bounds::{compute_primitive_bounds, Shrinkage};
use crate::cell::{ImmutableCell, ImmutableLibrary};
use crate::error::DbError;
use crate::export::ImmutableExport;
use crate::memo::Memoization;
use crate::node::ImmutableNodeInst;
use crate::revision::CellRevision;

/// A cell revision together with the technologies it uses.
///
/// Derived indices are built on first access and cached. Their inputs are
/// immutable, so two threads racing to build one only duplicate work.
#[derive(Debug)]
pub struct CellBackup {
    /// The contents.
    pub revision: Arc<CellRevision>,
    /// Exactly the technologies the revision uses.
    pub tech_pool: Arc<TechPool>,
    /// Changed since the library was last saved.
    pub modified: bool,
    memo: OnceCell<Arc<Memoization>>,
    bounds: OnceCell<Option<Rect>>,
    shrinkage: OnceCell<Arc<Shrinkage>>,
}

impl CellBackup {
    fn build(revision: Arc<CellRevision>, tech_pool: Arc<TechPool>, modified: bool) -> Self {
        Self {
            revision,
            tech_pool,
            modified,
            memo: OnceCell::new(),
            bounds: OnceCell::new(),
            shrinkage: OnceCell::new(),
        }
    }

    /// Builds a backup from scratch, resolving technologies against `super_pool`.
    pub fn new_instance(revision: Arc<CellRevision>, super_pool: &TechPool) -> Result<Arc<Self>, DbError> {
        let tech_pool = super_pool.restrict(revision.tech_usages(), &TechPool::empty())?;
        check_against_pool(&revision, &tech_pool)?;
        Ok(Arc::new(Self::build(revision, tech_pool, false)))
    }

    /// Returns a backup with new contents.
    ///
    /// The revision is updated first and the technology pool is restricted
    /// to what the new revision uses. If both come back unchanged this
    /// backup is returned; otherwise the result is marked modified.
    pub fn with(
        self: &Arc<Self>,
        registry: &IdRegistry,
        d: &Arc<ImmutableCell>,
        nodes: Option<&[Arc<ImmutableNodeInst>]>,
        arcs: Option<&[Arc<ImmutableArcInst>]>,
        exports: Option<&[Arc<ImmutableExport>]>,
        super_pool: &TechPool,
    ) -> Result<Arc<Self>, DbError> {
        let revision = self.revision.with(registry, d, nodes, arcs, exports)?;
        let tech_pool = super_pool.restrict(revision.tech_usages(), &self.tech_pool)?;
        if Arc::ptr_eq(&revision, &self.revision) && Arc::ptr_eq(&tech_pool, &self.tech_pool) {
            return Ok(Arc::clone(self));
        }
        check_against_pool(&revision, &tech_pool)?;
        Ok(Arc::new(Self::build(revision, tech_pool, true)))
    }

    /// Returns the backup re-resolved against another set of technologies.
    pub fn with_tech_pool(self: &Arc<Self>, super_pool: &TechPool) -> Result<Arc<Self>, DbError> {
        let tech_pool = super_pool.restrict(self.revision.tech_usages(), &self.tech_pool)?;
        if Arc::ptr_eq(&tech_pool, &self.tech_pool) {
            return Ok(Arc::clone(self));
        }
        check_against_pool(&self.revision, &tech_pool)?;
        Ok(Arc::new(Self::build(Arc::clone(&self.revision), tech_pool, self.modified)))
    }

    /// Returns the backup with another revision date.
    pub fn with_revision_date(self: &Arc<Self>, revision_date: i64) -> Arc<Self> {
        let revision = self.revision.with_revision_date(revision_date);
        if Arc::ptr_eq(&revision, &self.revision) {
            return Arc::clone(self);
        }
        let next = Self::build(revision, Arc::clone(&self.tech_pool), true);
        if let Some(bounds) = self.bounds.get() {
            let _ = next.bounds.set(*bounds);
        }
        Arc::new(next)
    }

    /// Returns the backup with the modified flag cleared. Caches are shared.
    pub fn without_modified(self: &Arc<Self>) -> Arc<Self> {
        self.with_modified_flag(false)
    }

    pub(crate) fn with_modified_flag(self: &Arc<Self>, modified: bool) -> Arc<Self> {
        if self.modified == modified {
            return Arc::clone(self);
        }
        Arc::new(Self {
            revision: Arc::clone(&self.revision),
            tech_pool: Arc::clone(&self.tech_pool),
            modified,
            memo: self.memo.clone(),
            bounds: self.bounds.clone(),
            shrinkage: self.shrinkage.clone(),
        })
    }

    /// The cached connectivity indices, built on first use.
    pub fn memoization(&self) -> &Arc<Memoization> {
        self.memo.get_or_init(|| Arc::new(self.compute_memoization()))
    }

    /// Builds connectivity indices without caching them.
    pub fn compute_memoization(&self) -> Memoization {
        Memoization::new(Arc::clone(&self.revision), &self.tech_pool)
    }

    /// Bounds of the primitive content, or `None` when there is none.
    pub fn primitive_bounds(&self) -> Option<Rect> {
        *self
            .bounds
            .get_or_init(|| compute_primitive_bounds(self.memoization(), &self.tech_pool))
    }

    /// Arc shrinkage at pins.
    pub fn shrinkage(&self) -> &Arc<Shrinkage> {
        self.shrinkage
            .get_or_init(|| Arc::new(Shrinkage::new(self.memoization(), &self.tech_pool)))
    }

    /// Recomputes every cached value and compares.
    pub fn check(&self, registry: &IdRegistry) -> Result<(), DbError> {
        self.revision.check(registry)?;
        check_against_pool(&self.revision, &self.tech_pool)?;
        let cell = self.revision.cell_id();
        let pooled: Vec<usize> = self.tech_pool.tech_ids().map(|t| t.index()).collect();
        if !self.revision.tech_usages().ones().eq(pooled) {
            return Err(DbError::check(cell, "technology pool differs from usages"));
        }
        if let Some(memo) = self.memo.get() {
            if !Arc::ptr_eq(memo.revision(), &self.revision) {
                return Err(DbError::check(cell, "memoization built for another revision"));
            }
            memo.check(&self.tech_pool)?;
        }
        if let Some(bounds) = self.bounds.get() {
            let fresh = compute_primitive_bounds(&self.compute_memoization(), &self.tech_pool);
            let same = match (bounds, fresh) {
                (None, None) => true,
                (Some(a), Some(b)) => a.approx_eq(&b),
                _ => false,
            };
            if !same {
                return Err(DbError::check(cell, "primitive bounds"));
            }
        }
        if let Some(shrinkage) = self.shrinkage.get() {
            if **shrinkage != Shrinkage::new(&self.compute_memoization(), &self.tech_pool) {
                return Err(DbError::check(cell, "shrinkage"));
            }
        }
        Ok(())
    }
}

/// Every primitive must exist in the pool and every arc end on a primitive
/// port must be a port that accepts the arc's prototype.
fn check_against_pool(revision: &CellRevision, pool: &TechPool) -> Result<(), DbError> {
    let cell = revision.cell_id();
    for n in revision.nodes() {
        if let NodeProtoId::Primitive(p) = n.proto {
            if pool.primitive_node(p).is_none() {
                return Err(IdError::UnknownPrimitiveNode(p).into());
            }
        }
    }
    for a in revision.arcs() {
        if pool.arc_proto(a.proto).is_none() {
            return Err(IdError::UnknownArcProto(a.proto).into());
        }
        for end in [&a.tail, &a.head] {
            let PortProtoId::Primitive(port) = end.port else {
                continue;
            };
            if !pool.primitive_port(port).is_some_and(|pp| pp.connects(a.proto)) {
                return Err(DbError::ArcPortMismatch {
                    cell,
                    arc: a.arc_id,
                    proto: a.proto,
                    port: end.port,
                });
            }
        }
    }
    Ok(())
}

/// A library header with its modified flag.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryBackup {
    /// The header.
    pub d: Arc<ImmutableLibrary>,
    /// Changed since the library was last saved.
    pub modified: bool,
}

impl LibraryBackup {
    /// Creates an unmodified backup.
    pub fn new(d: Arc<ImmutableLibrary>) -> Arc<Self> {
        Arc::new(Self { d, modified: false })
    }

    /// Returns the backup with a new header, marked modified unless the
    /// header is the same instance.
    pub fn with(self: &Arc<Self>, d: &Arc<ImmutableLibrary>) -> Arc<Self> {
        if Arc::ptr_eq(d, &self.d) {
            return Arc::clone(self);
        }
        Arc::new(Self {
            d: Arc::clone(d),
            modified: true,
        })
    }

    /// Returns the backup with the modified flag cleared.
    pub fn without_modified(self: &Arc<Self>) -> Arc<Self> {
        if !self.modified {
            return Arc::clone(self);
        }
        Arc::new(Self {
            d: Arc::clone(&self.d),
            modified: false,
        })
    }
}

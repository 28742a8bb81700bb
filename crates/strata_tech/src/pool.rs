//! Sets of resolved technologies.

use std::sync::Arc;

use fixedbitset::FixedBitSet;
use strata_ids::{ArcProtoId, PrimitiveNodeId, PrimitivePortId, TechId};

use crate::error::TechError;
use crate::types::{ArcProto, PrimitiveNode, PrimitivePort, Technology};

/// Technologies indexed by [`TechId`].
///
/// Each cell backup holds the pool restricted to exactly the technologies
/// its revision uses, so an unrelated technology being replaced does not
/// invalidate the backup.
#[derive(Debug, Default)]
pub struct TechPool {
    techs: Vec<Option<Arc<Technology>>>,
}

impl TechPool {
    /// Creates a pool holding the given technologies.
    pub fn new(techs: impl IntoIterator<Item = Arc<Technology>>) -> Arc<Self> {
        let mut pool = TechPool::default();
        for tech in techs {
            pool.insert(tech);
        }
        Arc::new(pool)
    }

    /// A pool with no technologies.
    pub fn empty() -> Arc<Self> {
        Arc::new(TechPool::default())
    }

    fn insert(&mut self, tech: Arc<Technology>) {
        let slot = tech.id().index();
        if self.techs.len() <= slot {
            self.techs.resize(slot + 1, None);
        }
        self.techs[slot] = Some(tech);
    }

    /// Returns a copy of this pool with `tech` added or replaced.
    pub fn with(&self, tech: Arc<Technology>) -> Arc<Self> {
        let mut pool = TechPool {
            techs: self.techs.clone(),
        };
        pool.insert(tech);
        Arc::new(pool)
    }

    /// Looks up a technology.
    pub fn get(&self, id: TechId) -> Option<&Arc<Technology>> {
        self.techs.get(id.index())?.as_ref()
    }

    /// Returns `true` if `id` is in the pool.
    pub fn contains(&self, id: TechId) -> bool {
        self.get(id).is_some()
    }

    /// Ids of the technologies in the pool, ascending.
    pub fn tech_ids(&self) -> impl Iterator<Item = TechId> + '_ {
        self.techs
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_some())
            .map(|(i, _)| TechId::from_raw(i as u32))
    }

    /// Iterates over the technologies in the pool.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Technology>> {
        self.techs.iter().flatten()
    }

    /// Number of technologies in the pool.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` for an empty pool.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Looks up a primitive node in its technology.
    pub fn primitive_node(&self, id: PrimitiveNodeId) -> Option<&PrimitiveNode> {
        self.get(id.tech())?.primitive_node(id)
    }

    /// Looks up a primitive port in its technology.
    pub fn primitive_port(&self, id: PrimitivePortId) -> Option<&PrimitivePort> {
        self.get(id.node().tech())?.primitive_port(id)
    }

    /// Looks up an arc prototype in its technology.
    pub fn arc_proto(&self, id: ArcProtoId) -> Option<&ArcProto> {
        self.get(id.tech())?.arc_proto(id)
    }

    /// Returns `true` if both pools hold the same technology instances.
    pub fn same_as(&self, other: &TechPool) -> bool {
        let len = self.techs.len().max(other.techs.len());
        (0..len).all(|i| {
            match (self.techs.get(i).and_then(Option::as_ref), other.techs.get(i).and_then(Option::as_ref)) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
        })
    }

    /// Restricts this pool to the technologies set in `used`.
    ///
    /// If `candidate` already holds exactly those technologies, as the same
    /// instances this pool holds, `candidate` itself is returned so that
    /// callers can detect "nothing changed" by pointer comparison.
    pub fn restrict(
        &self,
        used: &FixedBitSet,
        candidate: &Arc<TechPool>,
    ) -> Result<Arc<TechPool>, TechError> {
        let mut techs = Vec::new();
        for bit in used.ones() {
            let id = TechId::from_raw(bit as u32);
            let tech = self.get(id).ok_or(TechError::NotInPool(id))?;
            techs.push(Arc::clone(tech));
        }
        let reusable = candidate.len() == techs.len()
            && techs
                .iter()
                .all(|t| candidate.get(t.id()).is_some_and(|c| Arc::ptr_eq(c, t)));
        if reusable {
            return Ok(Arc::clone(candidate));
        }
        Ok(TechPool::new(techs))
    }
}

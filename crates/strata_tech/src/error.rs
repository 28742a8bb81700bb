//! Error types for technology construction and resolution.

use strata_ids::{ArcProtoId, IdError, PrimitiveNodeId, TechId};

/// Errors raised while building technologies or resolving them into pools.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TechError {
    /// Allocating a technology-level id failed.
    #[error(transparent)]
    Id(#[from] IdError),

    /// No builtin technology has the requested name.
    #[error("unknown technology '{0}'")]
    UnknownTechnology(String),

    /// A cell uses a technology that the candidate pool does not provide.
    #[error("technology {0} is not in the pool")]
    NotInPool(TechId),

    /// A primitive node was declared without ports.
    #[error("primitive node {0} has no ports")]
    NoPorts(PrimitiveNodeId),

    /// A port names an arc prototype of another technology.
    #[error("port on {node} connects foreign arc prototype {arc}")]
    ForeignArc {
        /// Node owning the port.
        node: PrimitiveNodeId,
        /// Offending arc prototype.
        arc: ArcProtoId,
    },

    /// A name was registered again at a different position.
    #[error("'{0}' is already defined at another index")]
    Redefined(String),

    /// A dimension was negative or not finite.
    #[error("invalid dimension {value} for '{what}'")]
    BadDimension {
        /// What was being sized.
        what: String,
        /// Offending value.
        value: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_in_pool() {
        let err = TechError::NotInPool(TechId::from_raw(2));
        assert_eq!(format!("{err}"), "technology tech#2 is not in the pool");
    }

    #[test]
    fn id_errors_are_transparent() {
        let err: TechError = IdError::BadCellName("x".into()).into();
        assert_eq!(format!("{err}"), "invalid cell name 'x'");
    }
}

//! Error types for R-tree maintenance.

/// Errors reported by [`RTree`](crate::RTree).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RTreeError {
    /// The geometry to remove is not stored anywhere in the tree.
    #[error("geometry {0} is not in the tree")]
    NotFound(String),

    /// A structural invariant does not hold.
    #[error("R-tree node {node}: {message}")]
    Corrupt {
        /// Arena index of the offending node.
        node: usize,
        /// What is wrong.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_corrupt() {
        let err = RTreeError::Corrupt {
            node: 3,
            message: "bounds differ from children".into(),
        };
        assert_eq!(format!("{err}"), "R-tree node 3: bounds differ from children");
    }
}

//! Strongly-typed representation of `strata.toml`.

use serde::{Deserialize, Serialize};

/// Top-level database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// General database settings.
    pub database: DatabaseSection,
    /// Whole-database invariant audit behavior.
    pub invariants: InvariantsSection,
    /// Spatial index behavior.
    pub rtree: RTreeSection,
}

/// The `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Display name used in log events.
    pub name: String,
    /// Run the full self-check on every backup built by `backup()`.
    ///
    /// This recomputes every derived index and is meant for debug sessions.
    pub verify: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            verify: false,
        }
    }
}

/// The `[invariants]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvariantsSection {
    /// Log only the first failed audit. Later failures are silent.
    pub report_once: bool,
}

impl Default for InvariantsSection {
    fn default() -> Self {
        Self { report_once: true }
    }
}

/// The `[rtree]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RTreeSection {
    /// Rebuild a cell's tree from its live geometry when a removal misses.
    ///
    /// When disabled the miss is returned to the caller as an error.
    pub rebuild_on_miss: bool,
}

impl Default for RTreeSection {
    fn default() -> Self {
        Self {
            rebuild_on_miss: true,
        }
    }
}

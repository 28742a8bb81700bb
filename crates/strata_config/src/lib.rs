//! Parsing and validation of `strata.toml` database configuration files.
//!
//! The configuration is optional: a database constructed without one uses
//! [`DatabaseConfig::default`].

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;

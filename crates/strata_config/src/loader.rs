//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::DatabaseConfig;
use std::path::Path;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = "strata.toml";

/// Loads and validates `strata.toml` from a directory.
///
/// A missing file is not an error: the default configuration is returned.
pub fn load_config(dir: &Path) -> Result<DatabaseConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(DatabaseConfig::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<DatabaseConfig, ConfigError> {
    let config: DatabaseConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &DatabaseConfig) -> Result<(), ConfigError> {
    if config.database.name.trim().is_empty() {
        return Err(ConfigError::MissingField("database.name".to_string()));
    }
    if config.database.name.chars().any(char::is_control) {
        return Err(ConfigError::ValidationError(
            "database.name contains control characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, DatabaseConfig::default());
        assert_eq!(config.database.name, "main");
        assert!(!config.database.verify);
        assert!(config.invariants.report_once);
        assert!(config.rtree.rebuild_on_miss);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[database]
name = "chip"
verify = true

[invariants]
report_once = false

[rtree]
rebuild_on_miss = false
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.database.name, "chip");
        assert!(config.database.verify);
        assert!(!config.invariants.report_once);
        assert!(!config.rtree.rebuild_on_miss);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = load_config_from_str("[database]\nverify = true\n").unwrap();
        assert_eq!(config.database.name, "main");
        assert!(config.database.verify);
    }

    #[test]
    fn empty_name_errors() {
        let err = load_config_from_str("[database]\nname = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn control_characters_rejected() {
        let err = load_config_from_str("[database]\nname = \"a\\tb\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), DatabaseConfig::default());
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[rtree]\nrebuild_on_miss = false\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert!(!config.rtree.rebuild_on_miss);
    }
}

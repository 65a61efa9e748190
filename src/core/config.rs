/// Engine configuration, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::format::NumberFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub seed: u64,
    pub max_stack_depth: usize,
    pub char_limit: Option<usize>,
    pub timeout_ms: Option<u64>,
    /// Printed in place of a failed vocabulary query.
    pub missing_sentinel: String,
    /// Treat failed vocabulary queries as fatal.
    pub strict_queries: bool,
    pub number_format: NumberFormat,
    /// Flags defined before the first run.
    pub flags: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            seed: 0,
            max_stack_depth: 1000,
            char_limit: None,
            timeout_ms: None,
            missing_sentinel: "<MISSING>".to_string(),
            strict_queries: false,
            number_format: NumberFormat::Normal,
            flags: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_ron_str(s: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(s)?)
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    pub fn save_to_ron(&self, path: &Path) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config = EngineConfig::from_ron_str("(seed: 7, char_limit: Some(100))").unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.char_limit, Some(100));
        assert_eq!(config.max_stack_depth, 1000);
        assert_eq!(config.missing_sentinel, "<MISSING>");
    }

    #[test]
    fn round_trip_through_file() {
        let config = EngineConfig {
            seed: 99,
            strict_queries: true,
            number_format: NumberFormat::Roman,
            flags: vec!["verbose".into()],
            ..EngineConfig::default()
        };
        let path = std::env::temp_dir().join("pattern_engine_config_test.ron");
        config.save_to_ron(&path).unwrap();
        let loaded = EngineConfig::load_from_ron(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(matches!(
            EngineConfig::from_ron_str("(seed: \"x\")"),
            Err(ConfigError::Ron(_))
        ));
    }
}

//! Runtime configuration (enclave.toml)
//!
//! ```toml
//! [runtime]
//! max_contexts = 64
//!
//! [limits]
//! max_alloc_bytes = 16777216
//! max_steps = 1000000
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Every section and key is optional.

use crate::context::{ContextOptions, ResourceLimits};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantically invalid setting
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Registry settings
    #[serde(default)]
    pub runtime: RegistrySection,

    /// Per-context resource limits applied to every new context
    #[serde(default)]
    pub limits: LimitsSection,

    /// Logging settings (consumed by the binary)
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[runtime]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistrySection {
    /// Maximum number of live contexts, main included (None = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_contexts: Option<usize>,
}

/// `[limits]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LimitsSection {
    /// Allocation budget per context in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_alloc_bytes: Option<usize>,

    /// Step budget per context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
}

/// `[logging]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// Default level filter (`trace`, `debug`, `info`, `warn`, `error`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable
    Pretty,
    /// Single-line human readable
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Invalid(format!("unknown log format '{}'", other))),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl RuntimeConfig {
    /// Load and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Check settings that TOML typing cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.max_contexts == Some(0) {
            return Err(ConfigError::Invalid(
                "runtime.max_contexts must allow at least the main context".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Options applied to each context created under this config
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            limits: ResourceLimits {
                max_alloc_bytes: self.limits.max_alloc_bytes,
                max_steps: self.limits.max_steps,
            },
        }
    }
}

impl FromStr for RuntimeConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: RuntimeConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: RuntimeConfig = "".parse().unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.runtime.max_contexts.is_none());
    }

    #[test]
    fn test_full_config() {
        let config: RuntimeConfig = r#"
            [runtime]
            max_contexts = 8

            [limits]
            max_alloc_bytes = 4096
            max_steps = 100

            [logging]
            level = "debug"
            format = "json"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.runtime.max_contexts, Some(8));
        assert_eq!(config.logging.format, LogFormat::Json);

        let options = config.context_options();
        assert_eq!(options.limits.max_alloc_bytes, Some(4096));
        assert_eq!(options.limits.max_steps, Some(100));
    }

    #[test]
    fn test_rejects_zero_contexts() {
        let result: Result<RuntimeConfig, _> = "[runtime]\nmax_contexts = 0\n".parse();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_level() {
        let result: Result<RuntimeConfig, _> = "[logging]\nlevel = \"loud\"\n".parse();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_toml() {
        let result: Result<RuntimeConfig, _> = "[runtime\n".parse();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_steps = 5").unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.limits.max_steps, Some(5));
    }

    #[test]
    fn test_missing_file() {
        let result = RuntimeConfig::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}

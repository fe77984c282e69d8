//! Configuration management for Sluice.
//!
//! Configuration is loaded from the platform config directory (falling back
//! to `~/.sluice/config.toml`). A missing file means defaults; every section
//! may be omitted.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Sluice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dataflow engine settings
    pub engine: EngineConfig,

    /// Processing settings
    pub processing: ProcessingConfig,

    /// Resize settings
    pub resize: ResizeConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path (`~` is expanded).
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let path = expand_path(path);
        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.sluice.sluice/config.toml
    /// - Linux: ~/.config/sluice/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\sluice\config\config.toml
    ///
    /// Falls back to ~/.sluice/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "sluice", "sluice")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".sluice").join("config.toml")
            })
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Expand a leading `~` (and `$VAR`s where set) in a user-supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(shellexpand::tilde(&raw).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.queue_capacity, 64);
        assert_eq!(config.resize.divisor, 2);
        assert_eq!(config.resize.output_extension, "png");
        assert!(config.processing.workers > 0);
        assert_eq!(config.limits.max_file_size_mb, 100);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[engine]"));
        assert!(toml.contains("[processing]"));
        assert!(toml.contains("[resize]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nqueue_capacity = 8\n\n[resize]\ndivisor = 4").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.engine.queue_capacity, 8);
        assert_eq!(config.resize.divisor, 4);
        assert_eq!(config.resize.filter, "triangle");
        assert_eq!(config.output.format, "json");
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nqueue_capacity = 0").unwrap();
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine\nqueue_capacity = ").unwrap();
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path(Path::new("~/images"));
        assert!(!expanded.to_string_lossy().starts_with('~') || std::env::var("HOME").is_err());
        assert_eq!(expand_path(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }
}

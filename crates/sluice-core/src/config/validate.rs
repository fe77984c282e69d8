//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::imaging::parse_filter;

use super::Config;

const OUTPUT_FORMATS: &[&str] = &["json", "jsonl"];
const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "engine.queue_capacity must be > 0".into(),
            ));
        }
        if self.processing.workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.workers must be > 0".into(),
            ));
        }
        if self.processing.supported_formats.is_empty() {
            return Err(ConfigError::ValidationError(
                "processing.supported_formats must not be empty".into(),
            ));
        }
        if self.resize.divisor == 0 {
            return Err(ConfigError::ValidationError(
                "resize.divisor must be > 0".into(),
            ));
        }
        if parse_filter(&self.resize.filter).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "resize.filter '{}' is not one of nearest, triangle, catmull-rom, gaussian, lanczos3",
                self.resize.filter
            )));
        }
        if self.resize.output_extension.is_empty()
            || self.resize.output_extension.contains(['/', '\\', '.'])
        {
            return Err(ConfigError::ValidationError(
                "resize.output_extension must be a bare extension such as \"png\"".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if !OUTPUT_FORMATS.contains(&self.output.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "output.format must be json or jsonl, got '{}'",
                self.output.format
            )));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level '{}' is not a known level",
                self.logging.level
            )));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be pretty or json, got '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }
}

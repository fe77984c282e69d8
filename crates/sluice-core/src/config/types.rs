//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};

/// Dataflow engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default capacity of the queue between two connected stages
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of worker chains the source fans out to
    pub workers: usize,

    /// Supported input formats (file extensions, lowercase)
    pub supported_formats: Vec<String>,

    /// Follow symbolic links while scanning the input directory
    pub follow_links: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
                "gif".to_string(),
                "bmp".to_string(),
                "tiff".to_string(),
                "tif".to_string(),
            ],
            follow_links: true,
        }
    }
}

/// Number of hardware threads, or 4 if that cannot be determined.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Resize (mipmap) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeConfig {
    /// Width and height are divided by this factor
    pub divisor: u32,

    /// Resampling filter: nearest, triangle, catmull-rom, gaussian, lanczos3
    pub filter: String,

    /// Extension appended to each output file name
    pub output_extension: String,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            divisor: 2,
            filter: "triangle".to_string(),
            output_extension: "png".to_string(),
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 10000,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default report format ("json" or "jsonl")
    pub format: String,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            pretty: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

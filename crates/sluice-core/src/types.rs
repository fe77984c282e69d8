//! Records produced by the resize pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One image that made it through load → resize → save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizedImage {
    /// Path of the source file
    pub source: PathBuf,

    /// Path the resized image was written to
    pub output: PathBuf,

    /// Detected source format ("jpeg", "png", "webp", etc.)
    pub source_format: String,

    /// Format the output was encoded in
    pub format: String,

    /// Source dimensions in pixels
    pub original_width: u32,
    pub original_height: u32,

    /// Output dimensions in pixels
    pub width: u32,
    pub height: u32,
}

/// Statistics for one resize run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResizeStats {
    /// Images written
    pub succeeded: usize,

    /// Active stages that ended with an error
    pub failed_stages: usize,

    /// Worker chains the input was spread over
    pub threads: usize,

    /// Processing rate in images per second
    pub images_per_second: f64,

    /// Wall-clock time of the run in microseconds
    pub total_micros: u128,
}

impl ResizeStats {
    pub fn is_success(&self) -> bool {
        self.failed_stages == 0
    }
}

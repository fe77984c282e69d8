//! Downscaling by an integer divisor (one mipmap level per pass).

use image::imageops::FilterType;

use crate::config::ResizeConfig;
use crate::error::ConfigError;

use super::load::LoadedImage;

/// Parse a filter name as accepted in `[resize] filter`.
pub fn parse_filter(name: &str) -> Option<FilterType> {
    match name.to_lowercase().as_str() {
        "nearest" => Some(FilterType::Nearest),
        "triangle" | "linear" => Some(FilterType::Triangle),
        "catmull-rom" | "catmullrom" | "cubic" => Some(FilterType::CatmullRom),
        "gaussian" => Some(FilterType::Gaussian),
        "lanczos3" | "lanczos" => Some(FilterType::Lanczos3),
        _ => None,
    }
}

/// Shrinks images by a fixed factor on both axes.
#[derive(Debug, Clone, Copy)]
pub struct Resizer {
    divisor: u32,
    filter: FilterType,
}

impl Resizer {
    pub fn new(divisor: u32, filter: FilterType) -> Self {
        Self {
            divisor: divisor.max(1),
            filter,
        }
    }

    pub fn from_config(config: &ResizeConfig) -> Result<Self, ConfigError> {
        let filter = parse_filter(&config.filter).ok_or_else(|| {
            ConfigError::ValidationError(format!("unknown resize filter '{}'", config.filter))
        })?;
        Ok(Self::new(config.divisor, filter))
    }

    /// Output size for a `width` x `height` input. Never below 1x1.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            (width / self.divisor).max(1),
            (height / self.divisor).max(1),
        )
    }

    /// Replace the pixel data of `loaded` with its downscaled version.
    pub fn apply(&self, mut loaded: LoadedImage) -> LoadedImage {
        let (width, height) = loaded.dimensions();
        let (target_w, target_h) = self.target_size(width, height);
        loaded.image = loaded.image.resize_exact(target_w, target_h, self.filter);
        loaded
    }
}

impl Default for Resizer {
    fn default() -> Self {
        Self::new(2, FilterType::Triangle)
    }
}

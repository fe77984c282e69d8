//! Writing resized images to the output directory.

use std::path::{Path, PathBuf};

use crate::error::{ImageError, ImageResult};
use crate::types::ResizedImage;

use image::ImageFormat;

use super::load::{format_to_string, LoadedImage};

/// Writes images as `<output_dir>/<source file name>.<extension>`.
#[derive(Debug, Clone)]
pub struct ImageSaver {
    output_dir: PathBuf,
    extension: String,
}

impl ImageSaver {
    pub fn new(output_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            extension: extension.into(),
        }
    }

    /// Name of the format the output extension encodes to.
    pub fn output_format(&self) -> String {
        ImageFormat::from_extension(&self.extension)
            .map(format_to_string)
            .unwrap_or_else(|| self.extension.to_lowercase())
    }

    /// Where an image named `name` will be written.
    pub fn target_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", name, self.extension))
    }

    /// Encode and write `image`, creating the target directory if needed.
    pub fn save(&self, image: LoadedImage) -> ImageResult<ResizedImage> {
        let target = self.target_path(&image.name);
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }

        image.image.save(&target).map_err(|e| ImageError::Encode {
            path: target.clone(),
            message: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        tracing::trace!("Saved {:?} ({}x{})", target, width, height);
        Ok(ResizedImage {
            source: image.source,
            output: target,
            source_format: format_to_string(image.format),
            format: self.output_format(),
            original_width: image.original_width,
            original_height: image.original_height,
            width,
            height,
        })
    }
}

fn ensure_dir(dir: &Path) -> ImageResult<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| ImageError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

//! Image loading with format detection and size limits.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::config::LimitsConfig;
use crate::error::{ImageError, ImageResult};

use super::discovery::DiscoveredFile;

/// Loads and decodes images, enforcing the configured limits.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    limits: LimitsConfig,
}

/// A decoded image travelling between the worker stages.
pub struct LoadedImage {
    /// File name of the source, used to name the output
    pub name: String,
    /// Path of the source file
    pub source: PathBuf,
    /// Current pixel data (replaced by the resize stage)
    pub image: DynamicImage,
    /// Detected source format
    pub format: ImageFormat,
    /// Source width in pixels
    pub original_width: u32,
    /// Source height in pixels
    pub original_height: u32,
}

impl LoadedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

impl ImageLoader {
    /// Create a new loader with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Read and decode a discovered file.
    pub fn load(&self, file: &DiscoveredFile) -> ImageResult<LoadedImage> {
        let path = file.path.as_path();
        if !path.exists() {
            return Err(ImageError::FileNotFound(path.to_path_buf()));
        }

        let max_bytes = self.limits.max_file_size_mb.saturating_mul(1024 * 1024);
        if file.size > max_bytes {
            return Err(ImageError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: file.size / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        let bytes = std::fs::read(path).map_err(|e| ImageError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot read file: {}", e),
        })?;
        let (image, format) = decode_bytes(bytes, path)?;

        let (width, height) = image.dimensions();
        if width > self.limits.max_image_dimension || height > self.limits.max_image_dimension {
            return Err(ImageError::ImageTooLarge {
                path: path.to_path_buf(),
                width,
                height,
                max_dim: self.limits.max_image_dimension,
            });
        }

        tracing::trace!("Loaded {:?} ({}x{}, {:?})", path, width, height, format);
        Ok(LoadedImage {
            name: file.file_name(),
            source: path.to_path_buf(),
            image,
            format,
            original_width: width,
            original_height: height,
        })
    }
}

/// Decode from memory, detecting the format from content first and the
/// extension second.
fn decode_bytes(bytes: Vec<u8>, path: &Path) -> ImageResult<(DynamicImage, ImageFormat)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot detect image format: {}", e),
        })?;
    let format = match reader.format() {
        Some(f) => f,
        None => ImageFormat::from_path(path).map_err(|_| ImageError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown")
                .to_string(),
        })?,
    };
    let image = reader.decode().map_err(|e| ImageError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok((image, format))
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Ico => "ico".to_string(),
        ImageFormat::Pnm => "pnm".to_string(),
        ImageFormat::Avif => "avif".to_string(),
        _ => "unknown".to_string(),
    }
}

//! Image stage bodies used by the resize pipeline.
//!
//! - **discovery**: Lazily find image files in a directory tree
//! - **load**: Read and decode images with limits
//! - **resize**: Downscale by an integer divisor
//! - **save**: Encode and write to the output directory

pub mod discovery;
pub mod load;
pub mod resize;
pub mod save;

// Re-exports for convenient access
pub use discovery::{DiscoveredFile, FileDiscovery, Scan};
pub use load::{format_to_string, ImageLoader, LoadedImage};
pub use resize::{parse_filter, Resizer};
pub use save::ImageSaver;

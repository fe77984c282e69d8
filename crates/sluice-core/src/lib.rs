//! Sluice Core - a typed dataflow pipeline engine.
//!
//! Independently running stages are connected by bounded, order-preserving
//! queues. Active stages get an OS thread each; passive stages run inline on
//! the thread of the active stage that feeds them. End-of-stream flows from
//! the exhausted source through every queue until all threads have returned.
//!
//! # Architecture
//!
//! ```text
//! Source* → Distributor ┬→ Worker* → ... ┬→ Merger* → Sink
//!                       └→ Worker* → ... ┘
//! ```
//!
//! The [`resize`] module builds exactly this shape to downscale a directory
//! of images across worker threads.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sluice_core::{Config, ResizeJob, ResizeSettings};
//!
//! fn main() -> sluice_core::Result<()> {
//!     let config = Config::load()?;
//!     let settings = ResizeSettings::new("./photos", "./mipmaps", &config);
//!     let outcome = ResizeJob::new(settings, &config)?.run()?;
//!     println!("Resized {} images", outcome.images.len());
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod engine;
pub mod error;
pub mod imaging;
pub mod output;
pub mod resize;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use engine::{ExecutionReport, Pipeline, StageOutcome};
pub use error::{
    BoxError, ConfigError, GraphError, GraphResult, ImageError, ImageResult, Result, SluiceError,
    StageError,
};
pub use output::{OutputFormat, OutputWriter};
pub use resize::{ResizeJob, ResizeOutcome, ResizeSettings};
pub use types::{ResizeStats, ResizedImage};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

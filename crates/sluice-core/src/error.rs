//! Error types for the Sluice dataflow engine.
//!
//! Errors are split by when they can happen: [`GraphError`] covers everything
//! that is wrong with a graph before any thread starts, [`StageError`] covers
//! a failure inside one running chain, and [`ImageError`] is what the image
//! stage bodies return.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::{PortDirection, PortId, StageId};

/// Boxed error returned by user-supplied stage bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for Sluice operations.
#[derive(Error, Debug)]
pub enum SluiceError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Graph assembly or validation errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Image stage errors
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// A graph that cannot be executed. Raised during assembly, validation or
/// start-up, never once stages are running.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Stage '{stage}' has an unconnected {direction} port ({port})")]
    UnconnectedPort {
        stage: String,
        port: PortId,
        direction: PortDirection,
    },

    #[error("Distributor '{stage}' has no output ports")]
    EmptyDistributor { stage: String },

    #[error("Merger '{stage}' has no input ports")]
    EmptyMerger { stage: String },

    #[error("Port {port} of stage '{stage}' is already connected")]
    PortAlreadyBound { stage: String, port: PortId },

    #[error("Port {port} belongs to a different pipeline")]
    ForeignPort { port: PortId },

    #[error("Stage {stage} belongs to a different pipeline")]
    ForeignStage { stage: StageId },

    #[error("Queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("Source '{stage}' must be declared active")]
    PassiveSource { stage: String },

    #[error("Merger '{stage}' must be declared active")]
    PassiveMerger { stage: String },

    #[error("Stage '{stage}' is part of a cycle")]
    Cycle { stage: String },

    #[error("Stage '{stage}' is passive and not fed by any active stage")]
    UnreachableStage { stage: String },

    #[error("Element type mismatch on port {port}")]
    PortTypeMismatch { port: PortId },

    /// The OS refused to start a stage thread.
    #[error("Failed to spawn thread for stage '{stage}': {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a running stage. Ends the chain driven by that stage's thread.
#[derive(Error, Debug)]
pub enum StageError {
    /// The stage body returned an error
    #[error("Stage '{stage}' failed: {source}")]
    Compute {
        stage: String,
        #[source]
        source: BoxError,
    },

    /// The downstream consumer has gone away
    #[error("Stage '{stage}' could not push: downstream queue is closed")]
    QueueClosed { stage: String },

    /// Every distributor branch has been retired
    #[error("Distributor '{stage}' has no live outputs left")]
    NoLiveTargets { stage: String },

    /// The stage body panicked
    #[error("Stage '{stage}' panicked: {message}")]
    Panicked { stage: String, message: String },
}

impl StageError {
    /// A stage whose consumers all went away fails only because one of them
    /// failed first.
    pub fn is_cascade(&self) -> bool {
        matches!(
            self,
            StageError::QueueClosed { .. } | StageError::NoLiveTargets { .. }
        )
    }
}

/// Errors from the image stage bodies, carrying the affected path.
#[derive(Error, Debug)]
pub enum ImageError {
    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Image encoding or writing failed
    #[error("Encode error for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// Output directory could not be created
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Unsupported image format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Convenience type alias for Sluice results.
pub type Result<T> = std::result::Result<T, SluiceError>;

/// Convenience type alias for graph assembly results.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Convenience type alias for image stage results.
pub type ImageResult<T> = std::result::Result<T, ImageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_names_stage_and_port() {
        let err = GraphError::UnconnectedPort {
            stage: "resize".to_string(),
            port: PortId::from_index(4),
            direction: PortDirection::Output,
        };
        assert_eq!(
            err.to_string(),
            "Stage 'resize' has an unconnected output port (port#4)"
        );
    }

    #[test]
    fn test_compute_error_keeps_source() {
        let err = StageError::Compute {
            stage: "load".to_string(),
            source: "bad header".into(),
        };
        assert_eq!(err.to_string(), "Stage 'load' failed: bad header");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_closed_downstream_is_a_cascade() {
        let closed = StageError::QueueClosed {
            stage: "merge".to_string(),
        };
        let starved = StageError::NoLiveTargets {
            stage: "fan".to_string(),
        };
        let compute = StageError::Compute {
            stage: "sink".to_string(),
            source: "disk full".into(),
        };
        assert!(closed.is_cascade());
        assert!(starved.is_cascade());
        assert!(!compute.is_cascade());
    }
}

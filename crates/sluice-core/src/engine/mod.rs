//! The dataflow engine.
//!
//! A [`Pipeline`] is assembled from stages connected by typed ports, then run
//! with [`Pipeline::execute_blocking`]:
//!
//! - **port** / **queue**: typed connection points and the bounded SPSC
//!   queues behind them
//! - **stage**: source, transform and sink stages
//! - **distributor**: round-robin fan-out
//! - **merger**: fan-in that ends when every input has ended
//! - **runtime**: thread-per-active-stage execution and the run report
//! - **graph**: assembly and validation
//!
//! ```rust
//! use sluice_core::engine::Pipeline;
//!
//! let mut pipeline = Pipeline::with_capacity(4);
//! let numbers = pipeline.add_source("numbers", 0..10_u32);
//! let square = pipeline.add_map("square", |x: u32| x * x);
//! let (sink, collected) = pipeline.add_collector("collect");
//!
//! pipeline.declare_active(&numbers)?;
//! pipeline.connect(numbers.output(), square.input())?;
//! pipeline.connect(square.output(), sink.input())?;
//!
//! let report = pipeline.execute_blocking()?;
//! assert!(report.is_success());
//! assert_eq!(collected.take().iter().sum::<u32>(), 285);
//! # Ok::<(), sluice_core::GraphError>(())
//! ```

pub mod distributor;
mod graph;
mod id;
pub mod merger;
pub mod port;
pub mod queue;
mod runtime;
pub mod stage;

// Re-exports for convenient access
pub use distributor::DistributorStage;
pub use graph::Pipeline;
pub use id::{EdgeId, PipelineId, PortId, StageId};
pub use merger::MergerStage;
pub use port::{InputPort, OutputPort, PortDirection};
pub use queue::{PushError, Queue, QueueReader, QueueWriter, TryPop};
pub use runtime::{ExecutionReport, StageOutcome, StageState};
pub use stage::{
    Activation, Collected, SinkStage, SourceStage, StageHandle, StageKind, TransformStage,
};

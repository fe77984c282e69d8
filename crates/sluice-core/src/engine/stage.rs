//! Stage kinds and the two forms a stage takes at run time.
//!
//! Every stage is one of a closed set of kinds ([`StageKind`]). During
//! assembly a stage is a type-erased [`StageNode`] sitting in the pipeline
//! arena. When execution starts it turns into one of:
//!
//! - a [`Task`], if it was declared active: a loop that owns its own thread;
//! - an [`Inlet`], if it is passive: a value owned by its upstream stage and
//!   called inline on the upstream thread.
//!
//! Outputs are [`Outlet`]s. An outlet either pushes into a bounded queue
//! (the consumer is active) or calls the consumer's inlet directly (the
//! consumer is passive), which is how an active stage drives a whole chain of
//! passive stages without extra threads.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::id::{PipelineId, PortId, StageId};
use super::port::{InputPort, OutputPort};
use super::queue::{QueueReader, QueueWriter};
use super::runtime::{Assembly, Lifecycle, StageState};
use crate::error::{BoxError, GraphError, GraphResult, StageError};

/// The closed set of stage kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Source,
    Transform,
    Sink,
    Distributor,
    Merger,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Source => "source",
            StageKind::Transform => "transform",
            StageKind::Sink => "sink",
            StageKind::Distributor => "distributor",
            StageKind::Merger => "merger",
        };
        f.write_str(name)
    }
}

/// Whether a stage owns a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    /// Runs on a dedicated thread.
    Active,
    /// Runs inline on the thread of its upstream stage.
    #[default]
    Passive,
}

/// Kind-independent description of a stage: what validation and the
/// runtime need to know without touching the typed node.
#[derive(Debug, Clone)]
pub struct StageShape {
    pub id: StageId,
    pub name: String,
    pub kind: StageKind,
    pub inputs: Vec<PortId>,
    pub outputs: Vec<PortId>,
}

/// Implemented by every typed stage handle.
pub trait StageHandle {
    fn stage_id(&self) -> StageId;

    #[doc(hidden)]
    fn pipeline_id(&self) -> PipelineId;
}

// ── Run-time forms ─────────────────────────────────────────────────────────

/// A passive stage, called inline by whoever feeds it.
pub(crate) trait Inlet<T>: Send {
    /// Process one element and forward the results.
    fn accept(&mut self, item: T) -> Result<(), StageError>;

    /// The upstream reached end-of-stream: flush and close all outputs.
    fn finish(&mut self) -> Result<(), StageError>;
}

/// An active stage's thread body.
pub(crate) trait Task: Send {
    fn run(self: Box<Self>, lifecycle: &mut Lifecycle) -> Result<(), StageError>;
}

/// Erased `Box<dyn Inlet<T>>`, handed from a passive node to its upstream.
pub(crate) type ErasedInlet = Box<dyn Any + Send>;

pub(crate) fn erase_inlet<T: 'static>(inlet: Box<dyn Inlet<T>>) -> ErasedInlet {
    Box::new(inlet)
}

/// A stage waiting in the arena for execution to start.
pub(crate) trait StageNode: Send {
    /// Build the passive form. The result must be an erased `Box<dyn Inlet<I>>`
    /// for the stage's input element type.
    fn into_inlet(
        self: Box<Self>,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<ErasedInlet>;

    /// Build the active form.
    fn into_task(
        self: Box<Self>,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<Box<dyn Task>>;
}

/// Why an [`Outlet`] could not deliver an element.
pub(crate) enum SendError<T> {
    /// The consumer is gone; the element is handed back.
    Closed(T),
    /// An inline consumer failed while processing the element.
    Downstream(StageError),
}

enum Target<T> {
    Queue(QueueWriter<T>),
    Inline(Box<dyn Inlet<T>>),
}

/// The bound output of a stage at run time.
pub(crate) struct Outlet<T> {
    target: Target<T>,
    closed: bool,
}

impl<T> Outlet<T> {
    pub(crate) fn queue(writer: QueueWriter<T>) -> Self {
        Self {
            target: Target::Queue(writer),
            closed: false,
        }
    }

    pub(crate) fn inline(inlet: Box<dyn Inlet<T>>) -> Self {
        Self {
            target: Target::Inline(inlet),
            closed: false,
        }
    }

    pub(crate) fn send(&mut self, item: T) -> Result<(), SendError<T>> {
        if self.closed {
            return Err(SendError::Closed(item));
        }
        match &mut self.target {
            Target::Queue(writer) => writer
                .push(item)
                .map_err(|rejected| SendError::Closed(rejected.into_inner())),
            Target::Inline(inlet) => inlet.accept(item).map_err(SendError::Downstream),
        }
    }

    /// Close the output exactly once. Inline consumers run their own
    /// end-of-stream handling on this call.
    pub(crate) fn close(&mut self) -> Result<(), StageError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        match &mut self.target {
            Target::Queue(writer) => {
                writer.close();
                Ok(())
            }
            Target::Inline(inlet) => inlet.finish(),
        }
    }
}

/// Send `item`, treating a vanished consumer as a failure of `stage`.
pub(crate) fn forward<T>(stage: &str, outlet: &mut Outlet<T>, item: T) -> Result<(), StageError> {
    match outlet.send(item) {
        Ok(()) => Ok(()),
        Err(SendError::Closed(_)) => Err(StageError::QueueClosed {
            stage: stage.to_string(),
        }),
        Err(SendError::Downstream(e)) => Err(e),
    }
}

/// Drives an inlet from a queue: the thread body of any active
/// single-input stage.
pub(crate) struct Pump<I> {
    reader: QueueReader<I>,
    inlet: Box<dyn Inlet<I>>,
}

impl<I> Pump<I> {
    pub(crate) fn new(reader: QueueReader<I>, inlet: Box<dyn Inlet<I>>) -> Self {
        Self { reader, inlet }
    }
}

impl<I: Send + 'static> Task for Pump<I> {
    fn run(self: Box<Self>, lifecycle: &mut Lifecycle) -> Result<(), StageError> {
        let Pump { reader, mut inlet } = *self;
        while let Some(item) = reader.pop() {
            inlet.accept(item)?;
            lifecycle.record();
        }
        lifecycle.advance(StageState::Draining);
        inlet.finish()
    }
}

// ── Source ─────────────────────────────────────────────────────────────────

/// Handle to a source stage.
pub struct SourceStage<T> {
    pub(crate) pipeline: PipelineId,
    pub(crate) id: StageId,
    pub(crate) output: OutputPort<T>,
}

impl<T> SourceStage<T> {
    pub fn output(&self) -> OutputPort<T> {
        self.output
    }
}

pub(crate) struct SourceNode<T, G> {
    pub(crate) output: PortId,
    pub(crate) generator: G,
    pub(crate) _element: PhantomData<fn() -> T>,
}

impl<T, G> StageNode for SourceNode<T, G>
where
    T: Send + 'static,
    G: IntoIterator<Item = T> + Send + 'static,
{
    fn into_inlet(
        self: Box<Self>,
        _ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<ErasedInlet> {
        Err(GraphError::PassiveSource {
            stage: shape.name.clone(),
        })
    }

    fn into_task(
        self: Box<Self>,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<Box<dyn Task>> {
        let outlet = ctx.outlet::<T>(self.output)?;
        Ok(Box::new(SourceTask {
            stage: shape.name.clone(),
            generator: self.generator,
            outlet,
        }))
    }
}

struct SourceTask<T, G> {
    stage: String,
    generator: G,
    outlet: Outlet<T>,
}

impl<T, G> Task for SourceTask<T, G>
where
    T: Send + 'static,
    G: IntoIterator<Item = T> + Send + 'static,
{
    fn run(self: Box<Self>, lifecycle: &mut Lifecycle) -> Result<(), StageError> {
        let SourceTask {
            stage,
            generator,
            mut outlet,
        } = *self;
        for item in generator {
            forward(&stage, &mut outlet, item)?;
            lifecycle.record();
        }
        lifecycle.advance(StageState::Draining);
        outlet.close()
    }
}

// ── Transform ──────────────────────────────────────────────────────────────

/// Handle to a transform stage.
pub struct TransformStage<I, O> {
    pub(crate) pipeline: PipelineId,
    pub(crate) id: StageId,
    pub(crate) input: InputPort<I>,
    pub(crate) output: OutputPort<O>,
}

impl<I, O> TransformStage<I, O> {
    pub fn input(&self) -> InputPort<I> {
        self.input
    }

    pub fn output(&self) -> OutputPort<O> {
        self.output
    }
}

pub(crate) struct TransformNode<I, O, F> {
    pub(crate) input: PortId,
    pub(crate) output: PortId,
    pub(crate) body: F,
    pub(crate) _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F> TransformNode<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> Result<Option<O>, BoxError> + Send + 'static,
{
    fn build(
        self,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<TransformInlet<I, O, F>> {
        let outlet = ctx.outlet::<O>(self.output)?;
        Ok(TransformInlet {
            stage: shape.name.clone(),
            body: self.body,
            outlet,
            _input: PhantomData,
        })
    }
}

impl<I, O, F> StageNode for TransformNode<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> Result<Option<O>, BoxError> + Send + 'static,
{
    fn into_inlet(
        self: Box<Self>,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<ErasedInlet> {
        let inlet = self.build(ctx, shape)?;
        Ok(erase_inlet::<I>(Box::new(inlet)))
    }

    fn into_task(
        self: Box<Self>,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<Box<dyn Task>> {
        let reader = ctx.reader::<I>(self.input)?;
        let inlet = self.build(ctx, shape)?;
        Ok(Box::new(Pump::new(reader, Box::new(inlet))))
    }
}

struct TransformInlet<I, O, F> {
    stage: String,
    body: F,
    outlet: Outlet<O>,
    _input: PhantomData<fn(I)>,
}

impl<I, O, F> Inlet<I> for TransformInlet<I, O, F>
where
    I: Send,
    O: Send,
    F: FnMut(I) -> Result<Option<O>, BoxError> + Send,
{
    fn accept(&mut self, item: I) -> Result<(), StageError> {
        match (self.body)(item) {
            Ok(Some(output)) => forward(&self.stage, &mut self.outlet, output),
            Ok(None) => Ok(()),
            Err(source) => Err(StageError::Compute {
                stage: self.stage.clone(),
                source,
            }),
        }
    }

    fn finish(&mut self) -> Result<(), StageError> {
        self.outlet.close()
    }
}

// ── Sink ───────────────────────────────────────────────────────────────────

/// Handle to a sink stage.
pub struct SinkStage<I> {
    pub(crate) pipeline: PipelineId,
    pub(crate) id: StageId,
    pub(crate) input: InputPort<I>,
}

impl<I> SinkStage<I> {
    pub fn input(&self) -> InputPort<I> {
        self.input
    }
}

pub(crate) struct SinkNode<I, F> {
    pub(crate) input: PortId,
    pub(crate) body: F,
    pub(crate) _input: PhantomData<fn(I)>,
}

impl<I, F> StageNode for SinkNode<I, F>
where
    I: Send + 'static,
    F: FnMut(I) -> Result<(), BoxError> + Send + 'static,
{
    fn into_inlet(
        self: Box<Self>,
        _ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<ErasedInlet> {
        let inlet = SinkInlet {
            stage: shape.name.clone(),
            body: self.body,
            _input: PhantomData,
        };
        Ok(erase_inlet::<I>(Box::new(inlet)))
    }

    fn into_task(
        self: Box<Self>,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<Box<dyn Task>> {
        let reader = ctx.reader::<I>(self.input)?;
        let inlet = SinkInlet {
            stage: shape.name.clone(),
            body: self.body,
            _input: PhantomData,
        };
        Ok(Box::new(Pump::new(reader, Box::new(inlet))))
    }
}

struct SinkInlet<I, F> {
    stage: String,
    body: F,
    _input: PhantomData<fn(I)>,
}

impl<I, F> Inlet<I> for SinkInlet<I, F>
where
    I: Send,
    F: FnMut(I) -> Result<(), BoxError> + Send,
{
    fn accept(&mut self, item: I) -> Result<(), StageError> {
        (self.body)(item).map_err(|source| StageError::Compute {
            stage: self.stage.clone(),
            source,
        })
    }

    fn finish(&mut self) -> Result<(), StageError> {
        Ok(())
    }
}

/// Elements gathered by a collector sink.
///
/// Only the collector's own thread writes during execution; read it after
/// `execute_blocking` has returned.
pub struct Collected<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Collected<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take everything collected so far.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        // A panicking sink leaves the Vec intact; keep what it gathered.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for Collected<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! stage_handle {
    ($handle:ident < $($param:ident),+ >) => {
        impl<$($param),+> StageHandle for $handle<$($param),+> {
            fn stage_id(&self) -> StageId {
                self.id
            }

            fn pipeline_id(&self) -> PipelineId {
                self.pipeline
            }
        }

        impl<$($param),+> Clone for $handle<$($param),+> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<$($param),+> Copy for $handle<$($param),+> {}
    };
}

stage_handle!(SourceStage<T>);
stage_handle!(TransformStage<I, O>);
stage_handle!(SinkStage<I>);

pub(crate) use stage_handle;

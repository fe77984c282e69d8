//! Graph assembly and validation.
//!
//! A [`Pipeline`] owns every stage, port and edge. Stages are added with the
//! `add_*` methods, which return typed handles; ports are joined with
//! [`connect`](Pipeline::connect), which only accepts an output and an input
//! of the same element type. [`execute_blocking`](Pipeline::execute_blocking)
//! consumes the pipeline, so a running graph can never be modified.

use std::any::Any;
use std::marker::PhantomData;

use super::distributor::{DistributorNode, DistributorStage};
use super::id::{EdgeId, PipelineId, PortId, StageId};
use super::merger::{MergerNode, MergerStage};
use super::port::{InputPort, OutputPort, PortDirection};
use super::queue::Queue;
use super::runtime::{self, ExecutionReport};
use super::stage::{
    Activation, Collected, SinkNode, SinkStage, SourceNode, SourceStage, StageHandle, StageKind,
    StageNode, StageShape, TransformNode, TransformStage,
};
use crate::config::EngineConfig;
use crate::error::{BoxError, GraphError, GraphResult};

type Endpoints = (Box<dyn Any + Send>, Box<dyn Any + Send>);

/// Creates the queue for one edge, already split and erased.
pub(crate) type OpenQueue = fn(usize) -> GraphResult<Endpoints>;

fn open_queue<T: Send + 'static>(capacity: usize) -> GraphResult<Endpoints> {
    let (writer, reader) = Queue::<T>::bounded(capacity)?.split();
    Ok((Box::new(writer), Box::new(reader)))
}

pub(crate) struct StageSlot {
    pub(crate) shape: StageShape,
    pub(crate) activation: Activation,
    /// Taken when the stage is built for execution.
    pub(crate) node: Option<Box<dyn StageNode>>,
}

pub(crate) struct PortRecord {
    pub(crate) stage: StageId,
    pub(crate) direction: PortDirection,
    pub(crate) edge: Option<EdgeId>,
}

pub(crate) struct Edge {
    pub(crate) from: PortId,
    pub(crate) to: PortId,
    pub(crate) capacity: usize,
    pub(crate) open: OpenQueue,
}

/// A dataflow graph under assembly.
pub struct Pipeline {
    id: PipelineId,
    capacity: usize,
    slots: Vec<StageSlot>,
    ports: Vec<PortRecord>,
    edges: Vec<Edge>,
}

impl Pipeline {
    /// Create an empty pipeline whose queues default to the configured
    /// capacity.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_capacity(config.queue_capacity)
    }

    /// Create an empty pipeline with an explicit default queue capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: PipelineId::next(),
            capacity,
            slots: Vec::new(),
            ports: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn stage_count(&self) -> usize {
        self.slots.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of stages that will get their own thread.
    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.activation == Activation::Active)
            .count()
    }

    // ── Stage creation ─────────────────────────────────────────────────────

    fn next_stage(&self) -> StageId {
        StageId::from_index(self.slots.len())
    }

    fn register_port(&mut self, stage: StageId, direction: PortDirection) -> PortId {
        let id = PortId::from_index(self.ports.len());
        self.ports.push(PortRecord {
            stage,
            direction,
            edge: None,
        });
        id
    }

    fn push_stage(
        &mut self,
        id: StageId,
        name: String,
        kind: StageKind,
        ports: (Vec<PortId>, Vec<PortId>),
        node: Box<dyn StageNode>,
    ) {
        let (inputs, outputs) = ports;
        tracing::trace!(stage = %name, %kind, %id, "Stage added");
        self.slots.push(StageSlot {
            shape: StageShape {
                id,
                name,
                kind,
                inputs,
                outputs,
            },
            activation: Activation::default(),
            node: Some(node),
        });
    }

    /// Add a source fed by a lazy, finite generator.
    ///
    /// The generator is consumed on the source's own thread; a source must be
    /// declared active.
    pub fn add_source<T, G>(&mut self, name: impl Into<String>, generator: G) -> SourceStage<T>
    where
        T: Send + 'static,
        G: IntoIterator<Item = T> + Send + 'static,
    {
        let id = self.next_stage();
        let output = self.register_port(id, PortDirection::Output);
        let node = SourceNode::<T, G> {
            output,
            generator,
            _element: PhantomData,
        };
        self.push_stage(
            id,
            name.into(),
            StageKind::Source,
            (Vec::new(), vec![output]),
            Box::new(node),
        );
        SourceStage {
            pipeline: self.id,
            id,
            output: OutputPort::new(self.id, output),
        }
    }

    /// Add a transform. Returning `Ok(None)` drops the element; returning
    /// `Err` ends the chain the stage runs on.
    pub fn add_transform<I, O, F>(
        &mut self,
        name: impl Into<String>,
        body: F,
    ) -> TransformStage<I, O>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: FnMut(I) -> Result<Option<O>, BoxError> + Send + 'static,
    {
        let id = self.next_stage();
        let input = self.register_port(id, PortDirection::Input);
        let output = self.register_port(id, PortDirection::Output);
        let node = TransformNode::<I, O, F> {
            input,
            output,
            body,
            _types: PhantomData,
        };
        self.push_stage(
            id,
            name.into(),
            StageKind::Transform,
            (vec![input], vec![output]),
            Box::new(node),
        );
        TransformStage {
            pipeline: self.id,
            id,
            input: InputPort::new(self.id, input),
            output: OutputPort::new(self.id, output),
        }
    }

    /// Add an infallible one-to-one transform.
    pub fn add_map<I, O, F>(&mut self, name: impl Into<String>, mut f: F) -> TransformStage<I, O>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: FnMut(I) -> O + Send + 'static,
    {
        self.add_transform(name, move |item| Ok(Some(f(item))))
    }

    /// Add a sink that runs `body` for its side effect.
    pub fn add_sink<I, F>(&mut self, name: impl Into<String>, body: F) -> SinkStage<I>
    where
        I: Send + 'static,
        F: FnMut(I) -> Result<(), BoxError> + Send + 'static,
    {
        let id = self.next_stage();
        let input = self.register_port(id, PortDirection::Input);
        let node = SinkNode::<I, F> {
            input,
            body,
            _input: PhantomData,
        };
        self.push_stage(
            id,
            name.into(),
            StageKind::Sink,
            (vec![input], Vec::new()),
            Box::new(node),
        );
        SinkStage {
            pipeline: self.id,
            id,
            input: InputPort::new(self.id, input),
        }
    }

    /// Add a sink that gathers every element it receives.
    pub fn add_collector<T>(&mut self, name: impl Into<String>) -> (SinkStage<T>, Collected<T>)
    where
        T: Send + 'static,
    {
        let collected = Collected::new();
        let sink = collected.clone();
        let stage = self.add_sink(name, move |item| {
            sink.push(item);
            Ok(())
        });
        (stage, collected)
    }

    /// Add a round-robin distributor. Attach outputs with
    /// [`new_output_port`](Self::new_output_port).
    pub fn add_distributor<T>(&mut self, name: impl Into<String>) -> DistributorStage<T>
    where
        T: Send + 'static,
    {
        let id = self.next_stage();
        let input = self.register_port(id, PortDirection::Input);
        let node = DistributorNode::<T> {
            input,
            _element: PhantomData,
        };
        self.push_stage(
            id,
            name.into(),
            StageKind::Distributor,
            (vec![input], Vec::new()),
            Box::new(node),
        );
        DistributorStage {
            pipeline: self.id,
            id,
            input: InputPort::new(self.id, input),
        }
    }

    /// Add a merger. Attach inputs with
    /// [`new_input_port`](Self::new_input_port); a merger must be declared
    /// active.
    pub fn add_merger<T>(&mut self, name: impl Into<String>) -> MergerStage<T>
    where
        T: Send + 'static,
    {
        let id = self.next_stage();
        let output = self.register_port(id, PortDirection::Output);
        let node = MergerNode::<T> {
            output,
            _element: PhantomData,
        };
        self.push_stage(
            id,
            name.into(),
            StageKind::Merger,
            (Vec::new(), vec![output]),
            Box::new(node),
        );
        MergerStage {
            pipeline: self.id,
            id,
            output: OutputPort::new(self.id, output),
        }
    }

    fn owned_stage(&self, stage: &impl StageHandle) -> GraphResult<StageId> {
        if stage.pipeline_id() != self.id {
            return Err(GraphError::ForeignStage {
                stage: stage.stage_id(),
            });
        }
        Ok(stage.stage_id())
    }

    /// Append a new output to a distributor's rotation.
    pub fn new_output_port<T>(
        &mut self,
        distributor: &DistributorStage<T>,
    ) -> GraphResult<OutputPort<T>> {
        let stage = self.owned_stage(distributor)?;
        let port = self.register_port(stage, PortDirection::Output);
        self.slots[stage.index()].shape.outputs.push(port);
        Ok(OutputPort::new(self.id, port))
    }

    /// Append a new input to a merger.
    pub fn new_input_port<T>(&mut self, merger: &MergerStage<T>) -> GraphResult<InputPort<T>> {
        let stage = self.owned_stage(merger)?;
        let port = self.register_port(stage, PortDirection::Input);
        self.slots[stage.index()].shape.inputs.push(port);
        Ok(InputPort::new(self.id, port))
    }

    /// Give a stage its own thread.
    pub fn declare_active(&mut self, stage: &impl StageHandle) -> GraphResult<()> {
        let id = self.owned_stage(stage)?;
        self.slots[id.index()].activation = Activation::Active;
        Ok(())
    }

    // ── Connections ────────────────────────────────────────────────────────

    /// Connect an output to an input with the pipeline's default capacity.
    pub fn connect<T: Send + 'static>(
        &mut self,
        from: OutputPort<T>,
        to: InputPort<T>,
    ) -> GraphResult<EdgeId> {
        self.connect_with_capacity(from, to, self.capacity)
    }

    /// Connect an output to an input through a queue of `capacity` elements.
    pub fn connect_with_capacity<T: Send + 'static>(
        &mut self,
        from: OutputPort<T>,
        to: InputPort<T>,
        capacity: usize,
    ) -> GraphResult<EdgeId> {
        if capacity == 0 {
            return Err(GraphError::ZeroCapacity);
        }
        self.check_unbound(from.pipeline, from.id)?;
        self.check_unbound(to.pipeline, to.id)?;

        let edge = EdgeId::from_index(self.edges.len());
        self.edges.push(Edge {
            from: from.id,
            to: to.id,
            capacity,
            open: open_queue::<T>,
        });
        self.ports[from.id.index()].edge = Some(edge);
        self.ports[to.id.index()].edge = Some(edge);
        Ok(edge)
    }

    fn check_unbound(&self, pipeline: PipelineId, port: PortId) -> GraphResult<()> {
        if pipeline != self.id {
            return Err(GraphError::ForeignPort { port });
        }
        let record = &self.ports[port.index()];
        if record.edge.is_some() {
            return Err(GraphError::PortAlreadyBound {
                stage: self.stage_name(record.stage).to_string(),
                port,
            });
        }
        Ok(())
    }

    fn stage_name(&self, stage: StageId) -> &str {
        &self.slots[stage.index()].shape.name
    }

    // ── Validation ─────────────────────────────────────────────────────────

    /// Check that the graph can run: every port connected, fan-out and fan-in
    /// stages non-empty, sources and mergers active, and no cycles.
    pub fn validate(&self) -> GraphResult<()> {
        for slot in &self.slots {
            let shape = &slot.shape;
            let stage = || shape.name.clone();
            let passive = slot.activation == Activation::Passive;

            match shape.kind {
                StageKind::Source if passive => {
                    return Err(GraphError::PassiveSource { stage: stage() })
                }
                StageKind::Merger if passive => {
                    return Err(GraphError::PassiveMerger { stage: stage() })
                }
                StageKind::Distributor if shape.outputs.is_empty() => {
                    return Err(GraphError::EmptyDistributor { stage: stage() })
                }
                StageKind::Merger if shape.inputs.is_empty() => {
                    return Err(GraphError::EmptyMerger { stage: stage() })
                }
                _ => {}
            }

            for &port in shape.inputs.iter().chain(&shape.outputs) {
                let record = &self.ports[port.index()];
                if record.edge.is_none() {
                    return Err(GraphError::UnconnectedPort {
                        stage: stage(),
                        port,
                        direction: record.direction,
                    });
                }
            }
        }
        self.check_acyclic()
    }

    /// Iterative depth-first search over stage-to-stage edges.
    fn check_acyclic(&self) -> GraphResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut successors = vec![Vec::new(); self.slots.len()];
        for edge in &self.edges {
            let from = self.ports[edge.from.index()].stage;
            let to = self.ports[edge.to.index()].stage;
            successors[from.index()].push(to.index());
        }

        let mut marks = vec![Mark::Unvisited; self.slots.len()];
        for root in 0..self.slots.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::InProgress;

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                if let Some(&succ) = successors[node].get(*next) {
                    *next += 1;
                    match marks[succ] {
                        Mark::InProgress => {
                            return Err(GraphError::Cycle {
                                stage: self.slots[succ].shape.name.clone(),
                            })
                        }
                        Mark::Unvisited => {
                            marks[succ] = Mark::InProgress;
                            stack.push((succ, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    // ── Execution ──────────────────────────────────────────────────────────

    /// Validate, start one thread per active stage, and block until every
    /// one of them has returned.
    ///
    /// Configuration problems are returned as `Err` before any thread starts.
    /// Failures inside running stages are logged and listed in the returned
    /// [`ExecutionReport`].
    pub fn execute_blocking(self) -> GraphResult<ExecutionReport> {
        self.validate()?;
        tracing::info!(
            stages = self.stage_count(),
            threads = self.active_count(),
            edges = self.edge_count(),
            queue_capacity = self.capacity,
            "Starting pipeline"
        );
        runtime::execute(self.slots, self.ports, self.edges)
    }
}

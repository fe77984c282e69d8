//! Execution: turns a validated pipeline into running threads.
//!
//! Execution happens in three steps:
//!
//! 1. Every edge that feeds an active stage becomes a bounded queue.
//! 2. Every active stage is built into a [`Task`]. Its outputs become inline
//!    calls into the passive stages below it. Those passive stages are built
//!    recursively, until the chain reaches a queue.
//! 3. One named OS thread is spawned per task. All of them are joined before
//!    [`execute`] returns.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::Dispatch;

use super::graph::{Edge, PortRecord, StageSlot};
use super::id::{PortId, StageId};
use super::queue::{QueueReader, QueueWriter};
use super::stage::{Activation, Inlet, Outlet, StageKind, StageShape, Task};
use crate::error::{GraphError, GraphResult, StageError};

/// Lifecycle of an active stage. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Created,
    Running,
    /// Input exhausted; flushing and closing outputs.
    Draining,
    Terminated,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageState::Created => "created",
            StageState::Running => "running",
            StageState::Draining => "draining",
            StageState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Per-thread bookkeeping handed to a running [`Task`].
#[derive(Debug)]
pub(crate) struct Lifecycle {
    stage: String,
    state: StageState,
    processed: u64,
}

impl Lifecycle {
    pub(crate) fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            state: StageState::Created,
            processed: 0,
        }
    }

    pub(crate) fn advance(&mut self, next: StageState) {
        if next <= self.state {
            return;
        }
        tracing::debug!(
            stage = %self.stage,
            from = %self.state,
            to = %next,
            "Stage state changed"
        );
        self.state = next;
    }

    /// Count one element taken from the input (or, for a source, emitted).
    pub(crate) fn record(&mut self) {
        self.processed += 1;
    }

    pub(crate) fn state(&self) -> StageState {
        self.state
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed
    }
}

/// What happened to one active stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub stage: String,
    pub kind: StageKind,
    pub state: StageState,
    /// Elements consumed (or produced, for a source) by the thread.
    pub processed: u64,
    pub error: Option<String>,
    /// The stage only failed because a neighbour failed first.
    pub cascaded: bool,
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Failed for a reason of its own rather than as a consequence.
    pub fn is_root_failure(&self) -> bool {
        self.error.is_some() && !self.cascaded
    }
}

/// Result of a completed [`execute_blocking`](super::Pipeline::execute_blocking).
///
/// Stage failures do not abort the run; they are listed here.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub stages: Vec<StageOutcome>,
    pub elapsed: Duration,
}

impl ExecutionReport {
    pub fn failures(&self) -> impl Iterator<Item = &StageOutcome> {
        self.stages.iter().filter(|outcome| !outcome.is_success())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    /// Failures not caused by another stage's failure.
    pub fn root_failure_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|outcome| outcome.is_root_failure())
            .count()
    }

    /// Look up an active stage by name.
    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|outcome| outcome.stage == name)
    }
}

// ── Assembly ───────────────────────────────────────────────────────────────

type Endpoint = Box<dyn Any + Send>;

/// Builds the run-time form of stages out of the pipeline arena.
pub(crate) struct Assembly<'a> {
    slots: &'a mut [StageSlot],
    ports: &'a [PortRecord],
    edges: &'a [Edge],
    /// Queue halves not yet claimed, keyed by the port they serve.
    endpoints: HashMap<PortId, Endpoint>,
}

impl<'a> Assembly<'a> {
    fn new(
        slots: &'a mut [StageSlot],
        ports: &'a [PortRecord],
        edges: &'a [Edge],
    ) -> GraphResult<Self> {
        let mut endpoints = HashMap::new();
        for edge in edges {
            let consumer = ports[edge.to.index()].stage;
            if slots[consumer.index()].activation == Activation::Active {
                let (writer, reader) = (edge.open)(edge.capacity)?;
                endpoints.insert(edge.from, writer);
                endpoints.insert(edge.to, reader);
            }
        }
        Ok(Self {
            slots,
            ports,
            edges,
            endpoints,
        })
    }

    fn unconnected(&self, port: PortId) -> GraphError {
        let record = &self.ports[port.index()];
        GraphError::UnconnectedPort {
            stage: self.slots[record.stage.index()].shape.name.clone(),
            port,
            direction: record.direction,
        }
    }

    /// Stage on the consuming side of the edge bound to `port`.
    fn consumer_of(&self, port: PortId) -> GraphResult<StageId> {
        let edge = self.ports[port.index()]
            .edge
            .ok_or_else(|| self.unconnected(port))?;
        let to = self.edges[edge.index()].to;
        Ok(self.ports[to.index()].stage)
    }

    fn take_endpoint<E: 'static>(&mut self, port: PortId) -> GraphResult<E> {
        let endpoint = self
            .endpoints
            .remove(&port)
            .ok_or_else(|| self.unconnected(port))?;
        endpoint
            .downcast::<E>()
            .map(|endpoint| *endpoint)
            .map_err(|_| GraphError::PortTypeMismatch { port })
    }

    /// Bind an output port: a queue writer if the consumer is active, or the
    /// consumer's inlet (built on the spot) if it is passive.
    pub(crate) fn outlet<T: Send + 'static>(&mut self, port: PortId) -> GraphResult<Outlet<T>> {
        let consumer = self.consumer_of(port)?;
        let slot = &mut self.slots[consumer.index()];
        if slot.activation == Activation::Active {
            let writer = self.take_endpoint::<QueueWriter<T>>(port)?;
            return Ok(Outlet::queue(writer));
        }

        let shape = slot.shape.clone();
        // A passive stage is consumed by the first chain that reaches it.
        let node = slot.node.take().ok_or_else(|| GraphError::Cycle {
            stage: shape.name.clone(),
        })?;
        let inlet = node
            .into_inlet(self, &shape)?
            .downcast::<Box<dyn Inlet<T>>>()
            .map_err(|_| GraphError::PortTypeMismatch { port })?;
        Ok(Outlet::inline(*inlet))
    }

    /// Claim the queue reader of an active stage's input port.
    pub(crate) fn reader<T: Send + 'static>(
        &mut self,
        port: PortId,
    ) -> GraphResult<QueueReader<T>> {
        self.take_endpoint::<QueueReader<T>>(port)
    }
}

// ── Execution ──────────────────────────────────────────────────────────────

/// Build, spawn and join every active stage.
pub(crate) fn execute(
    mut slots: Vec<StageSlot>,
    ports: Vec<PortRecord>,
    edges: Vec<Edge>,
) -> GraphResult<ExecutionReport> {
    let start = Instant::now();
    let tasks = assemble(&mut slots, &ports, &edges)?;
    drop(slots);

    let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
    let mut handles = Vec::with_capacity(tasks.len());
    let mut pending = tasks.into_iter();

    while let Some((shape, task)) = pending.next() {
        let name = shape.name.clone();
        let kind = shape.kind;
        let dispatch = dispatch.clone();
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_stage(dispatch, shape, task));

        match spawned {
            Ok(handle) => handles.push((name, kind, handle)),
            Err(source) => {
                // Dropping the unstarted tasks closes their queues, which
                // lets the threads already running wind down.
                drop(pending);
                let _ = join_all(handles);
                return Err(GraphError::Spawn {
                    stage: name,
                    source,
                });
            }
        }
    }

    let stages = join_all(handles);
    let report = ExecutionReport {
        stages,
        elapsed: start.elapsed(),
    };

    let failed = report.failure_count();
    if failed == 0 {
        tracing::info!(
            stages = report.stages.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Pipeline finished"
        );
    } else {
        tracing::warn!(
            stages = report.stages.len(),
            failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Pipeline finished with failed stages"
        );
    }
    Ok(report)
}

fn assemble(
    slots: &mut [StageSlot],
    ports: &[PortRecord],
    edges: &[Edge],
) -> GraphResult<Vec<(StageShape, Box<dyn Task>)>> {
    let mut ctx = Assembly::new(slots, ports, edges)?;
    let mut tasks = Vec::new();

    for index in 0..ctx.slots.len() {
        let slot = &mut ctx.slots[index];
        if slot.activation != Activation::Active {
            continue;
        }
        let shape = slot.shape.clone();
        let Some(node) = slot.node.take() else {
            continue;
        };
        let task = node.into_task(&mut ctx, &shape)?;
        tasks.push((shape, task));
    }

    if let Some(slot) = ctx.slots.iter().find(|slot| slot.node.is_some()) {
        return Err(GraphError::UnreachableStage {
            stage: slot.shape.name.clone(),
        });
    }
    Ok(tasks)
}

/// Thread body shared by every active stage.
fn run_stage(dispatch: Dispatch, shape: StageShape, task: Box<dyn Task>) -> StageOutcome {
    tracing::dispatcher::with_default(&dispatch, || {
        let span = tracing::info_span!("stage", name = %shape.name, kind = %shape.kind);
        let _enter = span.enter();

        let mut lifecycle = Lifecycle::new(&shape.name);
        lifecycle.advance(StageState::Running);

        // The task is consumed by `run`, so its queues are closed by the time
        // this returns, on success, error or panic alike.
        let result = panic::catch_unwind(AssertUnwindSafe(|| task.run(&mut lifecycle)))
            .unwrap_or_else(|payload| {
                Err(StageError::Panicked {
                    stage: shape.name.clone(),
                    message: panic_message(payload.as_ref()),
                })
            });

        lifecycle.advance(StageState::Terminated);
        let cascaded = matches!(&result, Err(e) if e.is_cascade());
        match &result {
            Err(e) if cascaded => tracing::warn!(processed = lifecycle.processed(), "{e}"),
            Err(e) => tracing::error!(processed = lifecycle.processed(), "{e}"),
            Ok(()) => {}
        }

        StageOutcome {
            stage: shape.name,
            kind: shape.kind,
            state: lifecycle.state(),
            processed: lifecycle.processed(),
            error: result.err().map(|e| e.to_string()),
            cascaded,
        }
    })
}

type StageHandleList = Vec<(String, StageKind, thread::JoinHandle<StageOutcome>)>;

fn join_all(handles: StageHandleList) -> Vec<StageOutcome> {
    handles
        .into_iter()
        .map(|(stage, kind, handle)| {
            handle.join().unwrap_or_else(|payload| StageOutcome {
                error: Some(
                    StageError::Panicked {
                        stage: stage.clone(),
                        message: panic_message(payload.as_ref()),
                    }
                    .to_string(),
                ),
                stage,
                kind,
                state: StageState::Terminated,
                processed: 0,
                cascaded: false,
            })
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

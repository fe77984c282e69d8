//! Fan-in: many input streams combined into one.
//!
//! The merger always runs on its own thread. It sweeps its inputs
//! round-robin starting after the last input it took from, and when every
//! open input is empty it parks until one of them becomes ready. Interleaving
//! across inputs follows arrival and is not deterministic.
//!
//! The output closes only after *every* input has been closed and drained;
//! an input that is merely empty is still waited on.

use std::marker::PhantomData;

use crossbeam_channel::Select;

use super::id::{PipelineId, PortId, StageId};
use super::port::OutputPort;
use super::queue::{QueueReader, TryPop};
use super::runtime::{Assembly, Lifecycle, StageState};
use super::stage::{
    forward, stage_handle, ErasedInlet, Outlet, StageHandle, StageNode, StageShape, Task,
};
use crate::error::{GraphError, GraphResult, StageError};

/// Handle to a merger stage.
pub struct MergerStage<T> {
    pub(crate) pipeline: PipelineId,
    pub(crate) id: StageId,
    pub(crate) output: OutputPort<T>,
}

impl<T> MergerStage<T> {
    pub fn output(&self) -> OutputPort<T> {
        self.output
    }
}

stage_handle!(MergerStage<T>);

pub(crate) struct MergerNode<T> {
    pub(crate) output: PortId,
    pub(crate) _element: PhantomData<fn(T) -> T>,
}

impl<T: Send + 'static> StageNode for MergerNode<T> {
    fn into_inlet(
        self: Box<Self>,
        _ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<ErasedInlet> {
        Err(GraphError::PassiveMerger {
            stage: shape.name.clone(),
        })
    }

    fn into_task(
        self: Box<Self>,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<Box<dyn Task>> {
        let inputs = shape
            .inputs
            .iter()
            .map(|&port| ctx.reader::<T>(port))
            .collect::<GraphResult<Vec<_>>>()?;
        let outlet = ctx.outlet::<T>(self.output)?;
        Ok(Box::new(MergerTask::new(shape.name.clone(), inputs, outlet)))
    }
}

pub(crate) struct MergerTask<T> {
    stage: String,
    inputs: Vec<QueueReader<T>>,
    open: Vec<bool>,
    cursor: usize,
    outlet: Outlet<T>,
}

impl<T> MergerTask<T> {
    pub(crate) fn new(stage: String, inputs: Vec<QueueReader<T>>, outlet: Outlet<T>) -> Self {
        let open = vec![true; inputs.len()];
        Self {
            stage,
            inputs,
            open,
            cursor: 0,
            outlet,
        }
    }

    fn remaining(&self) -> usize {
        self.open.iter().filter(|open| **open).count()
    }

    /// One round-robin pass. Returns the first element found, marking inputs
    /// that turn out to be finished along the way.
    fn sweep(&mut self) -> Option<T> {
        let count = self.inputs.len();
        for offset in 0..count {
            let index = (self.cursor + offset) % count;
            if !self.open[index] {
                continue;
            }
            match self.inputs[index].try_pop() {
                TryPop::Item(item) => {
                    self.cursor = (index + 1) % count;
                    return Some(item);
                }
                TryPop::Empty => {}
                TryPop::EndOfStream => {
                    self.open[index] = false;
                    tracing::debug!(stage = %self.stage, "Input {index} reached end-of-stream");
                }
            }
        }
        None
    }

    /// Park until some open input has an element or has been closed.
    fn wait_ready(&self) {
        let mut select = Select::new();
        for (reader, _) in self.inputs.iter().zip(&self.open).filter(|(_, open)| **open) {
            select.recv(reader.receiver());
        }
        select.ready();
    }
}

impl<T: Send + 'static> Task for MergerTask<T> {
    fn run(mut self: Box<Self>, lifecycle: &mut Lifecycle) -> Result<(), StageError> {
        while self.remaining() > 0 {
            match self.sweep() {
                Some(item) => {
                    forward(&self.stage, &mut self.outlet, item)?;
                    lifecycle.record();
                }
                None if self.remaining() > 0 => self.wait_ready(),
                None => {}
            }
        }
        lifecycle.advance(StageState::Draining);
        self.outlet.close()
    }
}

//! Fan-out: one input stream spread round-robin across many outputs.
//!
//! Outputs are attached during assembly with
//! [`Pipeline::new_output_port`](super::Pipeline::new_output_port). While every
//! branch is alive, element `i` goes to output `i mod K`. A branch whose
//! consumer has gone away is retired and the element moves on to the next
//! live branch.

use std::marker::PhantomData;

use super::id::{PipelineId, PortId, StageId};
use super::port::InputPort;
use super::runtime::Assembly;
use super::stage::{
    erase_inlet, stage_handle, ErasedInlet, Inlet, Outlet, Pump, SendError, StageHandle,
    StageNode, StageShape, Task,
};
use crate::error::{GraphResult, StageError};

/// Handle to a distributor stage.
pub struct DistributorStage<T> {
    pub(crate) pipeline: PipelineId,
    pub(crate) id: StageId,
    pub(crate) input: InputPort<T>,
}

impl<T> DistributorStage<T> {
    pub fn input(&self) -> InputPort<T> {
        self.input
    }
}

stage_handle!(DistributorStage<T>);

pub(crate) struct DistributorNode<T> {
    pub(crate) input: PortId,
    pub(crate) _element: PhantomData<fn(T)>,
}

impl<T: Send + 'static> DistributorNode<T> {
    fn build(ctx: &mut Assembly<'_>, shape: &StageShape) -> GraphResult<DistributorInlet<T>> {
        let targets = shape
            .outputs
            .iter()
            .map(|&port| ctx.outlet::<T>(port))
            .collect::<GraphResult<Vec<_>>>()?;
        Ok(DistributorInlet::new(shape.name.clone(), targets))
    }
}

impl<T: Send + 'static> StageNode for DistributorNode<T> {
    fn into_inlet(
        self: Box<Self>,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<ErasedInlet> {
        let inlet = Self::build(ctx, shape)?;
        Ok(erase_inlet::<T>(Box::new(inlet)))
    }

    fn into_task(
        self: Box<Self>,
        ctx: &mut Assembly<'_>,
        shape: &StageShape,
    ) -> GraphResult<Box<dyn Task>> {
        let reader = ctx.reader::<T>(self.input)?;
        let inlet = Self::build(ctx, shape)?;
        Ok(Box::new(Pump::new(reader, Box::new(inlet))))
    }
}

pub(crate) struct DistributorInlet<T> {
    stage: String,
    targets: Vec<Outlet<T>>,
    cursor: usize,
}

impl<T> DistributorInlet<T> {
    pub(crate) fn new(stage: String, targets: Vec<Outlet<T>>) -> Self {
        Self {
            stage,
            targets,
            cursor: 0,
        }
    }
}

impl<T: Send> Inlet<T> for DistributorInlet<T> {
    fn accept(&mut self, item: T) -> Result<(), StageError> {
        let mut item = item;
        loop {
            if self.targets.is_empty() {
                return Err(StageError::NoLiveTargets {
                    stage: self.stage.clone(),
                });
            }
            let index = self.cursor;
            match self.targets[index].send(item) {
                Ok(()) => {
                    self.cursor = (index + 1) % self.targets.len();
                    return Ok(());
                }
                Err(SendError::Closed(rejected)) => {
                    self.targets.remove(index);
                    tracing::warn!(
                        stage = %self.stage,
                        live = self.targets.len(),
                        "Branch {index} closed, retiring it from the rotation"
                    );
                    if !self.targets.is_empty() {
                        self.cursor = index % self.targets.len();
                    }
                    item = rejected;
                }
                Err(SendError::Downstream(e)) => return Err(e),
            }
        }
    }

    fn finish(&mut self) -> Result<(), StageError> {
        // Close every branch even if one of them fails to flush.
        let mut first_error = None;
        for target in &mut self.targets {
            if let Err(e) = target.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

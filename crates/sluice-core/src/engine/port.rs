//! Typed port handles.
//!
//! A port is a connection point on a stage. Handles are cheap `Copy` values
//! that name a slot in the pipeline's port registry; the registry records
//! which edge (and therefore which queue) the port is bound to. The element
//! type `T` is carried only at the type level, so `connect` can refuse to
//! join an `OutputPort<A>` to an `InputPort<B>` at compile time.

use std::fmt;
use std::marker::PhantomData;

use super::id::{PipelineId, PortId};

/// Whether a port consumes or produces elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// The producing end of a connection.
pub struct OutputPort<T> {
    pub(crate) pipeline: PipelineId,
    pub(crate) id: PortId,
    _element: PhantomData<fn() -> T>,
}

/// The consuming end of a connection.
pub struct InputPort<T> {
    pub(crate) pipeline: PipelineId,
    pub(crate) id: PortId,
    _element: PhantomData<fn(T)>,
}

impl<T> OutputPort<T> {
    pub(crate) fn new(pipeline: PipelineId, id: PortId) -> Self {
        Self {
            pipeline,
            id,
            _element: PhantomData,
        }
    }

    /// Registry id of this port.
    pub fn id(&self) -> PortId {
        self.id
    }
}

impl<T> InputPort<T> {
    pub(crate) fn new(pipeline: PipelineId, id: PortId) -> Self {
        Self {
            pipeline,
            id,
            _element: PhantomData,
        }
    }

    /// Registry id of this port.
    pub fn id(&self) -> PortId {
        self.id
    }
}

// Manual impls: deriving would demand `T: Clone`/`T: Debug`.

impl<T> Clone for OutputPort<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for OutputPort<T> {}

impl<T> Clone for InputPort<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for InputPort<T> {}

impl<T> fmt::Debug for OutputPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPort")
            .field("id", &self.id)
            .field("element", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> fmt::Debug for InputPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPort")
            .field("id", &self.id)
            .field("element", &std::any::type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ports_are_copy_without_element_bounds() {
        struct NotClone;
        let pipeline = PipelineId::next();
        let port: OutputPort<NotClone> = OutputPort::new(pipeline, PortId::from_index(0));
        let copy = port;
        assert_eq!(port.id(), copy.id());
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(PortDirection::Input.to_string(), "input");
        assert_eq!(PortDirection::Output.to_string(), "output");
    }
}

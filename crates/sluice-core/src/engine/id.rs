//! Identity types for the pipeline arena.
//!
//! Stage, port and edge ids are newtypes over `u32` that index directly into
//! the pipeline's storage vectors. Typed handles additionally carry the
//! [`PipelineId`] of the pipeline that created them, so a handle can never
//! be used against a different graph.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PIPELINE: AtomicU64 = AtomicU64::new(1);

/// Identifies one `Pipeline` instance for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(u64);

impl PipelineId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PIPELINE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Index into the pipeline's stage arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub(crate) u32);

/// Index into the pipeline's port registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub(crate) u32);

/// Index into the pipeline's edge list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) u32);

macro_rules! arena_id {
    ($name:ident, $prefix:literal) => {
        impl $name {
            #[inline]
            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(StageId, "stage#");
arena_id!(PortId, "port#");
arena_id!(EdgeId, "edge#");

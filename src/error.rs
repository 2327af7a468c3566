//! Error types shared by the host kernels and the graph builder.
//!
//! Everything in here is *recoverable*: the caller decides whether to abort
//! the inference. Broken preconditions (a staging ref that is not staging, a
//! classification reaching an unreachable branch) are bugs in the caller and
//! panic instead of producing one of these.

use crate::tensors::DType;
use thiserror::Error;

/// Failure to change a host tensor's shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResizeError {
    /// The tensor has a static shape and the requested shape differs.
    #[error("cannot resize static tensor from {from:?} to {to:?}")]
    StaticShape {
        /// Current shape.
        from: Vec<usize>,
        /// Requested shape.
        to: Vec<usize>,
    },
    /// The requested element count exceeds the bounded allocation.
    #[error("resize to {requested} elements exceeds capacity of {capacity}")]
    CapacityExceeded {
        /// Elements needed by the new shape.
        requested: usize,
        /// Elements the allocation can hold.
        capacity: usize,
    },
}

/// Invalid-argument failures raised by host kernels.
///
/// These are always detected before the output is written, so an `out`
/// tensor that saw one of these errors holds its previous contents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// The promoted computation type cannot be cast into the output dtype.
    #[error("cannot cast computation type {from} into output type {to}")]
    UnsupportedCast {
        /// Promoted computation dtype.
        from: DType,
        /// Declared output dtype.
        to: DType,
    },
    /// Two shapes disagree on an axis where neither side is 1.
    #[error("shapes {a:?} and {b:?} are not broadcast compatible")]
    IncompatibleShapes {
        /// Left operand shape.
        a: Vec<usize>,
        /// Right operand shape.
        b: Vec<usize>,
    },
    /// The output dtype differs from the one the operation produces.
    #[error("expected output dtype {expected}, got {got}")]
    DTypeMismatch {
        /// Dtype the operation produces.
        expected: DType,
        /// Dtype of the supplied output.
        got: DType,
    },
    /// Resizing the output tensor failed.
    #[error("failed to resize output tensor: {0}")]
    Resize(#[from] ResizeError),
}

/// Recoverable failures while building a compute graph.
///
/// Returned before any node is appended, so node lists stay consistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Texture-backed tensors support at most four dimensions.
    #[error("device images support up to 4 dims, got {0}")]
    UnsupportedRank(usize),
    /// A source was already prepacked under a different layout.
    #[error("value {value} already prepacked as {existing:?}, requested {requested:?}")]
    ConflictingLayout {
        /// Index of the source value.
        value: usize,
        /// Layout used by the existing prepack.
        existing: crate::graph::MemoryLayout,
        /// Layout requested now.
        requested: crate::graph::MemoryLayout,
    },
    /// `prepack` was asked to upload a value that holds no constant data.
    #[error("value {0} is not a tensor ref")]
    NotATensorRef(usize),
}

//! Runtime configuration.
//!
//! Two levels of settings live here:
//!
//! - A process-wide host-kernel knob, the element count from which the host
//!   kernels split their work across the rayon pool. It is stored in an
//!   atomic so it can be tuned at runtime without locking.
//! - [`GraphConfig`], owned by each [`ComputeGraph`](crate::graph::ComputeGraph),
//!   holding the limits and defaults used while building nodes.
//!
//! # Example
//!
//! ```
//! use briny_rt::config::{parallel_threshold, set_parallel_threshold};
//! set_parallel_threshold(1 << 20);
//! assert_eq!(parallel_threshold(), 1 << 20);
//! ```

use crate::graph::{MemoryLayout, StorageKind};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Default minimum element count for parallel host loops.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1 << 15;

/// Default cap on invocations per workgroup.
pub const DEFAULT_MAX_WORKGROUP_INVOCATIONS: u32 = 64;

/// Relaxed ordering: the threshold only affects scheduling, never results.
static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);

/// Sets the element count at which host kernels go parallel.
///
/// A value of 0 makes every non-empty loop parallel; `usize::MAX` disables
/// parallelism.
pub fn set_parallel_threshold(n: usize) {
    PARALLEL_THRESHOLD.store(n, Ordering::Relaxed);
}

/// Returns the current parallel threshold.
pub fn parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

/// Per-graph build settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Upper bound on `local[0] * local[1] * local[2]`.
    pub max_workgroup_invocations: u32,
    /// Forces every suggested layout to this value when set.
    pub memory_layout_override: Option<MemoryLayout>,
    /// Storage used by `add_tensor_like` and by prepacked tensors.
    pub default_storage: StorageKind,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_workgroup_invocations: DEFAULT_MAX_WORKGROUP_INVOCATIONS,
            memory_layout_override: None,
            default_storage: StorageKind::DeviceImage,
        }
    }
}

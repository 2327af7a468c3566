//! Per-call kernel context.
//!
//! Kernels with the `out`-returning calling convention cannot return a
//! `Result`; they record the failure here instead and hand back `out`
//! untouched. The caller inspects the context after the call.

use crate::error::KernelError;

/// Error sink threaded through kernel calls.
#[derive(Debug, Default)]
pub struct KernelContext {
    failure: Option<KernelError>,
}

impl KernelContext {
    /// A context with no recorded failure.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure. The first one sticks until taken; later ones are
    /// only logged.
    pub fn fail(&mut self, err: KernelError) {
        log::warn!("kernel failed: {err}");
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    /// The recorded failure, if any.
    #[must_use]
    pub const fn failure_state(&self) -> Option<&KernelError> {
        self.failure.as_ref()
    }

    /// Takes the recorded failure, leaving the context clean.
    pub fn take_failure(&mut self) -> Option<KernelError> {
        self.failure.take()
    }

    /// Whether no failure has been recorded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

//! # Host Operator Dispatch
//!
//! This module turns one elementwise multiply call on host tensors into a run
//! of exactly one specialized kernel.
//!
//! ## Submodules
//!
//! - [`broadcast`] — Classifies operand pairs and computes broadcast shapes
//! - [`promote`] — Runtime and type-level dtype promotion and cast rules
//! - [`cpu`] — Lane-unrolled, rayon-parallel CPU kernels
//! - [`dispatch`] — Fast-path selection and the lazily built kernel table
//! - [`context`] — Error sink for the `out`-returning calling convention
//! - [`mul`] — `mul.out` and `mul.Scalar_out` entry points
//!
//! ## Pipeline
//!
//! ```text
//! classify ──> select_fast_path ──> KernelTable::lookup ──> resize out ──> kernel
//! ```
//!
//! Every check happens before `out` is resized, so a failed call never
//! leaves a half-written output.
//!
//! ## Extending
//!
//! To add another elementwise operator:
//!
//! 1. Add its per-element semantics as a trait next to
//!    [`Multiply`](promote::Multiply)
//! 2. Build a table for it the way [`dispatch`] does for multiply
//! 3. Add entry points mirroring [`mul`]

pub mod broadcast;
pub mod context;
pub mod cpu;
pub mod dispatch;
pub mod mul;
pub mod promote;

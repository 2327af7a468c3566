//! briny_rt: the operator execution core of an on-device inference runtime.
//!
//! Turns one tensor operation into either a type- and shape-aware
//! computation on host memory, or a list of GPU transfer steps recorded in a
//! compute graph for a scheduler to run later.
//!
//! # Features
//!
//! - Broadcasting elementwise multiply with dtype promotion, dispatched to a
//!   specialized kernel per dtype triple and broadcast strategy.
//! - Lane-unrolled CPU kernels parallelized with `rayon` on large inputs.
//! - Compute-graph construction for staging uploads/downloads and one-time
//!   weight prepacking, with adaptive workgroup sizing.
//!
//! # Modules
//!
//! - [`tensors`] — Host tensors, dtypes and scalars.
//! - [`ops`] — Broadcast classification, promotion and the multiply kernels.
//! - [`graph`] — Device tensor metadata, graph nodes and the staging builders.
//! - [`config`] — Runtime knobs and per-graph settings.
//! - [`error`] — Recoverable error types.
//!
//! # Logging
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade; install any
//! logger to see them. No logger is installed by this crate.
//!
//! # Example
//!
//! ```rust
//! use briny_rt::ops::mul::try_mul_scalar_out;
//! use briny_rt::tensors::{DType, HostTensor, Scalar};
//!
//! let a = HostTensor::new(&[4, 1], vec![1.0f32, 2.0, 3.0, 4.0]);
//! let mut out = HostTensor::zeros(DType::F32, &[4, 1]);
//! try_mul_scalar_out(&a, Scalar::Float(0.5), &mut out).unwrap();
//! assert_eq!(out.to_vec::<f32>().unwrap(), vec![0.5, 1.0, 1.5, 2.0]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod ops;
pub mod tensors;

//! Elementwise multiply entry points.
//!
//! Both operators follow the same sequence, and every check runs before the
//! output is touched:
//!
//! 1. classify the operands and validate the promoted dtype against `out`
//! 2. compute the output shape
//! 3. resolve the kernel from [`MUL_KERNELS`]
//! 4. resize `out`, then run
//!
//! The `mul_out` / `mul_scalar_out` pair uses the kernel calling convention:
//! failures go to the [`KernelContext`] and `out` is returned regardless.
//! The `try_` variants return a `Result` instead.
//!
//! # Example
//!
//! ```rust
//! use briny_rt::ops::context::KernelContext;
//! use briny_rt::ops::mul::mul_out;
//! use briny_rt::tensors::{DType, HostTensor};
//!
//! let a = HostTensor::new(&[2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! let b = HostTensor::new(&[3], vec![10.0f32, 100.0, 1000.0]);
//! let mut out = HostTensor::zeros(DType::F32, &[2, 3]);
//! let mut ctx = KernelContext::new();
//!
//! mul_out(&mut ctx, &a, &b, &mut out);
//! assert!(ctx.is_ok());
//! assert_eq!(out.to_vec::<f32>().unwrap(), vec![10.0, 200.0, 3000.0, 40.0, 500.0, 6000.0]);
//! ```

use crate::error::KernelError;
use crate::ops::broadcast::{BroadcastClassification, broadcast_shape, classify};
use crate::ops::context::KernelContext;
use crate::ops::dispatch::MUL_KERNELS;
use crate::ops::promote::{promote_type_with_scalar, promote_types};
use crate::tensors::{HostTensor, Scalar};

/// `out = a * b` with broadcasting and type promotion.
///
/// Returns the classification that was executed.
///
/// # Errors
/// - [`KernelError::UnsupportedCast`] if the promoted dtype cannot be written
///   into `out`
/// - [`KernelError::IncompatibleShapes`] if the shapes do not broadcast
/// - [`KernelError::Resize`] if `out` cannot take the broadcast shape
///
/// `out` is left unchanged on every error.
pub fn try_mul_out(
    a: &HostTensor,
    b: &HostTensor,
    out: &mut HostTensor,
) -> Result<BroadcastClassification, KernelError> {
    let out_dtype = out.dtype();
    let class = classify(a.into(), b.into(), out_dtype);
    let unsupported = move || KernelError::UnsupportedCast {
        from: promote_types(a.dtype(), b.dtype(), true),
        to: out_dtype,
    };
    if class == BroadcastClassification::Unsupported {
        return Err(unsupported());
    }

    let shape = broadcast_shape(a.shape(), b.shape())?;
    let kernel = MUL_KERNELS
        .lookup(class, a.dtype(), b.dtype(), out_dtype)
        .ok_or_else(unsupported)?;
    out.resize(&shape)?;

    log::debug!(
        "mul: {class:?} via {kernel:?}, {}{:?} * {}{:?} -> {}{:?}",
        a.dtype(),
        a.shape(),
        b.dtype(),
        b.shape(),
        out.dtype(),
        out.shape()
    );
    kernel.run(a, b, out);
    Ok(class)
}

/// Kernel-convention wrapper around [`try_mul_out`].
pub fn mul_out<'o>(
    ctx: &mut KernelContext,
    a: &HostTensor,
    b: &HostTensor,
    out: &'o mut HostTensor,
) -> &'o mut HostTensor {
    if let Err(err) = try_mul_out(a, b, out) {
        ctx.fail(err);
    }
    out
}

/// `out = a * s`.
///
/// The computation dtype is `a`'s dtype promoted with the scalar's category;
/// it must equal `out`'s dtype.
///
/// # Errors
/// - [`KernelError::DTypeMismatch`] if `out` is not the promoted dtype
/// - [`KernelError::UnsupportedCast`] if `a` cannot be cast into it
/// - [`KernelError::Resize`] if `out` cannot take `a`'s shape
pub fn try_mul_scalar_out(
    a: &HostTensor,
    s: Scalar,
    out: &mut HostTensor,
) -> Result<(), KernelError> {
    let common = promote_type_with_scalar(a.dtype(), s, false);
    if common != out.dtype() {
        return Err(KernelError::DTypeMismatch {
            expected: common,
            got: out.dtype(),
        });
    }
    let kernel = MUL_KERNELS
        .lookup_scalar(a.dtype(), common)
        .ok_or(KernelError::UnsupportedCast {
            from: a.dtype(),
            to: common,
        })?;
    out.resize(a.shape())?;

    log::debug!(
        "mul.Scalar: {kernel:?}, {}{:?} * {s:?} -> {common}",
        a.dtype(),
        a.shape()
    );
    kernel.run(a, s, out);
    Ok(())
}

/// Kernel-convention wrapper around [`try_mul_scalar_out`].
pub fn mul_scalar_out<'o>(
    ctx: &mut KernelContext,
    a: &HostTensor,
    s: Scalar,
    out: &'o mut HostTensor,
) -> &'o mut HostTensor {
    if let Err(err) = try_mul_scalar_out(a, s, out) {
        ctx.fail(err);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResizeError;
    use crate::tensors::{DType, ShapeDynamism};

    #[test]
    fn unsupported_cast_leaves_out_alone() {
        let a = HostTensor::new(&[2], vec![1.5f32, 2.5]);
        let b = HostTensor::new(&[2], vec![2i32, 2]);
        let mut out = HostTensor::new(&[2], vec![7i32, 7]);
        let err = try_mul_out(&a, &b, &mut out).unwrap_err();
        assert_eq!(
            err,
            KernelError::UnsupportedCast {
                from: DType::F32,
                to: DType::I32
            }
        );
        assert_eq!(out.to_vec::<i32>().unwrap(), vec![7, 7]);
    }

    #[test]
    fn static_output_must_already_fit() {
        let a = HostTensor::new(&[2, 2], vec![1i64, 2, 3, 4]);
        let b = HostTensor::scalar(3i64);
        let mut out = HostTensor::zeros(DType::I64, &[4]).with_dynamism(ShapeDynamism::Static);
        let err = try_mul_out(&a, &b, &mut out).unwrap_err();
        assert!(matches!(err, KernelError::Resize(ResizeError::StaticShape { .. })));
        assert_eq!(out.shape(), &[4]);
    }

    #[test]
    fn scalar_output_dtype_is_checked() {
        let a = HostTensor::new(&[3], vec![1i32, 2, 3]);
        let mut out = HostTensor::zeros(DType::I32, &[3]);
        let err = try_mul_scalar_out(&a, Scalar::Float(0.5), &mut out).unwrap_err();
        assert_eq!(
            err,
            KernelError::DTypeMismatch {
                expected: DType::F32,
                got: DType::I32
            }
        );
    }

    #[test]
    fn context_records_failure_and_returns_out() {
        let a = HostTensor::zeros(DType::F32, &[2, 3]);
        let b = HostTensor::zeros(DType::F32, &[4, 5]);
        let mut out = HostTensor::zeros(DType::F32, &[1]);
        let mut ctx = KernelContext::new();
        let returned = mul_out(&mut ctx, &a, &b, &mut out);
        assert_eq!(returned.shape(), &[1]);
        assert!(matches!(
            ctx.failure_state(),
            Some(KernelError::IncompatibleShapes { .. })
        ));
    }
}

//! Broadcast classification and shape arithmetic.
//!
//! [`classify`] looks only at dtypes and shapes, never at data, and picks the
//! cheapest strategy that is still exact:
//!
//! 1. one side holds a single element (same dtype everywhere, not half)
//! 2. mixed dtypes or half: generic path with promotion
//! 3. shapes equal once leading 1s are dropped: treat as one flat sequence
//! 4. a matrix against a vector matching its last axis: row broadcast
//! 5. anything else: generic N-d broadcast
//!
//! # Example
//!
//! ```rust
//! use briny_rt::ops::broadcast::{classify, BroadcastClassification, Operand};
//! use briny_rt::tensors::DType;
//!
//! let a = Operand::new(DType::F32, &[2, 3]);
//! let b = Operand::new(DType::F32, &[3]);
//! assert_eq!(classify(a, b, DType::F32), BroadcastClassification::Broadcast2dBy1d);
//! ```

use crate::error::KernelError;
use crate::ops::promote::{can_cast, promote_types};
use crate::tensors::{DType, HostTensor, numel_of};

/// Execution strategy for an operand pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastClassification {
    /// `b` holds a single element.
    ScalarRhs,
    /// `a` holds a single element.
    ScalarLhs,
    /// Both operands address the same flat sequence.
    Treat1d,
    /// `a` is a matrix, `b` a vector matching its last axis.
    Broadcast2dBy1d,
    /// `a` is the vector, `b` the matrix.
    Broadcast2dBy1dReversed,
    /// Per-element index arithmetic with dtype promotion.
    GenericNd,
    /// The promoted dtype cannot be written into the output.
    Unsupported,
}

/// Dtype and shape of one operand; all [`classify`] needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand<'a> {
    /// Element type.
    pub dtype: DType,
    /// Logical shape.
    pub shape: &'a [usize],
}

impl<'a> Operand<'a> {
    /// Bundles a dtype and shape.
    #[must_use]
    pub const fn new(dtype: DType, shape: &'a [usize]) -> Self {
        Self { dtype, shape }
    }

    /// Element count.
    #[must_use]
    pub fn numel(&self) -> usize {
        numel_of(self.shape)
    }
}

impl<'a> From<&'a HostTensor> for Operand<'a> {
    fn from(t: &'a HostTensor) -> Self {
        Self::new(t.dtype(), t.shape())
    }
}

/// The suffix of `shape` starting at the first entry that is not 1.
#[must_use]
pub fn strip_leading_ones(shape: &[usize]) -> &[usize] {
    let start = shape.iter().position(|&d| d != 1).unwrap_or(shape.len());
    &shape[start..]
}

/// Whether two shapes are equal once leading 1s are ignored.
#[must_use]
pub fn sizes_match_ignoring_leading_ones(a: &[usize], b: &[usize]) -> bool {
    strip_leading_ones(a) == strip_leading_ones(b)
}

fn select_2d_by_1d(a: &[usize], b: &[usize]) -> Option<BroadcastClassification> {
    let lhs = strip_leading_ones(a);
    let rhs = strip_leading_ones(b);
    match (lhs.len(), rhs.len()) {
        (2, 1) if lhs[1] == rhs[0] => Some(BroadcastClassification::Broadcast2dBy1d),
        (1, 2) if rhs[1] == lhs[0] => Some(BroadcastClassification::Broadcast2dBy1dReversed),
        _ => None,
    }
}

/// Classifies an operand pair into an execution strategy.
///
/// Shape compatibility is not checked here; [`broadcast_shape`] reports
/// mismatches, so an incompatible pair classifies as `GenericNd` and fails
/// there.
#[must_use]
pub fn classify(a: Operand<'_>, b: Operand<'_>, out: DType) -> BroadcastClassification {
    let uniform = a.dtype == b.dtype && a.dtype == out;

    if uniform && a.dtype != DType::F16 {
        if b.numel() == 1 {
            return BroadcastClassification::ScalarRhs;
        }
        if a.numel() == 1 {
            return BroadcastClassification::ScalarLhs;
        }
    } else {
        let common = promote_types(a.dtype, b.dtype, true);
        if !can_cast(common, out) {
            return BroadcastClassification::Unsupported;
        }
        return BroadcastClassification::GenericNd;
    }

    if sizes_match_ignoring_leading_ones(a.shape, b.shape) {
        return BroadcastClassification::Treat1d;
    }

    select_2d_by_1d(a.shape, b.shape).unwrap_or(BroadcastClassification::GenericNd)
}

/// The elementwise-broadcast result shape of `a` and `b`.
///
/// Axes are aligned from the trailing end; each output axis is the larger of
/// the two, and a pair that is neither equal nor contains a 1 is rejected.
///
/// # Errors
/// [`KernelError::IncompatibleShapes`] on a non-broadcastable pair.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, KernelError> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
        out[rank - 1 - i] = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(KernelError::IncompatibleShapes {
                a: a.to_vec(),
                b: b.to_vec(),
            });
        };
    }
    Ok(out)
}

/// Per-output-axis element strides of `input` when broadcast to `out`.
///
/// Axes the input lacks, or holds with size 1, get stride 0 so every index
/// along them maps back to offset 0.
#[must_use]
pub fn broadcast_strides(out: &[usize], input: &[usize]) -> Vec<usize> {
    let offset = out.len() - input.len();
    let mut strides = vec![0; out.len()];
    let mut running = 1;
    for (i, &d) in input.iter().enumerate().rev() {
        if d != 1 {
            strides[offset + i] = running;
        }
        running *= d;
    }
    strides
}

/// Offset into `input` of the element broadcast to output index `linear`.
///
/// The kernels walk indices incrementally; this is the closed form used to
/// cross-check them.
#[must_use]
pub fn broadcast_offset(linear: usize, out: &[usize], input: &[usize]) -> usize {
    let strides = broadcast_strides(out, input);
    let mut remaining = linear;
    let mut offset = 0;
    for (axis, &d) in out.iter().enumerate().rev() {
        if d == 0 {
            return 0;
        }
        offset += (remaining % d) * strides[axis];
        remaining /= d;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use BroadcastClassification::*;

    fn op(shape: &[usize]) -> Operand<'_> {
        Operand::new(DType::F32, shape)
    }

    #[test]
    fn scalar_sides() {
        assert_eq!(classify(op(&[4, 1]), op(&[1]), DType::F32), ScalarRhs);
        assert_eq!(classify(op(&[]), op(&[2, 3]), DType::F32), ScalarLhs);
    }

    #[test]
    fn half_never_takes_a_fast_path() {
        let a = Operand::new(DType::F16, &[4]);
        let b = Operand::new(DType::F16, &[1]);
        assert_eq!(classify(a, b, DType::F16), GenericNd);
    }

    #[test]
    fn mixed_dtypes_are_generic() {
        let a = Operand::new(DType::I32, &[3]);
        let b = Operand::new(DType::F32, &[3]);
        assert_eq!(classify(a, b, DType::F32), GenericNd);
        assert_eq!(classify(a, b, DType::I32), Unsupported);
    }

    #[test]
    fn leading_ones_are_ignored() {
        assert_eq!(classify(op(&[1, 1, 2, 3]), op(&[2, 3]), DType::F32), Treat1d);
        assert_eq!(classify(op(&[1, 5, 4]), op(&[4]), DType::F32), Broadcast2dBy1d);
        assert_eq!(classify(op(&[4]), op(&[1, 5, 4]), DType::F32), Broadcast2dBy1dReversed);
    }

    #[test]
    fn other_shapes_are_generic() {
        assert_eq!(classify(op(&[2, 3]), op(&[2, 1]), DType::F32), GenericNd);
        assert_eq!(classify(op(&[2, 3, 4]), op(&[4]), DType::F32), GenericNd);
        assert_eq!(classify(op(&[2, 3]), op(&[4, 5]), DType::F32), GenericNd);
    }

    #[test]
    fn broadcast_shape_aligns_trailing_axes() {
        assert_eq!(broadcast_shape(&[2, 1, 4], &[3, 1]).unwrap(), vec![2, 3, 4]);
        assert_eq!(broadcast_shape(&[], &[5]).unwrap(), vec![5]);
        assert_eq!(broadcast_shape(&[0, 3], &[1, 3]).unwrap(), vec![0, 3]);
        assert!(matches!(
            broadcast_shape(&[2, 3], &[4, 5]),
            Err(KernelError::IncompatibleShapes { .. })
        ));
    }

    #[test]
    fn strides_zero_on_broadcast_axes() {
        assert_eq!(broadcast_strides(&[2, 3, 4], &[3, 1]), vec![0, 1, 0]);
        assert_eq!(broadcast_strides(&[2, 3], &[2, 3]), vec![3, 1]);
        assert_eq!(broadcast_offset(5, &[2, 3], &[3]), 2);
        assert_eq!(broadcast_offset(5, &[2, 3], &[2, 1]), 1);
    }
}

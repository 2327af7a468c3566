//! Parallel CPU elementwise kernels
//!
//! # CPU Kernels
//!
//! Monomorphic multiply loops, one per broadcast strategy. The dispatch
//! layer picks the strategy and element types; everything in here assumes
//! its slices were already validated and sized.
//!
//! ## Features
//!
//! - Fixed-width lane loops (`LANES` elements per step) with a scalar
//!   remainder tail, which the optimizer turns into SIMD for native types
//! - Parallel execution using [`rayon`](https://docs.rs/rayon) once the output
//!   reaches [`parallel_threshold`]
//! - Generic N-d broadcast walking both inputs with an index odometer
//!
//! ## Design Goals
//!
//! - Bit-identical results whatever the lane width or chunking; each output
//!   element is computed by exactly the same expression
//! - No allocation besides the odometer state
//!
//! # Panics
//!
//! Every kernel panics on slice length mismatches. Those are bugs in the
//! dispatch layer, never user input.

use crate::config::parallel_threshold;
use crate::ops::broadcast::broadcast_strides;
use crate::ops::promote::{CastTo, Multiply};
use crate::tensors::Element;
use rayon::prelude::*;

/// Elements per lane step.
pub const LANES: usize = 8;

/// Elements handed to one rayon task. A multiple of [`LANES`].
const CHUNK: usize = LANES * 512;

/// Runs `f(start, chunk)` over `out`, in parallel above the threshold.
fn split_chunks<O, F>(out: &mut [O], chunk: usize, f: F)
where
    O: Send,
    F: Fn(usize, &mut [O]) + Send + Sync,
{
    if out.is_empty() {
        return;
    }
    if out.len() < parallel_threshold() {
        f(0, out);
    } else {
        out.par_chunks_mut(chunk)
            .enumerate()
            .for_each(|(i, c)| f(i * chunk, c));
    }
}

#[inline]
fn lanes_binary<T: Multiply>(out: &mut [T], a: &[T], b: &[T]) {
    let mut o = out.chunks_exact_mut(LANES);
    let mut x = a.chunks_exact(LANES);
    let mut y = b.chunks_exact(LANES);
    for ((o, x), y) in (&mut o).zip(&mut x).zip(&mut y) {
        for i in 0..LANES {
            o[i] = x[i].mul(y[i]);
        }
    }
    for ((o, &x), &y) in o
        .into_remainder()
        .iter_mut()
        .zip(x.remainder())
        .zip(y.remainder())
    {
        *o = x.mul(y);
    }
}

#[inline]
fn lanes_scalar<T: Multiply>(out: &mut [T], a: &[T], s: T) {
    let mut o = out.chunks_exact_mut(LANES);
    let mut x = a.chunks_exact(LANES);
    for (o, x) in (&mut o).zip(&mut x) {
        for i in 0..LANES {
            o[i] = x[i].mul(s);
        }
    }
    for (o, &x) in o.into_remainder().iter_mut().zip(x.remainder()) {
        *o = x.mul(s);
    }
}

/// `out[i] = a[i] * s`.
///
/// # Panics
/// If `out` and `a` differ in length.
pub fn mul_scalar_1d<T: Multiply>(out: &mut [T], a: &[T], s: T) {
    assert_eq!(out.len(), a.len(), "mul_scalar_1d length mismatch");
    split_chunks(out, CHUNK, |start, o| {
        let end = start + o.len();
        lanes_scalar(o, &a[start..end], s);
    });
}

/// `out[i] = a[i] * b[i]`.
///
/// # Panics
/// If the three slices differ in length.
pub fn mul_1d<T: Multiply>(out: &mut [T], a: &[T], b: &[T]) {
    assert!(
        out.len() == a.len() && a.len() == b.len(),
        "mul_1d length mismatch"
    );
    split_chunks(out, CHUNK, |start, o| {
        let end = start + o.len();
        lanes_binary(o, &a[start..end], &b[start..end]);
    });
}

/// `out[r, c] = lhs[r, c] * rhs[c]` over a row-major matrix of `cols` columns.
///
/// # Panics
/// If `rhs` is not `cols` long or `out`/`lhs` are not a whole number of rows.
pub fn mul_2d_by_1d<T: Multiply>(out: &mut [T], lhs: &[T], rhs: &[T], cols: usize) {
    assert_eq!(rhs.len(), cols, "mul_2d_by_1d row length mismatch");
    assert_eq!(out.len(), lhs.len(), "mul_2d_by_1d length mismatch");
    if cols == 0 {
        return;
    }
    assert_eq!(out.len() % cols, 0, "mul_2d_by_1d ragged matrix");

    let rows_per_chunk = (CHUNK / cols).max(1);
    split_chunks(out, rows_per_chunk * cols, |start, o| {
        let lhs = &lhs[start..start + o.len()];
        for (o, l) in o.chunks_exact_mut(cols).zip(lhs.chunks_exact(cols)) {
            lanes_binary(o, l, rhs);
        }
    });
}

/// Walks a row-major output index and tracks the matching input offsets.
struct Odometer<'a> {
    shape: &'a [usize],
    a_strides: &'a [usize],
    b_strides: &'a [usize],
    index: Vec<usize>,
    a: usize,
    b: usize,
}

impl<'a> Odometer<'a> {
    fn at(
        shape: &'a [usize],
        a_strides: &'a [usize],
        b_strides: &'a [usize],
        linear: usize,
    ) -> Self {
        let mut index = vec![0; shape.len()];
        let (mut a, mut b) = (0, 0);
        let mut remaining = linear;
        for axis in (0..shape.len()).rev() {
            let i = remaining % shape[axis];
            remaining /= shape[axis];
            index[axis] = i;
            a += i * a_strides[axis];
            b += i * b_strides[axis];
        }
        Self {
            shape,
            a_strides,
            b_strides,
            index,
            a,
            b,
        }
    }

    #[inline]
    fn advance(&mut self) {
        for axis in (0..self.shape.len()).rev() {
            self.index[axis] += 1;
            self.a += self.a_strides[axis];
            self.b += self.b_strides[axis];
            if self.index[axis] < self.shape[axis] {
                return;
            }
            self.a -= self.a_strides[axis] * self.shape[axis];
            self.b -= self.b_strides[axis] * self.shape[axis];
            self.index[axis] = 0;
        }
    }
}

/// Generic broadcasting multiply with promotion.
///
/// Each element is computed as `cast::<O>(cast::<C>(a) * cast::<C>(b))`,
/// where the input offsets follow standard broadcasting (size-1 and missing
/// axes contribute offset 0).
///
/// # Panics
/// If a slice does not match its shape, or `out_shape` is not the broadcast
/// of the two input shapes.
pub fn mul_broadcast<A, B, C, O>(
    out: &mut [O],
    out_shape: &[usize],
    a: &[A],
    a_shape: &[usize],
    b: &[B],
    b_shape: &[usize],
) where
    A: Element + CastTo<C>,
    B: Element + CastTo<C>,
    C: Multiply + CastTo<O>,
    O: Element,
{
    assert!(
        a_shape.len() <= out_shape.len() && b_shape.len() <= out_shape.len(),
        "mul_broadcast input rank exceeds output rank"
    );
    let a_strides = broadcast_strides(out_shape, a_shape);
    let b_strides = broadcast_strides(out_shape, b_shape);

    split_chunks(out, CHUNK, |start, o| {
        let mut cursor = Odometer::at(out_shape, &a_strides, &b_strides, start);
        for slot in o.iter_mut() {
            let x = <A as CastTo<C>>::cast(a[cursor.a]);
            let y = <B as CastTo<C>>::cast(b[cursor.b]);
            *slot = <C as CastTo<O>>::cast(x.mul(y));
            cursor.advance();
        }
    });
}

/// `out[i] = cast::<O>(cast::<C>(a[i]) * s)`.
///
/// # Panics
/// If `out` and `a` differ in length.
pub fn mul_scalar_cast<A, C, O>(out: &mut [O], a: &[A], s: C)
where
    A: Element + CastTo<C>,
    C: Multiply + CastTo<O>,
    O: Element,
{
    assert_eq!(out.len(), a.len(), "mul_scalar_cast length mismatch");
    split_chunks(out, CHUNK, |start, o| {
        let end = start + o.len();
        for (slot, &x) in o.iter_mut().zip(&a[start..end]) {
            *slot = <C as CastTo<O>>::cast(<A as CastTo<C>>::cast(x).mul(s));
        }
    });
}

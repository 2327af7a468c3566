//! Kernel Dispatch Layer
//!
//! This module turns a runtime `(lhs, rhs, out)` dtype triple plus a
//! [`BroadcastClassification`] into a call of one monomorphic kernel in
//! [`cpu`](super::cpu).
//!
//! Lookup happens in two steps:
//! 1. [`select_fast_path`] maps the classification onto a same-dtype fast
//!    path, if one exists
//! 2. [`KernelTable`] holds one function pointer per specialization, built
//!    once on first use and read-only afterwards
//!
//! # Design Highlights
//! - **Closed set**: every supported triple is instantiated at compile time;
//!   a triple missing from the table is an unsupported cast
//! - **Minimal overhead**: one hash lookup per call, no per-element dispatch
//! - **Validated up front**: a table entry only exists when the promoted
//!   computation type can be cast into the output
//!
//! # Example
//! ```rust
//! use briny_rt::ops::broadcast::BroadcastClassification;
//! use briny_rt::ops::dispatch::MUL_KERNELS;
//! use briny_rt::tensors::DType;
//!
//! let k = MUL_KERNELS.lookup(BroadcastClassification::GenericNd, DType::I32, DType::F16, DType::F32);
//! assert_eq!(k.map(|k| k.compute_dtype()), Some(DType::F32));
//! ```

use crate::ops::broadcast::BroadcastClassification;
use crate::ops::cpu;
use crate::ops::promote::{
    CastTo, Multiply, Promote, Promoted, Widen, Widened, can_cast, scalar_to,
};
use crate::tensors::{DType, Element, HostTensor, Scalar};
use core::fmt;
use half::f16;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// A same-dtype specialization reachable from a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPath {
    /// One operand is a single element; `swap` when that operand is `a`.
    Scalar {
        /// The scalar sits on the left.
        swap: bool,
    },
    /// Both operands are walked as one flat sequence.
    Flat,
    /// Matrix times row vector; `swap` when the vector is `a`.
    RowBroadcast {
        /// The vector sits on the left.
        swap: bool,
    },
}

/// Maps a classification onto its fast path. `GenericNd` and `Unsupported`
/// have none.
#[must_use]
pub const fn select_fast_path(class: BroadcastClassification) -> Option<FastPath> {
    match class {
        BroadcastClassification::ScalarRhs => Some(FastPath::Scalar { swap: false }),
        BroadcastClassification::ScalarLhs => Some(FastPath::Scalar { swap: true }),
        BroadcastClassification::Treat1d => Some(FastPath::Flat),
        BroadcastClassification::Broadcast2dBy1d => Some(FastPath::RowBroadcast { swap: false }),
        BroadcastClassification::Broadcast2dBy1dReversed => {
            Some(FastPath::RowBroadcast { swap: true })
        }
        BroadcastClassification::GenericNd | BroadcastClassification::Unsupported => None,
    }
}

type FastFn = fn(FastPath, &HostTensor, &HostTensor, &mut HostTensor);
type GenericFn = fn(&HostTensor, &HostTensor, &mut HostTensor);
type ScalarFn = fn(&HostTensor, Scalar, &mut HostTensor);

fn typed<T: Element>(t: &HostTensor) -> &[T] {
    t.as_slice::<T>().unwrap_or_else(|| {
        panic!("kernel for {} dispatched on a {} tensor", T::DTYPE, t.dtype())
    })
}

fn typed_mut<T: Element>(t: &mut HostTensor) -> &mut [T] {
    let found = t.dtype();
    t.as_mut_slice::<T>().unwrap_or_else(|| {
        panic!("kernel for {} dispatched on a {found} output", T::DTYPE)
    })
}

fn run_fast<T: Multiply>(path: FastPath, a: &HostTensor, b: &HostTensor, out: &mut HostTensor) {
    let (a, b) = (typed::<T>(a), typed::<T>(b));
    let out = typed_mut::<T>(out);
    match path {
        FastPath::Scalar { swap: false } => cpu::mul_scalar_1d(out, a, b[0]),
        FastPath::Scalar { swap: true } => cpu::mul_scalar_1d(out, b, a[0]),
        FastPath::Flat => cpu::mul_1d(out, a, b),
        FastPath::RowBroadcast { swap } => {
            let (matrix, row) = if swap { (b, a) } else { (a, b) };
            cpu::mul_2d_by_1d(out, matrix, row, row.len());
        }
    }
}

fn run_generic<A, B, O>(a: &HostTensor, b: &HostTensor, out: &mut HostTensor)
where
    A: Element + Promote<B> + CastTo<Promoted<A, B>>,
    B: Element + CastTo<Promoted<A, B>>,
    Promoted<A, B>: Multiply + CastTo<O>,
    O: Element,
{
    let shape = out.shape().to_vec();
    cpu::mul_broadcast::<A, B, Promoted<A, B>, O>(
        typed_mut(out),
        &shape,
        typed(a),
        a.shape(),
        typed(b),
        b.shape(),
    );
}

fn run_scalar_fast<T>(a: &HostTensor, s: Scalar, out: &mut HostTensor)
where
    T: Multiply,
    bool: CastTo<T>,
    i64: CastTo<T>,
    f64: CastTo<T>,
{
    cpu::mul_scalar_1d(typed_mut::<T>(out), typed(a), scalar_to::<T>(s));
}

fn run_scalar_generic<A, O>(a: &HostTensor, s: Scalar, out: &mut HostTensor)
where
    A: Element + CastTo<Widened<O>>,
    O: Element + Widen,
    Widened<O>: Multiply + CastTo<O>,
    bool: CastTo<Widened<O>>,
    i64: CastTo<Widened<O>>,
    f64: CastTo<Widened<O>>,
{
    let s = scalar_to::<Widened<O>>(s);
    cpu::mul_scalar_cast::<A, Widened<O>, O>(typed_mut(out), typed(a), s);
}

/// A resolved binary kernel, ready to run.
#[derive(Clone, Copy)]
pub enum BinaryKernel {
    /// Same-dtype fast path.
    Fast {
        /// Strategy the kernel runs.
        path: FastPath,
        /// Element type of all three tensors.
        dtype: DType,
        /// Entry point.
        run: FastFn,
    },
    /// Promoting N-d broadcast.
    Generic {
        /// Dtype the multiply is computed in.
        compute: DType,
        /// Entry point.
        run: GenericFn,
    },
}

impl BinaryKernel {
    /// Dtype the multiply is carried out in.
    #[must_use]
    pub const fn compute_dtype(&self) -> DType {
        match self {
            Self::Fast { dtype, .. } => *dtype,
            Self::Generic { compute, .. } => *compute,
        }
    }

    /// Runs the kernel. `out` must already have the broadcast shape.
    ///
    /// # Panics
    /// If the tensors' dtypes are not the ones the kernel was looked up for.
    pub fn run(&self, a: &HostTensor, b: &HostTensor, out: &mut HostTensor) {
        match *self {
            Self::Fast { path, run, .. } => run(path, a, b, out),
            Self::Generic { run, .. } => run(a, b, out),
        }
    }
}

impl fmt::Debug for BinaryKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast { path, dtype, .. } => f
                .debug_struct("Fast")
                .field("path", path)
                .field("dtype", dtype)
                .finish(),
            Self::Generic { compute, .. } => {
                f.debug_struct("Generic").field("compute", compute).finish()
            }
        }
    }
}

/// A resolved tensor-times-scalar kernel.
#[derive(Clone, Copy)]
pub struct ScalarKernel {
    /// Dtype the multiply is carried out in.
    pub compute: DType,
    run: ScalarFn,
}

impl ScalarKernel {
    /// Runs the kernel. `out` must already have `a`'s shape.
    ///
    /// # Panics
    /// If the tensors' dtypes are not the ones the kernel was looked up for.
    pub fn run(&self, a: &HostTensor, s: Scalar, out: &mut HostTensor) {
        (self.run)(a, s, out);
    }
}

impl fmt::Debug for ScalarKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarKernel")
            .field("compute", &self.compute)
            .finish()
    }
}

/// Every multiply specialization, keyed by dtype.
pub struct KernelTable {
    fast: HashMap<DType, FastFn>,
    generic: HashMap<(DType, DType, DType), BinaryKernel>,
    scalar_fast: HashMap<DType, ScalarFn>,
    scalar_generic: HashMap<(DType, DType), ScalarKernel>,
}

impl fmt::Debug for KernelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelTable")
            .field("fast", &self.fast.len())
            .field("generic", &self.generic.len())
            .field("scalar_fast", &self.scalar_fast.len())
            .field("scalar_generic", &self.scalar_generic.len())
            .finish()
    }
}

macro_rules! generic_for_out {
    ($table:ident; $a:ty, $b:ty; $($o:ty),*) => {
        $($table.insert_generic::<$a, $b, $o>();)*
    };
}

macro_rules! generic_for_rhs {
    ($table:ident; $a:ty; $($b:ty),*) => {
        $(generic_for_out!($table; $a, $b; bool, u8, i8, i16, i32, i64, f16, f32, f64);)*
    };
}

macro_rules! generic_for_lhs {
    ($table:ident; $($a:ty),*) => {
        $(generic_for_rhs!($table; $a; bool, u8, i8, i16, i32, i64, f16, f32, f64);)*
    };
}

macro_rules! scalar_generic_for_out {
    ($table:ident; $a:ty; $($o:ty),*) => {
        $($table.insert_scalar_generic::<$a, $o>();)*
    };
}

impl KernelTable {
    fn build() -> Self {
        let mut table = Self {
            fast: HashMap::new(),
            generic: HashMap::new(),
            scalar_fast: HashMap::new(),
            scalar_generic: HashMap::new(),
        };

        table.insert_fast::<bool>();
        table.insert_fast::<u8>();
        table.insert_fast::<i8>();
        table.insert_fast::<i16>();
        table.insert_fast::<i32>();
        table.insert_fast::<i64>();
        table.insert_fast::<f32>();
        table.insert_fast::<f64>();

        generic_for_lhs!(table; bool, u8, i8, i16, i32, i64, f16, f32, f64);

        for_each_scalar_lhs(&mut table);

        log::debug!("built multiply kernel table: {table:?}");
        table
    }

    fn insert_fast<T>(&mut self)
    where
        T: Multiply,
        bool: CastTo<T>,
        i64: CastTo<T>,
        f64: CastTo<T>,
    {
        self.fast.insert(T::DTYPE, run_fast::<T>);
        self.scalar_fast.insert(T::DTYPE, run_scalar_fast::<T>);
    }

    fn insert_generic<A, B, O>(&mut self)
    where
        A: Element + Promote<B> + CastTo<Promoted<A, B>>,
        B: Element + CastTo<Promoted<A, B>>,
        Promoted<A, B>: Multiply + CastTo<O>,
        O: Element,
    {
        let compute = <Promoted<A, B> as Element>::DTYPE;
        if can_cast(compute, O::DTYPE) {
            self.generic.insert(
                (A::DTYPE, B::DTYPE, O::DTYPE),
                BinaryKernel::Generic {
                    compute,
                    run: run_generic::<A, B, O>,
                },
            );
        }
    }

    fn insert_scalar_generic<A, O>(&mut self)
    where
        A: Element + CastTo<Widened<O>>,
        O: Element + Widen,
        Widened<O>: Multiply + CastTo<O>,
        bool: CastTo<Widened<O>>,
        i64: CastTo<Widened<O>>,
        f64: CastTo<Widened<O>>,
    {
        if can_cast(A::DTYPE, O::DTYPE) {
            self.scalar_generic.insert(
                (A::DTYPE, O::DTYPE),
                ScalarKernel {
                    compute: <Widened<O> as Element>::DTYPE,
                    run: run_scalar_generic::<A, O>,
                },
            );
        }
    }

    /// Resolves the kernel for a classified operand pair.
    ///
    /// Returns `None` for `Unsupported`, and for a promotion whose result
    /// cannot be cast into `out`.
    #[must_use]
    pub fn lookup(
        &self,
        class: BroadcastClassification,
        a: DType,
        b: DType,
        out: DType,
    ) -> Option<BinaryKernel> {
        match select_fast_path(class) {
            Some(path) => {
                assert!(
                    a == b && b == out,
                    "fast path {path:?} selected for mixed dtypes {a}, {b}, {out}"
                );
                self.fast.get(&a).map(|&run| BinaryKernel::Fast {
                    path,
                    dtype: a,
                    run,
                })
            }
            None if class == BroadcastClassification::Unsupported => None,
            None => self.generic.get(&(a, b, out)).copied(),
        }
    }

    /// Resolves the kernel for `a * scalar` computed in `common`.
    ///
    /// `common` is also the output dtype. The native loop is used when `a`
    /// already has that dtype and it is not half.
    #[must_use]
    pub fn lookup_scalar(&self, a: DType, common: DType) -> Option<ScalarKernel> {
        if a == common && a != DType::F16 {
            if let Some(&run) = self.scalar_fast.get(&a) {
                return Some(ScalarKernel { compute: a, run });
            }
        }
        self.scalar_generic.get(&(a, common)).copied()
    }
}

fn for_each_scalar_lhs(table: &mut KernelTable) {
    scalar_generic_for_out!(table; bool; bool, u8, i8, i16, i32, i64, f16, f32, f64);
    scalar_generic_for_out!(table; u8; bool, u8, i8, i16, i32, i64, f16, f32, f64);
    scalar_generic_for_out!(table; i8; bool, u8, i8, i16, i32, i64, f16, f32, f64);
    scalar_generic_for_out!(table; i16; bool, u8, i8, i16, i32, i64, f16, f32, f64);
    scalar_generic_for_out!(table; i32; bool, u8, i8, i16, i32, i64, f16, f32, f64);
    scalar_generic_for_out!(table; i64; bool, u8, i8, i16, i32, i64, f16, f32, f64);
    scalar_generic_for_out!(table; f16; bool, u8, i8, i16, i32, i64, f16, f32, f64);
    scalar_generic_for_out!(table; f32; bool, u8, i8, i16, i32, i64, f16, f32, f64);
    scalar_generic_for_out!(table; f64; bool, u8, i8, i16, i32, i64, f16, f32, f64);
}

lazy_static! {
    /// The process-wide multiply kernel table.
    pub static ref MUL_KERNELS: KernelTable = KernelTable::build();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::promote::promote_types;

    #[test]
    fn generic_entries_follow_runtime_promotion() {
        for a in DType::ALL {
            for b in DType::ALL {
                let common = promote_types(a, b, true);
                for out in DType::ALL {
                    let k = MUL_KERNELS.lookup(BroadcastClassification::GenericNd, a, b, out);
                    if can_cast(common, out) {
                        assert_eq!(k.map(|k| k.compute_dtype()), Some(common), "{a} {b} {out}");
                    } else {
                        assert!(k.is_none(), "{a} {b} {out} should be rejected");
                    }
                }
            }
        }
    }

    #[test]
    fn half_has_no_fast_kernel() {
        assert!(
            MUL_KERNELS
                .lookup(BroadcastClassification::Treat1d, DType::F16, DType::F16, DType::F16)
                .is_none()
        );
        let k = MUL_KERNELS.lookup_scalar(DType::F16, DType::F16).unwrap();
        assert_eq!(k.compute, DType::F32);
    }

    #[test]
    fn fast_path_mapping() {
        use BroadcastClassification::*;
        assert_eq!(select_fast_path(ScalarLhs), Some(FastPath::Scalar { swap: true }));
        assert_eq!(
            select_fast_path(Broadcast2dBy1dReversed),
            Some(FastPath::RowBroadcast { swap: true })
        );
        assert_eq!(select_fast_path(GenericNd), None);
        assert!(MUL_KERNELS.lookup(Unsupported, DType::F32, DType::F32, DType::I32).is_none());
    }

    #[test]
    fn scalar_lookup_prefers_native_loop() {
        let k = MUL_KERNELS.lookup_scalar(DType::I32, DType::I32).unwrap();
        assert_eq!(k.compute, DType::I32);
        let k = MUL_KERNELS.lookup_scalar(DType::I32, DType::F32).unwrap();
        assert_eq!(k.compute, DType::F32);
        assert!(MUL_KERNELS.lookup_scalar(DType::F32, DType::I32).is_none());
    }
}

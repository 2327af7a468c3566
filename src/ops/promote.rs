//! Type promotion and cast rules.
//!
//! The same lattice exists twice: once at runtime ([`promote_types`],
//! [`can_cast`]) for validating a call before touching data, and once at the
//! type level ([`Promote`], [`CastTo`]) so the dispatch table can instantiate
//! one monomorphic kernel per `(lhs, rhs, out)` dtype triple. The unit tests
//! keep the two in lockstep.
//!
//! Lattice, lowest to highest: `Bool` < integers < floats. Mixing `U8` with a
//! signed type lands on the smallest signed type holding both. Integers mixed
//! with floats take the float.

use crate::tensors::{DType, Element, Scalar};
use half::f16;

const fn rank(t: DType) -> usize {
    match t {
        DType::Bool => 0,
        DType::U8 => 1,
        DType::I8 => 2,
        DType::I16 => 3,
        DType::I32 => 4,
        DType::I64 => 5,
        DType::F16 => 6,
        DType::F32 => 7,
        DType::F64 => 8,
    }
}

/// Row `a`, column `b`, without the half-to-float adjustment.
const PROMOTE_TABLE: [[DType; 9]; 9] = {
    use DType::{
        Bool as B1, F16 as H2, F32 as F4, F64 as D8, I8 as I1, I16 as I2, I32 as I4, I64 as L8,
        U8 as U1,
    };
    [
        /*        b1  u1  i1  i2  i4  l8  h2  f4  d8 */
        /* b1 */ [B1, U1, I1, I2, I4, L8, H2, F4, D8],
        /* u1 */ [U1, U1, I2, I2, I4, L8, H2, F4, D8],
        /* i1 */ [I1, I2, I1, I2, I4, L8, H2, F4, D8],
        /* i2 */ [I2, I2, I2, I2, I4, L8, H2, F4, D8],
        /* i4 */ [I4, I4, I4, I4, I4, L8, H2, F4, D8],
        /* l8 */ [L8, L8, L8, L8, L8, L8, H2, F4, D8],
        /* h2 */ [H2, H2, H2, H2, H2, H2, H2, F4, D8],
        /* f4 */ [F4, F4, F4, F4, F4, F4, F4, F4, D8],
        /* d8 */ [D8, D8, D8, D8, D8, D8, D8, D8, D8],
    ]
};

/// The common dtype for an elementwise op over `a` and `b`.
///
/// With `half_to_float`, a result of `F16` is raised to `F32` so half inputs
/// are always computed in full precision.
#[must_use]
pub const fn promote_types(a: DType, b: DType, half_to_float: bool) -> DType {
    let t = PROMOTE_TABLE[rank(a)][rank(b)];
    if half_to_float && matches!(t, DType::F16) {
        DType::F32
    } else {
        t
    }
}

/// The common dtype of a tensor dtype and a scalar operand.
///
/// A scalar never widens a tensor within its own category: an `i64` scalar
/// times an `i8` tensor stays `i8`. Crossing categories picks the default
/// type of the scalar's category (`I64` for integers, `F32` for floats).
#[must_use]
pub const fn promote_type_with_scalar(t: DType, scalar: Scalar, half_to_float: bool) -> DType {
    let promoted = match scalar {
        Scalar::Bool(_) => t,
        Scalar::Int(_) => {
            if matches!(t, DType::Bool) {
                DType::I64
            } else {
                t
            }
        }
        Scalar::Float(_) => {
            if t.is_floating() {
                t
            } else {
                DType::F32
            }
        }
    };
    if half_to_float && matches!(promoted, DType::F16) {
        DType::F32
    } else {
        promoted
    }
}

/// Whether values of `from` may be written into a tensor of `to`.
///
/// Floats never narrow into integers, and nothing but `Bool` narrows into `Bool`.
#[must_use]
pub const fn can_cast(from: DType, to: DType) -> bool {
    if from.is_floating() && to.is_integral(false) {
        return false;
    }
    if !matches!(from, DType::Bool) && matches!(to, DType::Bool) {
        return false;
    }
    true
}

/// Type-level counterpart of [`promote_types`] with `half_to_float = true`.
pub trait Promote<Rhs> {
    /// The computation type.
    type Output;
}

/// Shorthand for the computation type of `A * B`.
pub type Promoted<A, B> = <A as Promote<B>>::Output;

macro_rules! promote_row {
    ($a:ty => $($b:ty : $c:ty),* $(,)?) => {
        $(impl Promote<$b> for $a { type Output = $c; })*
    };
}

promote_row!(bool => bool: bool, u8: u8, i8: i8, i16: i16, i32: i32, i64: i64, f16: f32, f32: f32, f64: f64);
promote_row!(u8 => bool: u8, u8: u8, i8: i16, i16: i16, i32: i32, i64: i64, f16: f32, f32: f32, f64: f64);
promote_row!(i8 => bool: i8, u8: i16, i8: i8, i16: i16, i32: i32, i64: i64, f16: f32, f32: f32, f64: f64);
promote_row!(i16 => bool: i16, u8: i16, i8: i16, i16: i16, i32: i32, i64: i64, f16: f32, f32: f32, f64: f64);
promote_row!(i32 => bool: i32, u8: i32, i8: i32, i16: i32, i32: i32, i64: i64, f16: f32, f32: f32, f64: f64);
promote_row!(i64 => bool: i64, u8: i64, i8: i64, i16: i64, i32: i64, i64: i64, f16: f32, f32: f32, f64: f64);
promote_row!(f16 => bool: f32, u8: f32, i8: f32, i16: f32, i32: f32, i64: f32, f16: f32, f32: f32, f64: f64);
promote_row!(f32 => bool: f32, u8: f32, i8: f32, i16: f32, i32: f32, i64: f32, f16: f32, f32: f32, f64: f64);
promote_row!(f64 => bool: f64, u8: f64, i8: f64, i16: f64, i32: f64, i64: f64, f16: f64, f32: f64, f64: f64);

/// Computation type used when the result lands in `Self`: half is widened,
/// everything else computes natively.
pub trait Widen {
    /// The computation type.
    type Compute;
}

/// Shorthand for `<O as Widen>::Compute`.
pub type Widened<O> = <O as Widen>::Compute;

macro_rules! widen_native {
    ($($t:ty),*) => { $(impl Widen for $t { type Compute = $t; })* };
}

widen_native!(bool, u8, i8, i16, i32, i64, f32, f64);

impl Widen for f16 {
    type Compute = f32;
}

/// Native conversion between element types.
///
/// Numeric pairs follow `as` semantics (float to integer saturates, integer
/// narrowing wraps). Anything to `bool` is `!= 0`; `bool` to a number is 0 or 1.
pub trait CastTo<T> {
    /// Converts `self` into `T`.
    fn cast(self) -> T;
}

macro_rules! cast_as {
    ($from:ty => $($to:ty),*) => {
        $(impl CastTo<$to> for $from {
            #[inline]
            fn cast(self) -> $to {
                self as $to
            }
        })*
    };
}

cast_as!(u8 => u8, i8, i16, i32, i64, f32, f64);
cast_as!(i8 => u8, i8, i16, i32, i64, f32, f64);
cast_as!(i16 => u8, i8, i16, i32, i64, f32, f64);
cast_as!(i32 => u8, i8, i16, i32, i64, f32, f64);
cast_as!(i64 => u8, i8, i16, i32, i64, f32, f64);
cast_as!(f32 => u8, i8, i16, i32, i64, f32, f64);
cast_as!(f64 => u8, i8, i16, i32, i64, f32, f64);

macro_rules! cast_bool {
    ($($t:ty),*) => {
        $(
            impl CastTo<$t> for bool {
                #[inline]
                fn cast(self) -> $t {
                    u8::from(self) as $t
                }
            }

            impl CastTo<bool> for $t {
                #[inline]
                fn cast(self) -> bool {
                    self != (0 as $t)
                }
            }
        )*
    };
}

cast_bool!(u8, i8, i16, i32, i64, f32, f64);

impl CastTo<bool> for bool {
    #[inline]
    fn cast(self) -> bool {
        self
    }
}

macro_rules! cast_half {
    ($($t:ty),*) => {
        $(
            impl CastTo<$t> for f16 {
                #[inline]
                fn cast(self) -> $t {
                    self.to_f64() as $t
                }
            }

            impl CastTo<f16> for $t {
                #[inline]
                fn cast(self) -> f16 {
                    f16::from_f64(self as f64)
                }
            }
        )*
    };
}

cast_half!(u8, i8, i16, i32, i64, f32, f64);

impl CastTo<f16> for f16 {
    #[inline]
    fn cast(self) -> f16 {
        self
    }
}

impl CastTo<bool> for f16 {
    #[inline]
    fn cast(self) -> bool {
        self.to_f32() != 0.0
    }
}

impl CastTo<f16> for bool {
    #[inline]
    fn cast(self) -> f16 {
        if self { f16::ONE } else { f16::ZERO }
    }
}

/// Converts a [`Scalar`] into the element type `T`.
pub fn scalar_to<T>(s: Scalar) -> T
where
    bool: CastTo<T>,
    i64: CastTo<T>,
    f64: CastTo<T>,
{
    match s {
        Scalar::Bool(v) => v.cast(),
        Scalar::Int(v) => v.cast(),
        Scalar::Float(v) => v.cast(),
    }
}

/// Multiplication as the kernels define it for each computation type.
///
/// Integers wrap on overflow, `bool` multiplies as logical AND.
pub trait Multiply: Element {
    /// `self * rhs`.
    fn mul(self, rhs: Self) -> Self;
}

macro_rules! multiply_wrapping {
    ($($t:ty),*) => {
        $(impl Multiply for $t {
            #[inline]
            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
        })*
    };
}

macro_rules! multiply_float {
    ($($t:ty),*) => {
        $(impl Multiply for $t {
            #[inline]
            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }
        })*
    };
}

multiply_wrapping!(u8, i8, i16, i32, i64);
multiply_float!(f16, f32, f64);

impl Multiply for bool {
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        self && rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_level<A: Promote<B>, B>() -> DType
    where
        Promoted<A, B>: Element,
    {
        <Promoted<A, B> as Element>::DTYPE
    }

    #[test]
    fn table_is_symmetric() {
        for a in DType::ALL {
            for b in DType::ALL {
                assert_eq!(promote_types(a, b, false), promote_types(b, a, false), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn half_promotes_to_float() {
        assert_eq!(promote_types(DType::F16, DType::F16, false), DType::F16);
        assert_eq!(promote_types(DType::F16, DType::F16, true), DType::F32);
        assert_eq!(promote_types(DType::I32, DType::F16, true), DType::F32);
        assert_eq!(promote_types(DType::F16, DType::F64, true), DType::F64);
    }

    #[test]
    fn unsigned_with_signed_widens() {
        assert_eq!(promote_types(DType::U8, DType::I8, true), DType::I16);
        assert_eq!(promote_types(DType::U8, DType::I32, true), DType::I32);
        assert_eq!(promote_types(DType::Bool, DType::U8, true), DType::U8);
    }

    #[test]
    fn type_level_matches_runtime() {
        assert_eq!(type_level::<u8, i8>(), promote_types(DType::U8, DType::I8, true));
        assert_eq!(type_level::<f16, f16>(), promote_types(DType::F16, DType::F16, true));
        assert_eq!(type_level::<i64, f16>(), promote_types(DType::I64, DType::F16, true));
        assert_eq!(type_level::<bool, i16>(), promote_types(DType::Bool, DType::I16, true));
        assert_eq!(type_level::<f32, f64>(), promote_types(DType::F32, DType::F64, true));
        assert_eq!(type_level::<i32, i8>(), promote_types(DType::I32, DType::I8, true));
    }

    #[test]
    fn cast_rules() {
        assert!(can_cast(DType::I32, DType::F32));
        assert!(can_cast(DType::F32, DType::F16));
        assert!(can_cast(DType::Bool, DType::Bool));
        assert!(!can_cast(DType::F32, DType::I32));
        assert!(!can_cast(DType::I32, DType::Bool));
        assert!(!can_cast(DType::F64, DType::U8));
    }

    #[test]
    fn scalar_promotion() {
        assert_eq!(promote_type_with_scalar(DType::I8, Scalar::Int(1000), false), DType::I8);
        assert_eq!(promote_type_with_scalar(DType::I8, Scalar::Float(0.5), false), DType::F32);
        assert_eq!(promote_type_with_scalar(DType::Bool, Scalar::Int(2), false), DType::I64);
        assert_eq!(promote_type_with_scalar(DType::F16, Scalar::Float(0.5), false), DType::F16);
        assert_eq!(promote_type_with_scalar(DType::F16, Scalar::Float(0.5), true), DType::F32);
        assert_eq!(promote_type_with_scalar(DType::F64, Scalar::Bool(true), false), DType::F64);
    }

    #[test]
    fn native_casts() {
        assert_eq!(CastTo::<i32>::cast(2.9f32), 2);
        assert_eq!(CastTo::<u8>::cast(300i32), 44);
        assert_eq!(CastTo::<i8>::cast(1e10f64), i8::MAX);
        assert!(CastTo::<bool>::cast(0.1f32));
        assert!(!CastTo::<bool>::cast(f16::ZERO));
        assert_eq!(CastTo::<f32>::cast(true), 1.0);
        assert_eq!(CastTo::<f32>::cast(f16::from_f32(1.5)), 1.5);
    }

    #[test]
    fn multiply_semantics() {
        assert_eq!(Multiply::mul(100i8, 2), -56);
        assert!(!Multiply::mul(true, false));
        assert_eq!(Multiply::mul(1.5f64, 2.0), 3.0);
    }
}

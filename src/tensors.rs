//! Host tensor storage and scalar types.
//!
//! # Host Tensors
//!
//! A [`HostTensor`] is a row-major, contiguous buffer tagged with a runtime
//! [`DType`]. Kernels never see `HostTensor` generically; they pull a typed
//! slice out through the [`Element`] trait once the dispatch layer has picked
//! a concrete specialization.
//!
//! ## Design Highlights
//! - One `Vec` per dtype inside [`TensorData`]; no byte reinterpretation
//! - The allocation (capacity) and the logical shape are tracked separately,
//!   so an output can be resized in place within its bound
//! - [`ShapeDynamism`] decides whether and how far a resize may go
//!
//! ## Example
//!
//! ```rust
//! use briny_rt::tensors::{DType, HostTensor};
//! let t = HostTensor::new(&[2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.dtype(), DType::F32);
//! assert_eq!(t.numel(), 6);
//! ```

use crate::error::ResizeError;
use core::fmt;
use half::f16;

/// Runtime scalar type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    /// `bool`
    Bool,
    /// `u8`
    U8,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// IEEE half precision (`half::f16`).
    F16,
    /// `f32`
    F32,
    /// `f64`
    F64,
}

impl DType {
    /// Every supported dtype, in promotion-lattice order.
    pub const ALL: [Self; 9] = [
        Self::Bool,
        Self::U8,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::F16,
        Self::F32,
        Self::F64,
    ];

    /// Returns `true` for `F16`, `F32` and `F64`.
    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, Self::F16 | Self::F32 | Self::F64)
    }

    /// Returns `true` for the integer types, and for `Bool` if `include_bool`.
    #[must_use]
    pub const fn is_integral(self, include_bool: bool) -> bool {
        match self {
            Self::Bool => include_bool,
            Self::U8 | Self::I8 | Self::I16 | Self::I32 | Self::I64 => true,
            Self::F16 | Self::F32 | Self::F64 => false,
        }
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::I8 => 1,
            Self::I16 | Self::F16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Short lowercase name, as used in shader variant names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int",
            Self::I64 => "int64",
            Self::F16 => "half",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar operand (the right-hand side of `mul.Scalar_out`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar, always carried as `i64`.
    Int(i64),
    /// Floating scalar, always carried as `f64`.
    Float(f64),
}

impl Scalar {
    /// The dtype the scalar is carried in.
    #[must_use]
    pub const fn dtype(self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int(_) => DType::I64,
            Self::Float(_) => DType::F64,
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// How a tensor's shape may change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeDynamism {
    /// The shape is fixed; resizing to anything else fails.
    Static,
    /// Any shape whose element count fits the allocation is allowed.
    #[default]
    DynamicBound,
    /// The allocation grows on demand.
    DynamicUnbound,
}

/// A Rust type that can back a [`HostTensor`].
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The runtime tag for this type.
    const DTYPE: DType;

    /// Borrows the storage as `[Self]` if the variant matches.
    fn slice(data: &TensorData) -> Option<&[Self]>;

    /// Mutably borrows the storage as `[Self]` if the variant matches.
    fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]>;

    /// Wraps a vector into storage.
    fn wrap(data: Vec<Self>) -> TensorData;
}

macro_rules! tensor_data {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        /// Typed backing storage of a host tensor.
        #[derive(Debug, Clone, PartialEq)]
        pub enum TensorData {
            $(
                #[doc = concat!("`", stringify!($ty), "` elements.")]
                $variant(Vec<$ty>),
            )*
        }

        impl TensorData {
            /// Runtime dtype of the storage.
            #[must_use]
            pub const fn dtype(&self) -> DType {
                match self {
                    $(Self::$variant(_) => DType::$variant,)*
                }
            }

            /// Number of allocated elements.
            #[must_use]
            pub fn len(&self) -> usize {
                match self {
                    $(Self::$variant(v) => v.len(),)*
                }
            }

            /// Whether nothing is allocated.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            fn zeros(dtype: DType, len: usize) -> Self {
                match dtype {
                    $(DType::$variant => Self::$variant(vec![<$ty>::default(); len]),)*
                }
            }

            fn grow(&mut self, len: usize) {
                match self {
                    $(Self::$variant(v) => v.resize(len, <$ty>::default()),)*
                }
            }
        }

        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$variant;

                #[inline]
                fn slice(data: &TensorData) -> Option<&[Self]> {
                    match data {
                        TensorData::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                #[inline]
                fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]> {
                    match data {
                        TensorData::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn wrap(data: Vec<Self>) -> TensorData {
                    TensorData::$variant(data)
                }
            }
        )*
    };
}

tensor_data! {
    Bool => bool,
    U8 => u8,
    I8 => i8,
    I16 => i16,
    I32 => i32,
    I64 => i64,
    F16 => f16,
    F32 => f32,
    F64 => f64,
}

/// A contiguous, row-major tensor in host memory.
///
/// The logical shape may be smaller than the allocation; only the first
/// `numel()` elements are meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    shape: Vec<usize>,
    data: TensorData,
    dynamism: ShapeDynamism,
}

/// Element count of a shape. A rank-0 shape holds one element.
#[must_use]
pub fn numel_of(shape: &[usize]) -> usize {
    shape.iter().product()
}

impl HostTensor {
    /// Creates a tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new<T: Element>(shape: &[usize], data: Vec<T>) -> Self {
        assert_eq!(
            numel_of(shape),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self {
            shape: shape.to_vec(),
            data: T::wrap(data),
            dynamism: ShapeDynamism::default(),
        }
    }

    /// Creates a zero-filled tensor.
    #[must_use]
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: TensorData::zeros(dtype, numel_of(shape)),
            dynamism: ShapeDynamism::default(),
        }
    }

    /// Creates a zero-filled tensor with room for `capacity` elements and an
    /// initial logical shape.
    ///
    /// # Panics
    /// Panics if `shape` needs more than `capacity` elements.
    #[must_use]
    pub fn with_capacity(dtype: DType, shape: &[usize], capacity: usize) -> Self {
        assert!(
            numel_of(shape) <= capacity,
            "shape {shape:?} does not fit in {capacity} elements"
        );
        Self {
            shape: shape.to_vec(),
            data: TensorData::zeros(dtype, capacity),
            dynamism: ShapeDynamism::default(),
        }
    }

    /// A rank-0 tensor holding `value`.
    pub fn scalar<T: Element>(value: T) -> Self {
        Self::new(&[], vec![value])
    }

    /// Sets how this tensor may be resized.
    #[must_use]
    pub fn with_dynamism(mut self, dynamism: ShapeDynamism) -> Self {
        self.dynamism = dynamism;
        self
    }

    /// Runtime dtype.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Logical shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    /// Logical element count.
    #[must_use]
    pub fn numel(&self) -> usize {
        numel_of(&self.shape)
    }

    /// Elements the allocation can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Resize policy.
    #[must_use]
    pub const fn dynamism(&self) -> ShapeDynamism {
        self.dynamism
    }

    /// The logical elements as `[T]`, or `None` if `T` is not this tensor's dtype.
    #[must_use]
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        let n = self.numel();
        T::slice(&self.data).map(|s| &s[..n])
    }

    /// Mutable view of the logical elements.
    pub fn as_mut_slice<T: Element>(&mut self) -> Option<&mut [T]> {
        let n = self.numel();
        T::slice_mut(&mut self.data).map(|s| &mut s[..n])
    }

    /// Copies the logical elements out.
    #[must_use]
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        self.as_slice().map(<[T]>::to_vec)
    }

    /// Changes the logical shape without changing identity.
    ///
    /// On error the shape is left exactly as it was.
    ///
    /// # Errors
    /// - [`ResizeError::StaticShape`] if the tensor is static and `shape` differs
    /// - [`ResizeError::CapacityExceeded`] if a bounded tensor is asked to grow
    ///   past its allocation
    pub fn resize(&mut self, shape: &[usize]) -> Result<(), ResizeError> {
        if self.shape == shape {
            return Ok(());
        }
        let requested = numel_of(shape);
        match self.dynamism {
            ShapeDynamism::Static => {
                return Err(ResizeError::StaticShape {
                    from: self.shape.clone(),
                    to: shape.to_vec(),
                });
            }
            ShapeDynamism::DynamicBound => {
                if requested > self.capacity() {
                    return Err(ResizeError::CapacityExceeded {
                        requested,
                        capacity: self.capacity(),
                    });
                }
            }
            ShapeDynamism::DynamicUnbound => {
                if requested > self.capacity() {
                    self.data.grow(requested);
                }
            }
        }
        self.shape.clear();
        self.shape.extend_from_slice(shape);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tracks_dtype_and_numel() {
        let t = HostTensor::new(&[2, 2], vec![1i32, 2, 3, 4]);
        assert_eq!(t.dtype(), DType::I32);
        assert_eq!(t.numel(), 4);
        assert_eq!(t.as_slice::<i32>(), Some(&[1, 2, 3, 4][..]));
        assert!(t.as_slice::<f32>().is_none());
    }

    #[test]
    #[should_panic(expected = "incompatible")]
    fn new_rejects_wrong_length() {
        let _ = HostTensor::new(&[2, 2], vec![1.0f32; 3]);
    }

    #[test]
    fn rank_zero_holds_one_element() {
        let t = HostTensor::scalar(f16::from_f32(0.5));
        assert_eq!(t.shape(), &[] as &[usize]);
        assert_eq!(t.numel(), 1);
        assert_eq!(t.dtype(), DType::F16);
    }

    #[test]
    fn bounded_resize_within_capacity() {
        let mut t = HostTensor::with_capacity(DType::F32, &[2, 3], 8);
        t.resize(&[4, 2]).unwrap();
        assert_eq!(t.shape(), &[4, 2]);
        assert_eq!(t.as_slice::<f32>().unwrap().len(), 8);
    }

    #[test]
    fn bounded_resize_past_capacity_keeps_shape() {
        let mut t = HostTensor::zeros(DType::F32, &[2, 3]);
        let err = t.resize(&[4, 5]).unwrap_err();
        assert_eq!(
            err,
            ResizeError::CapacityExceeded {
                requested: 20,
                capacity: 6
            }
        );
        assert_eq!(t.shape(), &[2, 3]);
    }

    #[test]
    fn static_resize_only_to_same_shape() {
        let mut t = HostTensor::zeros(DType::I64, &[3]).with_dynamism(ShapeDynamism::Static);
        assert!(t.resize(&[3]).is_ok());
        assert!(matches!(
            t.resize(&[1, 3]),
            Err(ResizeError::StaticShape { .. })
        ));
        assert_eq!(t.shape(), &[3]);
    }

    #[test]
    fn unbound_resize_grows_storage() {
        let mut t = HostTensor::zeros(DType::U8, &[1]).with_dynamism(ShapeDynamism::DynamicUnbound);
        t.resize(&[4, 4]).unwrap();
        assert_eq!(t.capacity(), 16);
        assert_eq!(t.to_vec::<u8>().unwrap(), vec![0; 16]);
    }
}

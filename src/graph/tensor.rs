//! Device tensor metadata.
//!
//! Nothing in here owns GPU memory. A [`DeviceTensor`] records what the
//! scheduler will have to allocate and how the conversion shaders must
//! address it: logical sizes, padded device sizes, and dispatch extents.
//!
//! Axis naming follows the NCHW convention, counted from the end of the
//! sizes: width is the last axis, then height, channels, batch. Missing
//! leading axes are 1.

use crate::error::GraphError;
use crate::tensors::{DType, Element, numel_of};
use bytemuck::Pod;
use std::sync::Arc;

/// A three-component dispatch size.
pub type UVec3 = [u32; 3];

/// Which axis is packed four-wide into one texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLayout {
    /// Width is the packed axis.
    WidthPacked,
    /// Height is the packed axis.
    HeightPacked,
    /// Channels is the packed axis.
    ChannelsPacked,
}

impl MemoryLayout {
    /// Lowercase tag used in shader names.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::WidthPacked => "width_packed",
            Self::HeightPacked => "height_packed",
            Self::ChannelsPacked => "channels_packed",
        }
    }

    /// Position of the packed axis in WHCN order.
    const fn whcn_axis(self) -> usize {
        match self {
            Self::WidthPacked => 0,
            Self::HeightPacked => 1,
            Self::ChannelsPacked => 2,
        }
    }
}

/// Where a tensor's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Host memory; addressed linearly like a buffer.
    Host,
    /// A 3-D texture of four-element texels.
    DeviceImage,
    /// A linear storage buffer.
    DeviceBuffer,
}

impl StorageKind {
    /// Whether the storage is a texture.
    #[must_use]
    pub const fn is_image(self) -> bool {
        matches!(self, Self::DeviceImage)
    }
}

/// Sizes in WHCN order, missing axes filled with 1.
fn whcn(sizes: &[usize]) -> [usize; 4] {
    let mut out = [1; 4];
    for (slot, &d) in out.iter_mut().zip(sizes.iter().rev()) {
        *slot = d;
    }
    out
}

fn to_ivec4(v: [usize; 4]) -> [i32; 4] {
    v.map(|d| i32::try_from(d).unwrap_or(i32::MAX))
}

fn to_u32(d: usize) -> u32 {
    u32::try_from(d).unwrap_or(u32::MAX)
}

/// Metadata of a device-resident tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTensor {
    sizes: Vec<usize>,
    dtype: DType,
    storage: StorageKind,
    layout: MemoryLayout,
}

impl DeviceTensor {
    /// Describes a new device tensor.
    ///
    /// # Errors
    /// [`GraphError::UnsupportedRank`] if an image tensor has more than 4 dims.
    pub fn new(
        sizes: &[usize],
        dtype: DType,
        storage: StorageKind,
        layout: MemoryLayout,
    ) -> Result<Self, GraphError> {
        if storage.is_image() && sizes.len() > 4 {
            return Err(GraphError::UnsupportedRank(sizes.len()));
        }
        Ok(Self {
            sizes: sizes.to_vec(),
            dtype,
            storage,
            layout,
        })
    }

    /// Logical sizes, outermost first.
    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Element type.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    /// Storage kind.
    #[must_use]
    pub const fn storage(&self) -> StorageKind {
        self.storage
    }

    /// Packing layout.
    #[must_use]
    pub const fn layout(&self) -> MemoryLayout {
        self.layout
    }

    /// Logical element count.
    #[must_use]
    pub fn numel(&self) -> usize {
        numel_of(&self.sizes)
    }

    /// Device sizes in WHCN order.
    ///
    /// Image storage rounds the packed axis up to a multiple of 4; linear
    /// storage keeps the logical sizes.
    #[must_use]
    pub fn gpu_sizes(&self) -> [usize; 4] {
        let mut sizes = whcn(&self.sizes);
        if self.storage.is_image() {
            let axis = self.layout.whcn_axis();
            sizes[axis] = sizes[axis].next_multiple_of(4);
        }
        sizes
    }

    /// Global dispatch size covering the whole tensor.
    ///
    /// Images cover one texel per invocation, with batches stacked along the
    /// depth axis. Linear storage covers one element per invocation. Every
    /// component is at least 1.
    #[must_use]
    pub fn extents(&self) -> UVec3 {
        let [w, h, c, n] = self.gpu_sizes();
        let extents = if self.storage.is_image() {
            match self.layout {
                MemoryLayout::WidthPacked => [w / 4, h, c * n],
                MemoryLayout::HeightPacked => [w, h / 4, c * n],
                MemoryLayout::ChannelsPacked => [w, h, (c / 4) * n],
            }
        } else {
            [self.numel(), 1, 1]
        };
        extents.map(|e| to_u32(e.max(1)))
    }

    /// Uniform contents: padded device sizes, WHCN.
    #[must_use]
    pub fn gpu_sizes_ubo(&self) -> ParamsBuffer {
        ParamsBuffer::new("gpu_sizes", to_ivec4(self.gpu_sizes()))
    }

    /// Uniform contents: logical sizes, WHCN.
    #[must_use]
    pub fn cpu_sizes_ubo(&self) -> ParamsBuffer {
        ParamsBuffer::new("cpu_sizes", to_ivec4(whcn(&self.sizes)))
    }
}

/// Contents of one uniform buffer bound to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamsBuffer {
    /// Debug label.
    pub label: &'static str,
    /// Four signed components, as consumed by the shaders.
    pub data: [i32; 4],
}

impl ParamsBuffer {
    /// Wraps uniform contents.
    #[must_use]
    pub const fn new(label: &'static str, data: [i32; 4]) -> Self {
        Self { label, data }
    }

    /// Bytes to upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

/// A host-visible linear buffer mirroring a device tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingBuffer {
    /// Element type.
    pub dtype: DType,
    /// Element count.
    pub numel: usize,
}

impl StagingBuffer {
    /// Size in bytes.
    #[must_use]
    pub const fn nbytes(&self) -> usize {
        self.numel * self.dtype.size_of()
    }
}

/// Constant host data waiting to be prepacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorRef {
    /// Logical sizes.
    pub sizes: Vec<usize>,
    /// Element type.
    pub dtype: DType,
    /// Row-major element bytes, shared with the owner of the weights.
    pub bytes: Arc<[u8]>,
}

impl TensorRef {
    /// Copies typed data into a tensor ref.
    ///
    /// # Panics
    /// If `data` does not hold exactly `numel(sizes)` elements.
    pub fn from_slice<T: Element + Pod>(sizes: &[usize], data: &[T]) -> Self {
        assert_eq!(
            numel_of(sizes),
            data.len(),
            "tensor ref sizes {sizes:?} do not match {} elements",
            data.len()
        );
        Self {
            sizes: sizes.to_vec(),
            dtype: T::DTYPE,
            bytes: Arc::from(bytemuck::cast_slice::<T, u8>(data)),
        }
    }

    /// Wraps raw bytes of the given dtype.
    ///
    /// # Panics
    /// If the byte count does not match `sizes` and `dtype`.
    #[must_use]
    pub fn from_bytes(sizes: &[usize], dtype: DType, bytes: Arc<[u8]>) -> Self {
        assert_eq!(
            numel_of(sizes) * dtype.size_of(),
            bytes.len(),
            "tensor ref sizes {sizes:?} do not match {} bytes of {dtype}",
            bytes.len()
        );
        Self {
            sizes: sizes.to_vec(),
            dtype,
            bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(sizes: &[usize], layout: MemoryLayout) -> DeviceTensor {
        DeviceTensor::new(sizes, DType::F32, StorageKind::DeviceImage, layout).unwrap()
    }

    fn buffer(sizes: &[usize]) -> DeviceTensor {
        DeviceTensor::new(sizes, DType::I32, StorageKind::DeviceBuffer, MemoryLayout::WidthPacked)
            .unwrap()
    }

    #[test]
    fn channels_packed_pads_channels() {
        let t = image(&[2, 3, 5, 7], MemoryLayout::ChannelsPacked);
        assert_eq!(t.gpu_sizes(), [7, 5, 4, 2]);
        assert_eq!(t.extents(), [7, 5, 2]);
        assert_eq!(t.cpu_sizes_ubo().data, [7, 5, 3, 2]);
        assert_eq!(t.gpu_sizes_ubo().data, [7, 5, 4, 2]);
    }

    #[test]
    fn width_packed_low_rank() {
        let t = image(&[6], MemoryLayout::WidthPacked);
        assert_eq!(t.gpu_sizes(), [8, 1, 1, 1]);
        assert_eq!(t.extents(), [2, 1, 1]);
    }

    #[test]
    fn buffers_are_linear() {
        assert_eq!(buffer(&[2, 3, 4, 5, 6]).extents(), [720, 1, 1]);
        assert_eq!(buffer(&[0, 3]).extents(), [1, 1, 1]);
        assert_eq!(buffer(&[3, 5]).gpu_sizes(), [5, 3, 1, 1]);
    }

    #[test]
    fn images_reject_rank_five() {
        let err = DeviceTensor::new(
            &[1, 2, 3, 4, 5],
            DType::F32,
            StorageKind::DeviceImage,
            MemoryLayout::WidthPacked,
        )
        .unwrap_err();
        assert_eq!(err, GraphError::UnsupportedRank(5));
    }

    #[test]
    fn params_bytes_cover_four_ints() {
        let p = ParamsBuffer::new("sizes", [1, 2, 3, 4]);
        assert_eq!(p.as_bytes().len(), 16);
        assert_eq!(&p.as_bytes()[4..8], &2i32.to_ne_bytes());
    }

    #[test]
    fn tensor_ref_from_floats() {
        let r = TensorRef::from_slice(&[2, 2], &[1.0f32, 2.0, 3.0, 4.0]);
        assert_eq!(r.dtype, DType::F32);
        assert_eq!(r.bytes.len(), 16);
    }

    #[test]
    #[should_panic(expected = "do not match")]
    fn tensor_ref_checks_byte_count() {
        let _ = TensorRef::from_bytes(&[3], DType::Bool, Arc::from(vec![1u8, 0]));
    }
}

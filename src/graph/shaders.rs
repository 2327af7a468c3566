//! Shader selection.
//!
//! The shader library lives outside this crate. The graph builder only needs
//! a name for the conversion routine matching a tensor's storage, layout and
//! dtype; [`ShaderRegistry`] is that seam.

use crate::graph::node::ShaderInfo;
use crate::graph::tensor::{DeviceTensor, StorageKind};
use core::fmt;

/// Looks up the conversion shaders for a device tensor.
///
/// Implementations must be pure: the same tensor metadata always yields the
/// same shader. Lookups are not cached by the graph.
pub trait ShaderRegistry: fmt::Debug {
    /// Shader copying a row-major staging buffer into `tensor`.
    fn shader_for_upload(&self, tensor: &DeviceTensor) -> ShaderInfo;

    /// Shader copying `tensor` into a row-major staging buffer.
    fn shader_for_download(&self, tensor: &DeviceTensor) -> ShaderInfo;
}

/// The default naming scheme of the bundled shader library.
///
/// ```
/// use briny_rt::graph::shaders::{NamedShaders, ShaderRegistry};
/// use briny_rt::graph::{DeviceTensor, MemoryLayout, StorageKind};
/// use briny_rt::tensors::DType;
///
/// let t = DeviceTensor::new(&[1, 3, 8, 8], DType::F32, StorageKind::DeviceImage, MemoryLayout::ChannelsPacked)?;
/// assert_eq!(NamedShaders.shader_for_upload(&t).name, "nchw_to_image_channels_packed_float");
/// # Ok::<(), briny_rt::error::GraphError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedShaders;

impl ShaderRegistry for NamedShaders {
    fn shader_for_upload(&self, tensor: &DeviceTensor) -> ShaderInfo {
        let dtype = tensor.dtype().name();
        match tensor.storage() {
            StorageKind::DeviceImage => {
                ShaderInfo::new(format!("nchw_to_image_{}_{dtype}", tensor.layout().tag()))
            }
            StorageKind::DeviceBuffer | StorageKind::Host => {
                ShaderInfo::new(format!("nchw_to_buffer_{dtype}"))
            }
        }
    }

    fn shader_for_download(&self, tensor: &DeviceTensor) -> ShaderInfo {
        let dtype = tensor.dtype().name();
        match tensor.storage() {
            StorageKind::DeviceImage => {
                ShaderInfo::new(format!("image_to_nchw_{}_{dtype}", tensor.layout().tag()))
            }
            StorageKind::DeviceBuffer | StorageKind::Host => {
                ShaderInfo::new(format!("buffer_to_nchw_{dtype}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tensor::MemoryLayout;
    use crate::tensors::DType;

    #[test]
    fn names_follow_storage_layout_dtype() {
        let img = DeviceTensor::new(
            &[4, 4],
            DType::F16,
            StorageKind::DeviceImage,
            MemoryLayout::WidthPacked,
        )
        .unwrap();
        assert_eq!(
            NamedShaders.shader_for_download(&img).name,
            "image_to_nchw_width_packed_half"
        );

        let buf = DeviceTensor::new(
            &[4, 4],
            DType::I32,
            StorageKind::DeviceBuffer,
            MemoryLayout::WidthPacked,
        )
        .unwrap();
        assert_eq!(NamedShaders.shader_for_upload(&buf).name, "nchw_to_buffer_int");
        assert_eq!(NamedShaders.shader_for_download(&buf).name, "buffer_to_nchw_int");
    }
}

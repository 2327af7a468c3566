//! Graph nodes.
//!
//! A node is a fully described shader dispatch: which shader, how many
//! invocations, which values it touches and how, and the uniform contents.
//! Nodes carry no behavior of their own; the scheduler walks the graph's node
//! lists and records the dispatches.

use crate::graph::ValueRef;
use crate::graph::tensor::{ParamsBuffer, UVec3};

/// How a shader accesses a bound value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read only.
    Read,
    /// Write only.
    Write,
    /// Read and write.
    ReadWrite,
}

/// One value bound to a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// The bound value.
    pub value: ValueRef,
    /// Access the shader performs.
    pub access: AccessMode,
}

impl Binding {
    /// Binds `value` with `access`.
    #[must_use]
    pub const fn new(value: ValueRef, access: AccessMode) -> Self {
        Self { value, access }
    }
}

/// Identifies a compiled shader variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderInfo {
    /// Variant name, e.g. `nchw_to_image_channels_packed_float`.
    pub name: String,
}

impl ShaderInfo {
    /// Wraps a shader name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Global and local dispatch sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSize {
    /// Total invocations per axis.
    pub global: UVec3,
    /// Invocations per workgroup per axis.
    pub local: UVec3,
}

impl DispatchSize {
    /// Number of workgroups per axis, rounding up.
    #[must_use]
    pub fn workgroup_count(&self) -> UVec3 {
        [0, 1, 2].map(|i| self.global[i].div_ceil(self.local[i].max(1)))
    }
}

/// A dispatch that runs on every inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteNode {
    /// Shader to dispatch.
    pub shader: ShaderInfo,
    /// Dispatch geometry.
    pub dispatch: DispatchSize,
    /// Values the shader reads and writes.
    pub bindings: Vec<Binding>,
    /// Uniform buffers, in binding order after the values.
    pub params: Vec<ParamsBuffer>,
}

/// A dispatch that runs once, before any [`ExecuteNode`], uploading
/// constant data into a device tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepackNode {
    /// Shader to dispatch.
    pub shader: ShaderInfo,
    /// Dispatch geometry.
    pub dispatch: DispatchSize,
    /// The constant source (a tensor ref).
    pub source: ValueRef,
    /// The device tensor produced.
    pub packed: ValueRef,
    /// Uniform buffers.
    pub params: Vec<ParamsBuffer>,
}

impl PrepackNode {
    /// The value bindings this node implies: the packed tensor written, the
    /// source read through a staging upload.
    #[must_use]
    pub fn bindings(&self) -> [Binding; 2] {
        [
            Binding::new(self.packed, AccessMode::Write),
            Binding::new(self.source, AccessMode::Read),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_count_rounds_up() {
        let d = DispatchSize {
            global: [10, 4, 1],
            local: [4, 4, 1],
        };
        assert_eq!(d.workgroup_count(), [3, 1, 1]);
    }
}

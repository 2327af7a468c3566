//! # GPU Compute Graph Construction
//!
//! A [`ComputeGraph`] is the build-time record of one model's GPU work: a
//! table of values (device tensors, staging buffers, constant tensor refs)
//! and two node lists. Nothing is executed here; an external scheduler walks
//! the lists later.
//!
//! ## Submodules
//!
//! - [`tensor`] — Device tensor metadata, staging buffers, tensor refs, uniforms
//! - [`node`] — Prepack and execute node descriptions
//! - [`staging`] — Staging transfers and weight prepacking
//! - [`workgroup`] — Adaptive local dispatch size
//! - [`shaders`] — The shader-selection seam
//!
//! ## Ordering
//!
//! Every prepack node runs once, before any execute node. Execute nodes run
//! in list order on every inference.
//!
//! ## Example
//!
//! ```rust
//! use briny_rt::graph::{ComputeGraph, MemoryLayout, StorageKind};
//! use briny_rt::graph::staging::add_staging_to_tensor_node;
//! use briny_rt::tensors::DType;
//!
//! let mut graph = ComputeGraph::default();
//! let t = graph.add_tensor(&[1, 3, 4, 4], DType::F32, StorageKind::DeviceImage, MemoryLayout::ChannelsPacked)?;
//! let s = graph.add_staging(DType::F32, 48);
//! add_staging_to_tensor_node(&mut graph, s, t);
//! assert_eq!(graph.execute_nodes().len(), 1);
//! # Ok::<(), briny_rt::error::GraphError>(())
//! ```

pub mod node;
pub mod shaders;
pub mod staging;
pub mod tensor;
pub mod workgroup;

pub use node::{AccessMode, Binding, DispatchSize, ExecuteNode, PrepackNode, ShaderInfo};
pub use shaders::{NamedShaders, ShaderRegistry};
pub use tensor::{
    DeviceTensor, MemoryLayout, ParamsBuffer, StagingBuffer, StorageKind, TensorRef, UVec3,
};

use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::tensors::DType;
use std::collections::HashMap;

/// Index of a value in a [`ComputeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(pub usize);

/// Index of a node in one of a graph's node lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// Position in the prepack list.
    Prepack(usize),
    /// Position in the execute list.
    Execute(usize),
}

/// An entry of the value table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A device-resident tensor.
    Tensor(DeviceTensor),
    /// A host-visible staging buffer.
    Staging(StagingBuffer),
    /// Constant host data awaiting prepack.
    TensorRef(TensorRef),
}

/// A graph input or output: the device tensor and its staging mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoValue {
    /// The device tensor.
    pub tensor: ValueRef,
    /// The staging buffer the host reads or writes.
    pub staging: ValueRef,
}

/// Build-time record of values and nodes.
#[derive(Debug)]
pub struct ComputeGraph {
    config: GraphConfig,
    shaders: Box<dyn ShaderRegistry>,
    values: Vec<Value>,
    prepack_nodes: Vec<PrepackNode>,
    execute_nodes: Vec<ExecuteNode>,
    prepacked: HashMap<ValueRef, ValueRef>,
    inputs: Vec<IoValue>,
    outputs: Vec<IoValue>,
}

impl Default for ComputeGraph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl ComputeGraph {
    /// An empty graph using the [`NamedShaders`] scheme.
    #[must_use]
    pub fn new(config: GraphConfig) -> Self {
        Self::with_shaders(config, Box::new(NamedShaders))
    }

    /// An empty graph with a custom shader registry.
    #[must_use]
    pub fn with_shaders(config: GraphConfig, shaders: Box<dyn ShaderRegistry>) -> Self {
        Self {
            config,
            shaders,
            values: Vec::new(),
            prepack_nodes: Vec::new(),
            execute_nodes: Vec::new(),
            prepacked: HashMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn push(&mut self, value: Value) -> ValueRef {
        self.values.push(value);
        ValueRef(self.values.len() - 1)
    }

    /// Adds a device tensor.
    ///
    /// # Errors
    /// [`GraphError::UnsupportedRank`] for an image tensor above 4 dims.
    pub fn add_tensor(
        &mut self,
        sizes: &[usize],
        dtype: DType,
        storage: StorageKind,
        layout: MemoryLayout,
    ) -> Result<ValueRef, GraphError> {
        let t = DeviceTensor::new(sizes, dtype, storage, layout)?;
        Ok(self.push(Value::Tensor(t)))
    }

    /// Adds a device tensor with the sizes and dtype of `like`, which may be
    /// a tensor or a tensor ref, in the default storage.
    ///
    /// # Errors
    /// - [`GraphError::NotATensorRef`] if `like` is a staging buffer
    /// - [`GraphError::UnsupportedRank`] as for [`add_tensor`](Self::add_tensor)
    pub fn add_tensor_like(
        &mut self,
        like: ValueRef,
        layout: MemoryLayout,
    ) -> Result<ValueRef, GraphError> {
        let (sizes, dtype) = match self.value(like) {
            Value::Tensor(t) => (t.sizes().to_vec(), t.dtype()),
            Value::TensorRef(r) => (r.sizes.clone(), r.dtype),
            Value::Staging(_) => return Err(GraphError::NotATensorRef(like.0)),
        };
        self.add_tensor(&sizes, dtype, self.config.default_storage, layout)
    }

    /// Adds a staging buffer of `numel` elements.
    pub fn add_staging(&mut self, dtype: DType, numel: usize) -> ValueRef {
        self.push(Value::Staging(StagingBuffer { dtype, numel }))
    }

    /// Adds constant data to be prepacked.
    pub fn add_tensor_ref(&mut self, tref: TensorRef) -> ValueRef {
        self.push(Value::TensorRef(tref))
    }

    /// The value at `v`.
    ///
    /// # Panics
    /// If `v` was not created by this graph.
    #[must_use]
    pub fn value(&self, v: ValueRef) -> &Value {
        self.values
            .get(v.0)
            .unwrap_or_else(|| panic!("value {} out of range ({} values)", v.0, self.values.len()))
    }

    /// The device tensor at `v`.
    ///
    /// # Panics
    /// If `v` is not a device tensor.
    #[must_use]
    pub fn get_tensor(&self, v: ValueRef) -> &DeviceTensor {
        match self.value(v) {
            Value::Tensor(t) => t,
            other => panic!("value {} is not a tensor: {other:?}", v.0),
        }
    }

    /// The tensor ref at `v`, if it is one.
    #[must_use]
    pub fn get_tref(&self, v: ValueRef) -> Option<&TensorRef> {
        match self.value(v) {
            Value::TensorRef(r) => Some(r),
            _ => None,
        }
    }

    /// Whether `v` is a device tensor.
    #[must_use]
    pub fn val_is_tensor(&self, v: ValueRef) -> bool {
        matches!(self.values.get(v.0), Some(Value::Tensor(_)))
    }

    /// Whether `v` is a staging buffer.
    #[must_use]
    pub fn val_is_staging(&self, v: ValueRef) -> bool {
        matches!(self.values.get(v.0), Some(Value::Staging(_)))
    }

    /// Whether `v` is a tensor ref.
    #[must_use]
    pub fn val_is_tref(&self, v: ValueRef) -> bool {
        matches!(self.values.get(v.0), Some(Value::TensorRef(_)))
    }

    /// Layout to use for a tensor of `sizes` when none is given.
    ///
    /// The configured override wins. Otherwise the largest of width, height
    /// and channels becomes the packed axis; ties go to width, then height.
    #[must_use]
    pub fn suggested_memory_layout(&self, sizes: &[usize]) -> MemoryLayout {
        if let Some(layout) = self.config.memory_layout_override {
            return layout;
        }
        let dim = |from_end: usize| {
            sizes
                .len()
                .checked_sub(from_end)
                .map_or(1, |i| sizes[i])
        };
        let (w, h, c) = (dim(1), dim(2), dim(3));
        if w >= h && w >= c {
            MemoryLayout::WidthPacked
        } else if h >= c {
            MemoryLayout::HeightPacked
        } else {
            MemoryLayout::ChannelsPacked
        }
    }

    /// Registers `tensor` as a graph input, with a fresh staging buffer the
    /// host writes into and an upload node. Returns the staging ref.
    ///
    /// # Panics
    /// If `tensor` is not a device tensor.
    pub fn set_input_tensor(&mut self, tensor: ValueRef) -> ValueRef {
        let t = self.get_tensor(tensor);
        let (dtype, numel) = (t.dtype(), t.numel());
        let staging = self.add_staging(dtype, numel);
        staging::add_staging_to_tensor_node(self, staging, tensor);
        self.inputs.push(IoValue { tensor, staging });
        staging
    }

    /// Registers `tensor` as a graph output, with a fresh staging buffer the
    /// host reads from and a download node. Returns the staging ref.
    ///
    /// # Panics
    /// If `tensor` is not a device tensor.
    pub fn set_output_tensor(&mut self, tensor: ValueRef) -> ValueRef {
        let t = self.get_tensor(tensor);
        let (dtype, numel) = (t.dtype(), t.numel());
        let staging = self.add_staging(dtype, numel);
        staging::add_tensor_to_staging_node(self, tensor, staging);
        self.outputs.push(IoValue { tensor, staging });
        staging
    }

    /// Build settings.
    #[must_use]
    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The shader registry in use.
    #[must_use]
    pub fn shaders(&self) -> &dyn ShaderRegistry {
        self.shaders.as_ref()
    }

    /// All values, indexed by [`ValueRef`].
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Nodes run once before execution.
    #[must_use]
    pub fn prepack_nodes(&self) -> &[PrepackNode] {
        &self.prepack_nodes
    }

    /// Nodes run on every inference.
    #[must_use]
    pub fn execute_nodes(&self) -> &[ExecuteNode] {
        &self.execute_nodes
    }

    /// Registered inputs, in registration order.
    #[must_use]
    pub fn inputs(&self) -> &[IoValue] {
        &self.inputs
    }

    /// Registered outputs, in registration order.
    #[must_use]
    pub fn outputs(&self) -> &[IoValue] {
        &self.outputs
    }

    pub(crate) fn push_execute(&mut self, node: ExecuteNode) -> NodeId {
        self.execute_nodes.push(node);
        NodeId::Execute(self.execute_nodes.len() - 1)
    }

    pub(crate) fn push_prepack(&mut self, node: PrepackNode) -> NodeId {
        self.prepack_nodes.push(node);
        NodeId::Prepack(self.prepack_nodes.len() - 1)
    }

    pub(crate) fn prepacked(&self, source: ValueRef) -> Option<ValueRef> {
        self.prepacked.get(&source).copied()
    }

    pub(crate) fn record_prepack(&mut self, source: ValueRef, packed: ValueRef) {
        self.prepacked.insert(source, packed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_suggestion_prefers_largest_axis() {
        let g = ComputeGraph::default();
        assert_eq!(g.suggested_memory_layout(&[1, 3, 224, 224]), MemoryLayout::WidthPacked);
        assert_eq!(g.suggested_memory_layout(&[64, 9, 3]), MemoryLayout::ChannelsPacked);
        assert_eq!(g.suggested_memory_layout(&[32, 8]), MemoryLayout::HeightPacked);
        assert_eq!(g.suggested_memory_layout(&[]), MemoryLayout::WidthPacked);
    }

    #[test]
    fn layout_override_wins() {
        let g = ComputeGraph::new(GraphConfig {
            memory_layout_override: Some(MemoryLayout::ChannelsPacked),
            ..GraphConfig::default()
        });
        assert_eq!(g.suggested_memory_layout(&[1, 1, 1, 512]), MemoryLayout::ChannelsPacked);
    }

    #[test]
    fn value_kinds() {
        let mut g = ComputeGraph::default();
        let s = g.add_staging(DType::U8, 4);
        let r = g.add_tensor_ref(TensorRef::from_slice(&[4], &[1u8, 2, 3, 4]));
        assert!(g.val_is_staging(s));
        assert!(g.val_is_tref(r));
        assert!(!g.val_is_tensor(r));
        assert!(!g.val_is_staging(ValueRef(99)));
        assert_eq!(g.add_tensor_like(s, MemoryLayout::WidthPacked), Err(GraphError::NotATensorRef(0)));
    }

    #[test]
    #[should_panic(expected = "is not a tensor")]
    fn get_tensor_on_staging_panics() {
        let mut g = ComputeGraph::default();
        let s = g.add_staging(DType::F32, 1);
        let _ = g.get_tensor(s);
    }
}
